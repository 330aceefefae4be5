//! Local Cache Layer
//!
//! Bounded in-memory storage for one group's values.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Cache (Mutex + lazy init + counters)         │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ LruCache<ByteView>                     │  │
//! │  │  HashMap<key, slot> + recency list     │  │
//! │  │  budget: Σ key.len() + value.len()     │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```

mod byteview;
mod lru;
mod main_cache;
mod proptest;

pub use byteview::ByteView;
pub use lru::{EvictionCallback, LruCache, Value};
pub use main_cache::{Cache, CacheStats};
