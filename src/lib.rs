//! peercache - Distributed Read-Through Cache
//!
//! An embeddable cache library in the style of groupcache. Each process
//! holds part of a shared key space; a key is owned by exactly one node on a
//! consistent hash ring, and misses are loaded once, by the owner, from a
//! user-supplied backing store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Group "scores"                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ Local Cache  │───▶│ SingleFlight │───▶│  NodePicker  │──▶ peer
//! │  │ (byte LRU)   │    │ (coalescing) │    │ (hash ring)  │       │
//! │  └──────────────┘    └──────┬───────┘    └──────────────┘       │
//! │                             ▼                                    │
//! │                      Getter (backing store)                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Byte-bounded LRU and the group-local cache wrapper
//! - [`error`] - Error types
//! - [`group`] - Cache groups, loaders and the group registry
//! - [`hashring`] - Consistent hash ring with virtual nodes
//! - [`metrics`] - Prometheus text rendering of group counters
//! - [`peers`] - Peer picking, HTTP peer server and client
//! - [`server`] - HTTP/1 accept loop
//! - [`singleflight`] - Per-key request coalescing

pub mod cache;
pub mod error;
pub mod group;
pub mod hashring;
pub mod metrics;
pub mod peers;
pub mod server;
pub mod singleflight;

pub use cache::{ByteView, Cache, CacheStats};
pub use error::{Error, Result};
pub use group::{Getter, GetterFn, Group, GroupRegistry, GroupStats};
pub use hashring::HashRing;
pub use peers::{HttpGetter, HttpPool, NodeGetter, NodePicker, PoolConfig};
pub use singleflight::SingleFlight;
