//! Peer Routing and Transport
//!
//! A group asks its [`NodePicker`] who owns a key. The picker answers with a
//! [`NodeGetter`] for a remote owner, or `None` when the current node owns
//! the key (or no peers are known) and the value should be loaded locally.
//!
//! ```text
//! ┌──────────────┐  pick_node(key)  ┌──────────────┐   GET <base>/<group>/<key>   ┌──────────────┐
//! │    Group     │─────────────────▶│   HttpPool   │────────────────────────────▶│  remote node │
//! │              │◀─ HttpGetter ────│ (hash ring)  │◀──── raw value bytes ───────│   HttpPool   │
//! └──────────────┘                  └──────────────┘                             └──────────────┘
//! ```

mod client;
mod http_pool;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use client::HttpGetter;
pub use http_pool::{HttpPool, PoolConfig, DEFAULT_BASE_PATH, DEFAULT_REPLICAS};

/// Chooses the node that owns a key
pub trait NodePicker: Send + Sync {
    /// Fetcher for the remote owner of `key`, or `None` to load locally
    fn pick_node(&self, key: &str) -> Option<Arc<dyn NodeGetter>>;
}

/// Fetches a value from one remote node
#[async_trait]
pub trait NodeGetter: Send + Sync {
    /// Fetch `key` of `group` from the node
    async fn get(&self, group: &str, key: &str) -> Result<Bytes>;
}
