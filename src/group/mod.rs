//! Cache Groups
//!
//! A [`Group`] is a named cache namespace. It answers lookups from its local
//! [`Cache`], and on a miss coalesces concurrent loads for the key and
//! resolves the value from the owning peer or from the backing-store
//! [`Getter`].
//!
//! # Lookup Flow
//!
//! ```text
//! get(key)
//!   │
//!   ├─ empty key ─────────────────────────────▶ Error::EmptyKey
//!   ├─ local cache hit ───────────────────────▶ value
//!   └─ loader flight (key)
//!        ├─ peer owns key ─▶ fetch ─ ok ─────▶ value (not cached locally)
//!        │                         └ err ─┐
//!        └─ self owns key / no peers ◀────┘
//!             └─ local flight (key)
//!                  └─ Getter::get ─ ok ─▶ populate cache ─▶ value
//!                                  └ err ───────────▶ Error::Getter
//!
//! get_for_peer(key)
//!   └─ cache hit, else local flight (key) only
//! ```
//!
//! Lookups served for a remote peer join the local flight and never the
//! loader flight, so they cannot pick up a value this node forwarded
//! elsewhere, and two nodes forwarding a key to each other never wait on
//! one another.

mod registry;
mod stats;

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::cache::{ByteView, Cache, CacheStats};
use crate::error::{Error, Result};
use crate::peers::{NodeGetter, NodePicker};
use crate::singleflight::SingleFlight;

pub use registry::GroupRegistry;
pub use stats::GroupStats;

use stats::Counters;

// =============================================================================
// Loader
// =============================================================================

/// Loads the authoritative value for a key from the backing store.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Fetch the bytes for `key`
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts a plain closure into a [`Getter`].
///
/// ```
/// use peercache::{GetterFn, GroupRegistry};
///
/// let registry = GroupRegistry::new();
/// let getter = GetterFn(|key: &str| -> anyhow::Result<Vec<u8>> {
///     Ok(key.to_uppercase().into_bytes())
/// });
/// let group = registry.new_group("upper", 1 << 20, getter).unwrap();
/// assert_eq!(group.name(), "upper");
/// ```
pub struct GetterFn<F>(pub F);

#[async_trait]
impl<F> Getter for GetterFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.0)(key)
    }
}

impl<F> fmt::Debug for GetterFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GetterFn")
    }
}

// =============================================================================
// Group
// =============================================================================

/// A named cache namespace with its own loader, cache and peer routing
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    main_cache: Cache,
    peers: OnceLock<Arc<dyn NodePicker>>,
    /// Full miss path, peer fetch included
    loader: SingleFlight<Result<ByteView>>,
    /// Backing-store loads only
    local_loader: SingleFlight<Result<ByteView>>,
    stats: Counters,
}

impl Group {
    pub(crate) fn new(name: String, cache_bytes: i64, getter: Arc<dyn Getter>) -> Self {
        Self {
            name,
            getter,
            main_cache: Cache::new(cache_bytes),
            peers: OnceLock::new(),
            loader: SingleFlight::new(),
            local_loader: SingleFlight::new(),
            stats: Counters::default(),
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte budget of the local cache
    pub fn cache_bytes(&self) -> i64 {
        self.main_cache.cache_bytes()
    }

    /// Attach the peer picker used to route misses. Allowed once.
    pub fn register_node_picker(&self, picker: Arc<dyn NodePicker>) -> Result<()> {
        self.peers
            .set(picker)
            .map_err(|_| Error::NodePickerAlreadyRegistered {
                group: self.name.clone(),
            })
    }

    /// Look up `key`, loading it from the owning peer or the loader on a miss
    #[instrument(skip(self), fields(group = %self.name))]
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        self.lookup(key, true).await
    }

    /// Look up `key` on behalf of a remote peer.
    ///
    /// Counts a server request and resolves from the local cache or loader
    /// only, so a forwarded request never hops again.
    #[instrument(skip(self), fields(group = %self.name))]
    pub async fn get_for_peer(&self, key: &str) -> Result<ByteView> {
        Counters::incr(&self.stats.server_requests);
        self.lookup(key, false).await
    }

    /// Group counters
    pub fn stats(&self) -> GroupStats {
        self.stats.snapshot()
    }

    /// Local cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.main_cache.stats()
    }

    async fn lookup(&self, key: &str, use_peers: bool) -> Result<ByteView> {
        Counters::incr(&self.stats.gets);
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        if let Some(value) = self.main_cache.get(key) {
            Counters::incr(&self.stats.cache_hits);
            debug!(key, "cache hit");
            return Ok(value);
        }

        Counters::incr(&self.stats.loads);
        if use_peers {
            self.load(key).await
        } else {
            self.load_locally(key).await
        }
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        let (result, shared) = self
            .loader
            .work(key, || async {
                if let Some(node) = self.peers.get().and_then(|p| p.pick_node(key)) {
                    match self.get_from_node(node.as_ref(), key).await {
                        Ok(value) => {
                            Counters::incr(&self.stats.peer_loads);
                            return Ok(value);
                        }
                        Err(e) => {
                            Counters::incr(&self.stats.peer_errors);
                            warn!(key, error = %e, "peer fetch failed, loading locally");
                        }
                    }
                }
                self.load_locally(key).await
            })
            .await;

        if shared {
            Counters::incr(&self.stats.loads_deduped);
        }
        result
    }

    async fn load_locally(&self, key: &str) -> Result<ByteView> {
        let (result, shared) = self
            .local_loader
            .work(key, || self.get_locally(key))
            .await;

        if shared {
            Counters::incr(&self.stats.loads_deduped);
        }
        result
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.getter.get(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                Counters::incr(&self.stats.local_load_errs);
                return Err(Error::getter(key, e));
            }
        };
        Counters::incr(&self.stats.local_loads);

        let value = ByteView::from(bytes);
        self.populate_cache(key, value.clone());
        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }

    async fn get_from_node(&self, node: &dyn NodeGetter, key: &str) -> Result<ByteView> {
        let bytes = node.get(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache_bytes", &self.main_cache.cache_bytes())
            .field("has_peers", &self.peers.get().is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
