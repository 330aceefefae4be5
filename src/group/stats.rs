//! Per-group counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters updated by a [`super::Group`]
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub gets: AtomicU64,
    pub cache_hits: AtomicU64,
    pub peer_loads: AtomicU64,
    pub peer_errors: AtomicU64,
    pub loads: AtomicU64,
    pub loads_deduped: AtomicU64,
    pub local_loads: AtomicU64,
    pub local_load_errs: AtomicU64,
    pub server_requests: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GroupStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        GroupStats {
            gets: load(&self.gets),
            cache_hits: load(&self.cache_hits),
            peer_loads: load(&self.peer_loads),
            peer_errors: load(&self.peer_errors),
            loads: load(&self.loads),
            loads_deduped: load(&self.loads_deduped),
            local_loads: load(&self.local_loads),
            local_load_errs: load(&self.local_load_errs),
            server_requests: load(&self.server_requests),
        }
    }
}

/// Point-in-time group statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    /// Lookups, including ones served from cache
    pub gets: u64,
    /// Lookups answered by the local cache
    pub cache_hits: u64,
    /// Values fetched from a remote peer
    pub peer_loads: u64,
    /// Failed remote fetches (each fell back to the loader)
    pub peer_errors: u64,
    /// Lookups that missed the cache
    pub loads: u64,
    /// Misses that shared another caller's in-flight load
    pub loads_deduped: u64,
    /// Successful loader calls
    pub local_loads: u64,
    /// Failed loader calls
    pub local_load_errs: u64,
    /// Lookups received from remote peers
    pub server_requests: u64,
}
