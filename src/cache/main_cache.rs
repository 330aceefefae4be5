//! Mutex-guarded cache owned by a group

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::byteview::ByteView;
use super::lru::LruCache;

/// Concurrency-safe, lazily built wrapper around [`LruCache`].
///
/// The LRU is only allocated on the first [`Cache::add`], so a group that
/// never populates its cache costs nothing.
#[derive(Debug)]
pub struct Cache {
    /// Byte budget handed to the LRU when it is built
    cache_bytes: i64,
    lru: Mutex<Option<LruCache<ByteView>>>,
    gets: AtomicU64,
    hits: AtomicU64,
    /// Shared with the LRU eviction callback
    evictions: Arc<AtomicU64>,
}

impl Cache {
    /// Create an empty cache with the given byte budget
    pub fn new(cache_bytes: i64) -> Self {
        Self {
            cache_bytes,
            lru: Mutex::new(None),
            gets: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Store a value, building the LRU on first use
    pub fn add(&self, key: &str, value: ByteView) {
        let mut guard = self.lru.lock();
        let lru = guard.get_or_insert_with(|| {
            let evictions = Arc::clone(&self.evictions);
            LruCache::new(
                self.cache_bytes,
                Some(Box::new(move |_key: &str, _value: &ByteView| {
                    evictions.fetch_add(1, Ordering::Relaxed);
                })),
            )
        });
        lru.add(key, value);
    }

    /// Look up a value; a cache that was never written always misses
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lru.lock();
        let value = guard.as_mut()?.get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Configured byte budget
    pub fn cache_bytes(&self) -> i64 {
        self.cache_bytes
    }

    /// Snapshot of size and access counters
    pub fn stats(&self) -> CacheStats {
        let guard = self.lru.lock();
        let (bytes, items) = guard
            .as_ref()
            .map(|lru| (lru.bytes(), lru.len()))
            .unwrap_or_default();

        CacheStats {
            bytes,
            items,
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Bytes tracked by the LRU
    pub bytes: i64,
    /// Number of entries
    pub items: usize,
    /// Lookups
    pub gets: u64,
    /// Lookups that found a value
    pub hits: u64,
    /// Entries evicted for space
    pub evictions: u64,
}

impl CacheStats {
    /// Hit ratio (0.0 - 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_before_first_add_misses() {
        let cache = Cache::new(1024);
        assert!(cache.get("anything").is_none());

        let stats = cache.stats();
        assert_eq!(stats.items, 0);
        assert_eq!(stats.gets, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_add_then_get() {
        let cache = Cache::new(1024);
        cache.add("Tom", ByteView::from("630"));

        assert_eq!(cache.get("Tom"), Some(ByteView::from("630")));
        let stats = cache.stats();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.bytes, 6);
        assert_eq!(stats.hit_ratio(), 1.0);
    }

    #[test]
    fn test_evictions_are_counted() {
        let cache = Cache::new(8);
        cache.add("k1", ByteView::from("v1"));
        cache.add("k2", ByteView::from("v2"));
        cache.add("k3", ByteView::from("v3"));

        let stats = cache.stats();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.evictions, 1);
        assert!(cache.get("k1").is_none());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let cache = Arc::new(Cache::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("obj-{}-{}", t, i);
                        cache.add(&key, ByteView::from(vec![i as u8; 16]));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.stats().items, 4000);
    }
}
