//! Byte-bounded LRU Cache
//!
//! Least-recently-used store keyed by string, accounting every entry as
//! `key.len() + value.size()` bytes against a fixed budget.
//!
//! # Design
//!
//! - Entries live in a dense `Vec` and are linked into a recency list by index
//! - A `HashMap` from key to slot gives O(1) lookup
//! - Removal swaps the last slot into the hole, so the arena never has gaps
//!
//! The cache is not synchronized. [`super::Cache`] serializes access with a
//! mutex.

use std::collections::HashMap;
use std::fmt;

/// A value that reports how many bytes it occupies
pub trait Value {
    /// Size in bytes charged against the cache budget
    fn size(&self) -> usize;
}

impl Value for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Value for String {
    fn size(&self) -> usize {
        self.len()
    }
}

/// Callback run for every entry evicted by [`LruCache::remove_oldest`].
///
/// It runs synchronously while the owning cache is borrowed (and, inside
/// [`super::Cache`], while its mutex is held). It must not call back into the
/// same cache.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

struct Node<V> {
    key: String,
    value: V,
    /// Neighbour towards the most recent end
    prev: Option<usize>,
    /// Neighbour towards the oldest end
    next: Option<usize>,
}

/// Byte-bounded least-recently-used cache
pub struct LruCache<V> {
    /// Budget in bytes; zero or negative means unbounded
    max_bytes: i64,
    /// Bytes currently tracked
    used_bytes: i64,
    nodes: Vec<Node<V>>,
    index: HashMap<String, usize>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: Value> LruCache<V> {
    /// Create a cache with a byte budget and an optional eviction callback
    pub fn new(max_bytes: i64, on_evicted: Option<EvictionCallback<V>>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            nodes: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            on_evicted,
        }
    }

    /// Create a cache without a byte budget
    pub fn unbounded() -> Self {
        Self::new(0, None)
    }

    /// Look up a key, marking it most recently used on a hit
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        Some(&self.nodes[idx].value)
    }

    /// Check for a key without touching recency
    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace a value, then evict until within budget
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();

        if let Some(&idx) = self.index.get(&key) {
            self.move_to_front(idx);
            let node = &mut self.nodes[idx];
            self.used_bytes += value.size() as i64 - node.value.size() as i64;
            node.value = value;
        } else {
            self.used_bytes += (key.len() + value.size()) as i64;
            let idx = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.index.insert(key, idx);
            self.push_front(idx);
        }

        while self.max_bytes > 0 && self.used_bytes > self.max_bytes {
            self.remove_oldest();
        }
    }

    /// Evict the least recently used entry, if any
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        let node = self.remove_at(idx);
        self.used_bytes -= (node.key.len() + node.value.size()) as i64;

        if let Some(callback) = self.on_evicted.as_mut() {
            callback(&node.key, &node.value);
        }

        Some((node.key, node.value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bytes currently tracked
    pub fn bytes(&self) -> i64 {
        self.used_bytes
    }

    /// Keys from most to least recently used
    #[cfg(test)]
    pub(crate) fn keys(&self) -> Keys<'_, V> {
        Keys {
            cache: self,
            cursor: self.head,
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx];
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => self.nodes[head].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[idx];
        node.prev = None;
        node.next = None;
    }

    fn remove_at(&mut self, idx: usize) -> Node<V> {
        self.detach(idx);
        let last = self.nodes.len() - 1;
        let node = self.nodes.swap_remove(idx);
        self.index.remove(&node.key);

        // The former last slot now lives at `idx`; repoint its neighbours.
        if idx != last {
            let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
            match prev {
                Some(p) => self.nodes[p].next = Some(idx),
                None => self.head = Some(idx),
            }
            match next {
                Some(n) => self.nodes[n].prev = Some(idx),
                None => self.tail = Some(idx),
            }
            if let Some(slot) = self.index.get_mut(&self.nodes[idx].key) {
                *slot = idx;
            }
        }

        node
    }
}

impl<V> fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("entries", &self.nodes.len())
            .field("has_on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}

/// Iterator over keys in recency order
#[cfg(test)]
pub(crate) struct Keys<'a, V> {
    cache: &'a LruCache<V>,
    cursor: Option<usize>,
}

#[cfg(test)]
impl<'a, V> Iterator for Keys<'a, V> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.cache.nodes[self.cursor?];
        self.cursor = node.next;
        Some(node.key.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================
