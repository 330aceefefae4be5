//! Consistent Hash Ring
//!
//! Maps keys onto a dynamic set of nodes. Each real node is placed on a 32-bit
//! ring `replicas` times (virtual nodes) to smooth the key distribution; a key
//! belongs to the first virtual node found walking clockwise from its hash.
//!
//! ```text
//!            0 ─────────────── 2^32-1
//!            │  A#0   B#1  A#1   B#0 │
//!  key ──▶ hash(key) ──▶ first position ≥ hash (wraps to the start)
//! ```
//!
//! The ring is not synchronized. Replace it wholesale when the node set
//! changes and guard it with the same lock as anything derived from it.

use std::collections::HashMap;
use std::fmt;

/// Hash function from bytes to a ring position
pub type HashFn = fn(&[u8]) -> u32;

/// Consistent hash ring with virtual nodes
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted virtual node positions
    positions: Vec<u32>,
    /// Virtual node position to real node
    nodes: HashMap<u32, String>,
}

impl HashRing {
    /// Create an empty ring. `hash` defaults to CRC-32 (IEEE).
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            hash: hash.unwrap_or(crc32fast::hash),
            replicas,
            positions: Vec::new(),
            nodes: HashMap::new(),
        }
    }

    /// Add real nodes, `replicas` virtual positions each.
    ///
    /// Nodes accumulate across calls. When two virtual positions collide the
    /// node added last owns the position.
    pub fn add_nodes<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", i, node).as_bytes());
                self.positions.push(position);
                self.nodes.insert(position, node.to_string());
            }
        }
        self.positions.sort_unstable();
    }

    /// Node owning `key`, or `None` if the ring is empty
    pub fn get_node(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.positions.partition_point(|&p| p < hash);
        let position = self.positions[idx % self.positions.len()];

        self.nodes.get(&position).map(String::as_str)
    }

    /// Check if no node has been added
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Virtual nodes per real node
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Number of virtual positions on the ring
    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("positions", &self.positions.len())
            .field("nodes", &self.nodes.values().collect::<std::collections::BTreeSet<_>>())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
