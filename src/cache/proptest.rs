//! Property-Based Tests for the LRU Cache
//!
//! Drives [`LruCache`] and a naive recency list with the same random
//! operation sequences and checks they never disagree.
//!
//! # Test Properties
//!
//! 1. **Budget**: tracked bytes never exceed a positive capacity
//! 2. **Recency**: the evicted entry is always the least recently touched one
//! 3. **Visibility**: an evicted key is never found again

#![cfg(test)]

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use super::lru::{LruCache, Value};

#[derive(Debug, Clone)]
enum Op {
    Add(String, usize),
    Get(String),
}

/// Keys drawn from a small alphabet so operations collide often.
fn key_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e", "ff", "ggg", "hhhh"])
        .prop_map(str::to_string)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key_strategy(), 0usize..24).prop_map(|(k, n)| Op::Add(k, n)),
        key_strategy().prop_map(Op::Get),
    ]
}

/// Reference model: most recent first.
#[derive(Default)]
struct Model {
    entries: Vec<(String, usize)>,
    evicted: Vec<String>,
}

impl Model {
    fn bytes(&self) -> i64 {
        self.entries.iter().map(|(k, n)| (k.len() + n) as i64).sum()
    }

    fn touch(&mut self, key: &str) -> Option<usize> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        let entry = self.entries.remove(pos);
        let size = entry.1;
        self.entries.insert(0, entry);
        Some(size)
    }

    fn add(&mut self, key: String, size: usize, cap: i64) {
        if self.touch(&key).is_some() {
            self.entries[0].1 = size;
        } else {
            self.entries.insert(0, (key, size));
        }
        while cap > 0 && self.bytes() > cap {
            if let Some((k, _)) = self.entries.pop() {
                self.evicted.push(k);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the LRU matches the model after every operation.
    #[test]
    fn prop_lru_matches_model(
        cap in 1i64..64,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let mut lru: LruCache<Vec<u8>> = LruCache::new(
            cap,
            Some(Box::new(move |key: &str, _value: &Vec<u8>| sink.lock().push(key.to_string()))),
        );
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Add(key, size) => {
                    lru.add(key.clone(), vec![0u8; size]);
                    model.add(key, size, cap);
                }
                Op::Get(key) => {
                    let got = lru.get(&key).map(Value::size);
                    let expected = model.touch(&key);
                    prop_assert_eq!(got, expected);
                }
            }

            prop_assert!(lru.bytes() <= cap);
            prop_assert_eq!(lru.bytes(), model.bytes());
            prop_assert_eq!(lru.len(), model.entries.len());

            let keys: Vec<&str> = lru.keys().collect();
            let model_keys: Vec<&str> = model.entries.iter().map(|(k, _)| k.as_str()).collect();
            prop_assert_eq!(keys, model_keys);
        }

        prop_assert_eq!(&*evicted.lock(), &model.evicted);
        for key in &model.evicted {
            if !model.entries.iter().any(|(k, _)| k == key) {
                prop_assert!(!lru.contains(key));
            }
        }
    }

    /// Property: an unbounded cache keeps every distinct key.
    #[test]
    fn prop_unbounded_keeps_everything(
        ops in prop::collection::vec((key_strategy(), 0usize..24), 1..100),
    ) {
        let mut lru: LruCache<Vec<u8>> = LruCache::unbounded();
        let mut distinct = std::collections::HashSet::new();

        for (key, size) in ops {
            distinct.insert(key.clone());
            lru.add(key, vec![1u8; size]);
        }

        prop_assert_eq!(lru.len(), distinct.len());
    }
}
