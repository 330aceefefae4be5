//! Group registry
//!
//! Owns every [`Group`] a process serves, keyed by name. The peer server
//! resolves incoming requests through it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{Getter, Group};
use crate::error::{Error, Result};

/// Name-indexed collection of groups
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group and register it under `name`.
    ///
    /// `cache_bytes <= 0` leaves the local cache unbounded. Fails if a group
    /// with the same name is already registered.
    pub fn new_group(
        &self,
        name: impl Into<String>,
        cache_bytes: i64,
        getter: impl Getter + 'static,
    ) -> Result<Arc<Group>> {
        let name = name.into();
        let mut groups = self.groups.write();
        if groups.contains_key(&name) {
            return Err(Error::DuplicateGroup(name));
        }

        let group = Arc::new(Group::new(name.clone(), cache_bytes, Arc::new(getter)));
        groups.insert(name.clone(), Arc::clone(&group));
        info!(group = %name, cache_bytes, "group registered");
        Ok(group)
    }

    /// Look up a group by name
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Registered group names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered groups, sorted by name
    pub fn groups(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<Arc<Group>> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    /// Number of registered groups
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Check if no group is registered
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}
