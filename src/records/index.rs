//! In-memory index from entity versions to log offsets.

use crate::types::EntityKey;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Location of one version in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub has_snapshot: bool,
}

/// Index mapping `(entity, version_number)` to log offsets.
pub struct RecordIndex {
    entries: RwLock<HashMap<EntityKey, BTreeMap<u64, IndexEntry>>>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Add an entry. Returns false if the version is already indexed.
    pub fn add(&self, key: &EntityKey, version: u64, entry: IndexEntry) -> bool {
        let mut entries = self.entries.write();
        let versions = entries.entry(key.clone()).or_default();
        if versions.contains_key(&version) {
            return false;
        }
        versions.insert(version, entry);
        true
    }

    pub fn contains(&self, key: &EntityKey, version: u64) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|v| v.contains_key(&version))
    }

    pub fn get(&self, key: &EntityKey, version: u64) -> Option<IndexEntry> {
        self.entries.read().get(key)?.get(&version).copied()
    }

    /// Highest indexed version for an entity, 0 if none.
    pub fn last_version(&self, key: &EntityKey) -> u64 {
        self.entries
            .read()
            .get(key)
            .and_then(|v| v.keys().next_back().copied())
            .unwrap_or(0)
    }

    pub fn count(&self, key: &EntityKey) -> usize {
        self.entries.read().get(key).map_or(0, BTreeMap::len)
    }

    /// Number of distinct entities with history.
    pub fn entity_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Total indexed versions across all entities.
    pub fn total(&self) -> usize {
        self.entries.read().values().map(BTreeMap::len).sum()
    }

    /// Offsets newest first, skipping `skip` and taking at most `limit`.
    pub fn descending(&self, key: &EntityKey, limit: usize, skip: usize) -> Vec<u64> {
        self.entries
            .read()
            .get(key)
            .map(|v| {
                v.values()
                    .rev()
                    .skip(skip)
                    .take(limit)
                    .map(|e| e.offset)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Offsets for versions `from..=to`, oldest first.
    pub fn ascending(&self, key: &EntityKey, from: u64, to: u64) -> Vec<u64> {
        if from > to {
            return Vec::new();
        }
        self.entries
            .read()
            .get(key)
            .map(|v| v.range(from..=to).map(|(_, e)| e.offset).collect())
            .unwrap_or_default()
    }

    /// Newest version at or before `version` that carries a snapshot.
    pub fn snapshot_at_or_before(&self, key: &EntityKey, version: u64) -> Option<(u64, IndexEntry)> {
        self.entries
            .read()
            .get(key)?
            .range(..=version)
            .rev()
            .find(|(_, e)| e.has_snapshot)
            .map(|(v, e)| (*v, *e))
    }
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}
