//! Storage boundary for version records.

use super::record::VersionRecord;
use crate::error::{HistoryError, Result};
use crate::types::EntityKey;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Durable storage for version records.
///
/// Implementations must reject a second record with the same
/// `(entity_type, entity_id, version_number)` with
/// [`HistoryError::VersionConflict`]; that constraint is what makes
/// concurrent writers to one entity detectable.
pub trait VersionBackend: Send + Sync {
    /// Highest stored version for the entity, 0 if it has no history.
    fn last_version_number(&self, key: &EntityKey) -> Result<u64>;

    /// Append a record.
    fn insert(&self, record: VersionRecord) -> Result<VersionRecord>;

    /// Exact lookup.
    fn get(&self, key: &EntityKey, version: u64) -> Result<Option<VersionRecord>>;

    /// Records newest first, skipping `offset` and returning at most `limit`.
    fn history(&self, key: &EntityKey, limit: usize, offset: usize) -> Result<Vec<VersionRecord>>;

    /// Records for versions `from..=to`, oldest first.
    fn range(&self, key: &EntityKey, from: u64, to: u64) -> Result<Vec<VersionRecord>>;

    fn count(&self, key: &EntityKey) -> Result<u64>;

    /// Newest record at or before `version` that carries a snapshot.
    fn latest_snapshot_at_or_before(
        &self,
        key: &EntityKey,
        version: u64,
    ) -> Result<Option<VersionRecord>>;
}

impl<B: VersionBackend + ?Sized> VersionBackend for &B {
    fn last_version_number(&self, key: &EntityKey) -> Result<u64> {
        (**self).last_version_number(key)
    }

    fn insert(&self, record: VersionRecord) -> Result<VersionRecord> {
        (**self).insert(record)
    }

    fn get(&self, key: &EntityKey, version: u64) -> Result<Option<VersionRecord>> {
        (**self).get(key, version)
    }

    fn history(&self, key: &EntityKey, limit: usize, offset: usize) -> Result<Vec<VersionRecord>> {
        (**self).history(key, limit, offset)
    }

    fn range(&self, key: &EntityKey, from: u64, to: u64) -> Result<Vec<VersionRecord>> {
        (**self).range(key, from, to)
    }

    fn count(&self, key: &EntityKey) -> Result<u64> {
        (**self).count(key)
    }

    fn latest_snapshot_at_or_before(
        &self,
        key: &EntityKey,
        version: u64,
    ) -> Result<Option<VersionRecord>> {
        (**self).latest_snapshot_at_or_before(key, version)
    }
}

impl<B: VersionBackend + ?Sized> VersionBackend for Arc<B> {
    fn last_version_number(&self, key: &EntityKey) -> Result<u64> {
        (**self).last_version_number(key)
    }

    fn insert(&self, record: VersionRecord) -> Result<VersionRecord> {
        (**self).insert(record)
    }

    fn get(&self, key: &EntityKey, version: u64) -> Result<Option<VersionRecord>> {
        (**self).get(key, version)
    }

    fn history(&self, key: &EntityKey, limit: usize, offset: usize) -> Result<Vec<VersionRecord>> {
        (**self).history(key, limit, offset)
    }

    fn range(&self, key: &EntityKey, from: u64, to: u64) -> Result<Vec<VersionRecord>> {
        (**self).range(key, from, to)
    }

    fn count(&self, key: &EntityKey) -> Result<u64> {
        (**self).count(key)
    }

    fn latest_snapshot_at_or_before(
        &self,
        key: &EntityKey,
        version: u64,
    ) -> Result<Option<VersionRecord>> {
        (**self).latest_snapshot_at_or_before(key, version)
    }
}

/// Version storage held entirely in memory.
#[derive(Default)]
pub struct MemoryBackend {
    versions: RwLock<HashMap<EntityKey, BTreeMap<u64, VersionRecord>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionBackend for MemoryBackend {
    fn last_version_number(&self, key: &EntityKey) -> Result<u64> {
        Ok(self
            .versions
            .read()
            .get(key)
            .and_then(|v| v.keys().next_back().copied())
            .unwrap_or(0))
    }

    fn insert(&self, record: VersionRecord) -> Result<VersionRecord> {
        let key = record.key();
        let mut versions = self.versions.write();
        let chain = versions.entry(key.clone()).or_default();
        if chain.contains_key(&record.version_number) {
            return Err(HistoryError::VersionConflict {
                key,
                version: record.version_number,
            });
        }
        chain.insert(record.version_number, record.clone());
        Ok(record)
    }

    fn get(&self, key: &EntityKey, version: u64) -> Result<Option<VersionRecord>> {
        Ok(self
            .versions
            .read()
            .get(key)
            .and_then(|v| v.get(&version))
            .cloned())
    }

    fn history(&self, key: &EntityKey, limit: usize, offset: usize) -> Result<Vec<VersionRecord>> {
        Ok(self
            .versions
            .read()
            .get(key)
            .map(|v| v.values().rev().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn range(&self, key: &EntityKey, from: u64, to: u64) -> Result<Vec<VersionRecord>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .versions
            .read()
            .get(key)
            .map(|v| v.range(from..=to).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    fn count(&self, key: &EntityKey) -> Result<u64> {
        Ok(self.versions.read().get(key).map_or(0, |v| v.len() as u64))
    }

    fn latest_snapshot_at_or_before(
        &self,
        key: &EntityKey,
        version: u64,
    ) -> Result<Option<VersionRecord>> {
        Ok(self.versions.read().get(key).and_then(|v| {
            v.range(..=version)
                .rev()
                .map(|(_, r)| r)
                .find(|r| r.has_snapshot())
                .cloned()
        }))
    }
}
