//! File-backed version storage.

use super::backend::VersionBackend;
use super::record::VersionRecord;
use crate::error::{HistoryError, Result};
use crate::records::{IndexEntry, RecordIndex, RecordLog};
use crate::types::EntityKey;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::Path;

/// Log entry kind for version records.
const VERSION_KIND: &str = "version";

/// Version storage on an append-only log.
///
/// The index is rebuilt from the log on open. Decoded records are kept in
/// an LRU cache keyed by log offset.
pub struct FileBackend {
    log: RecordLog,
    index: RecordIndex,
    cache: Mutex<LruCache<u64, VersionRecord>>,

    /// Serializes the uniqueness check with the append.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Default number of cached records.
    pub const DEFAULT_CACHE_SIZE: usize = 1024;

    /// Open or create a backend at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Self::DEFAULT_CACHE_SIZE, RecordLog::DEFAULT_SYNC_INTERVAL)
    }

    /// Open with a custom cache size and log sync interval.
    pub fn open_with(path: impl AsRef<Path>, cache_size: usize, sync_interval: u64) -> Result<Self> {
        let log = RecordLog::open_with_sync_interval(path, sync_interval)?;
        let index = RecordIndex::new();

        for result in log.iter_from(0) {
            let (offset, entry) = result?;
            if entry.kind != VERSION_KIND {
                continue;
            }
            let record: VersionRecord = serde_json::from_slice(&entry.payload)
                .map_err(|e| HistoryError::Deserialization(e.to_string()))?;
            let added = index.add(
                &record.key(),
                record.version_number,
                IndexEntry {
                    offset,
                    has_snapshot: record.has_snapshot(),
                },
            );
            if !added {
                return Err(HistoryError::Corruption(format!(
                    "duplicate version {} for {} at offset {}",
                    record.version_number,
                    record.key(),
                    offset
                )));
            }
        }

        tracing::debug!(
            path = %log.path().display(),
            entities = index.entity_count(),
            versions = index.total(),
            "opened version log"
        );

        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            log,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
        })
    }

    /// Number of entities with at least one version.
    pub fn entity_count(&self) -> usize {
        self.index.entity_count()
    }

    /// Total versions across all entities.
    pub fn version_count(&self) -> usize {
        self.index.total()
    }

    /// Size of the underlying log in bytes.
    pub fn size(&self) -> u64 {
        self.log.size()
    }

    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    fn read_record(&self, offset: u64) -> Result<VersionRecord> {
        if let Some(record) = self.cache.lock().get(&offset).cloned() {
            return Ok(record);
        }

        let entry = self.log.read_at(offset)?;
        let record: VersionRecord = serde_json::from_slice(&entry.payload)
            .map_err(|e| HistoryError::Deserialization(e.to_string()))?;

        self.cache.lock().put(offset, record.clone());
        Ok(record)
    }

    fn read_all(&self, offsets: Vec<u64>) -> Result<Vec<VersionRecord>> {
        offsets.into_iter().map(|o| self.read_record(o)).collect()
    }
}

impl VersionBackend for FileBackend {
    fn last_version_number(&self, key: &EntityKey) -> Result<u64> {
        Ok(self.index.last_version(key))
    }

    fn insert(&self, record: VersionRecord) -> Result<VersionRecord> {
        let _lock = self.write_lock.lock();

        let key = record.key();
        if self.index.contains(&key, record.version_number) {
            return Err(HistoryError::VersionConflict {
                key,
                version: record.version_number,
            });
        }

        let payload = serde_json::to_vec(&record)?;
        let (_, offset) = self.log.append(VERSION_KIND, payload)?;

        self.index.add(
            &key,
            record.version_number,
            IndexEntry {
                offset,
                has_snapshot: record.has_snapshot(),
            },
        );
        self.cache.lock().put(offset, record.clone());

        Ok(record)
    }

    fn get(&self, key: &EntityKey, version: u64) -> Result<Option<VersionRecord>> {
        match self.index.get(key, version) {
            Some(entry) => self.read_record(entry.offset).map(Some),
            None => Ok(None),
        }
    }

    fn history(&self, key: &EntityKey, limit: usize, offset: usize) -> Result<Vec<VersionRecord>> {
        self.read_all(self.index.descending(key, limit, offset))
    }

    fn range(&self, key: &EntityKey, from: u64, to: u64) -> Result<Vec<VersionRecord>> {
        self.read_all(self.index.ascending(key, from, to))
    }

    fn count(&self, key: &EntityKey) -> Result<u64> {
        Ok(self.index.count(key) as u64)
    }

    fn latest_snapshot_at_or_before(
        &self,
        key: &EntityKey,
        version: u64,
    ) -> Result<Option<VersionRecord>> {
        match self.index.snapshot_at_or_before(key, version) {
            Some((_, entry)) => self.read_record(entry.offset).map(Some),
            None => Ok(None),
        }
    }
}
