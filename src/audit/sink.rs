//! Persistence boundary for audit entries.

use super::entry::AuditLogEntry;
use crate::error::{HistoryError, Result};
use crate::records::RecordLog;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Append-only destination for audit entries.
///
/// The sink assigns entry ids. Whether an append is committed or rolled
/// back is decided by the caller's transaction, not by the recorder.
pub trait AuditSink: Send + Sync {
    /// Persist one entry, returning it with its id assigned.
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry>;

    /// All entries for one entity, oldest first.
    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>>;
}

impl<S: AuditSink + ?Sized> AuditSink for &S {
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry> {
        (**self).append(entry)
    }

    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>> {
        (**self).entries_for(entity_type, entity_id)
    }
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry> {
        (**self).append(entry)
    }

    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>> {
        (**self).entries_for(entity_type, entity_id)
    }
}

/// Audit entries held in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, mut entry: AuditLogEntry) -> Result<AuditLogEntry> {
        let mut entries = self.entries.write();
        entry.id = entries.len() as u64 + 1;
        entries.push(entry.clone());
        Ok(entry)
    }

    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id.as_deref() == Some(entity_id))
            .cloned()
            .collect())
    }
}

/// Log entry kind for audit records.
const AUDIT_KIND: &str = "audit";

/// Audit entries on an append-only log file.
pub struct FileAuditSink {
    log: RecordLog,

    /// (entity_type, entity_id) -> offsets, oldest first.
    by_entity: RwLock<HashMap<(String, String), Vec<u64>>>,

    write_lock: Mutex<()>,
}

impl FileAuditSink {
    /// Open or create an audit log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, RecordLog::DEFAULT_SYNC_INTERVAL)
    }

    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let log = RecordLog::open_with_sync_interval(path, sync_interval)?;
        let mut by_entity: HashMap<(String, String), Vec<u64>> = HashMap::new();

        for result in log.iter_from(0) {
            let (offset, raw) = result?;
            if raw.kind != AUDIT_KIND {
                continue;
            }
            let entry = Self::decode(&raw.payload)?;
            if let Some(entity_id) = entry.entity_id {
                by_entity
                    .entry((entry.entity_type, entity_id))
                    .or_default()
                    .push(offset);
            }
        }

        Ok(Self {
            log,
            by_entity: RwLock::new(by_entity),
            write_lock: Mutex::new(()),
        })
    }

    /// Number of entries in the log.
    pub fn len(&self) -> u64 {
        self.log.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the underlying log in bytes.
    pub fn size(&self) -> u64 {
        self.log.size()
    }

    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Result<Vec<AuditLogEntry>> {
        let mut entries = Vec::new();
        for result in self.log.iter_from(0) {
            let (_, raw) = result?;
            if raw.kind == AUDIT_KIND {
                entries.push(Self::with_id(Self::decode(&raw.payload)?, raw.id));
            }
        }
        Ok(entries)
    }

    fn decode(payload: &[u8]) -> Result<AuditLogEntry> {
        serde_json::from_slice(payload).map_err(|e| HistoryError::Deserialization(e.to_string()))
    }

    fn with_id(mut entry: AuditLogEntry, id: u64) -> AuditLogEntry {
        entry.id = id;
        entry
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry> {
        let _lock = self.write_lock.lock();

        let payload = serde_json::to_vec(&entry)?;
        let (raw, offset) = self.log.append(AUDIT_KIND, payload)?;

        if let Some(entity_id) = &entry.entity_id {
            self.by_entity
                .write()
                .entry((entry.entity_type.clone(), entity_id.clone()))
                .or_default()
                .push(offset);
        }

        Ok(Self::with_id(entry, raw.id))
    }

    fn entries_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>> {
        let offsets = self
            .by_entity
            .read()
            .get(&(entity_type.to_string(), entity_id.to_string()))
            .cloned()
            .unwrap_or_default();

        offsets
            .into_iter()
            .map(|offset| {
                let raw = self.log.read_at(offset)?;
                Ok(Self::with_id(Self::decode(&raw.payload)?, raw.id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditChanges};
    use crate::types::Timestamp;
    use tempfile::TempDir;

    fn entry(action: AuditAction, entity_id: Option<&str>) -> AuditLogEntry {
        AuditLogEntry {
            id: 0,
            action,
            entity_type: "customer".into(),
            entity_id: entity_id.map(str::to_string),
            entity_name: None,
            changes: AuditChanges::None,
            actor_id: None,
            actor_label: None,
            ip_address: None,
            client_agent: None,
            created_at: Timestamp(0),
        }
    }

    #[test]
    fn test_memory_sink_assigns_ids() {
        let sink = MemoryAuditSink::new();
        let first = sink.append(entry(AuditAction::Create, Some("1"))).unwrap();
        let second = sink.append(entry(AuditAction::Update, Some("2"))).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(sink.entries_for("customer", "2").unwrap(), vec![second]);
    }

    #[test]
    fn test_file_sink_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");

        {
            let sink = FileAuditSink::open(&path).unwrap();
            sink.append(entry(AuditAction::Create, Some("1"))).unwrap();
            sink.append(entry(AuditAction::Login, None)).unwrap();
            sink.append(entry(AuditAction::Delete, Some("1"))).unwrap();
        }

        let sink = FileAuditSink::open(&path).unwrap();
        assert_eq!(sink.len(), 3);

        let history = sink.entries_for("customer", "1").unwrap();
        let actions: Vec<_> = history.iter().map(|e| e.action.clone()).collect();
        assert_eq!(actions, vec![AuditAction::Create, AuditAction::Delete]);
        assert_eq!(history[1].id, 3);
        assert_eq!(sink.entries().unwrap().len(), 3);
    }
}
