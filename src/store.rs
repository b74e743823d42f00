//! Main Store struct tying all components together.

use crate::audit::{AuditLogEntry, AuditRecorder, FileAuditSink};
use crate::diff::{DiffOptions, DEFAULT_EXCLUDED_FIELDS};
use crate::error::{HistoryError, Result};
use crate::reconstruct::Reconstructor;
use crate::snapshot::DEFAULT_SNAPSHOT_INTERVAL;
use crate::types::{Actor, Attributes, RequestContext, StateMap};
use crate::versions::{FileBackend, VersionRecord, VersionStore, VersionStoreConfig, Versionable};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Versions at multiples of this interval carry a full snapshot.
    pub snapshot_interval: u64,

    /// Fields never tracked by either the version history or the audit trail.
    pub excluded_fields: Vec<String>,

    /// Decoded version records kept in memory.
    pub record_cache_size: usize,

    /// Sync the logs to disk every N writes.
    pub sync_interval: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./history"),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            excluded_fields: DEFAULT_EXCLUDED_FIELDS.iter().map(|f| f.to_string()).collect(),
            record_cache_size: FileBackend::DEFAULT_CACHE_SIZE,
            sync_interval: 1,
            create_if_missing: true,
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entity_count: u64,
    pub version_count: u64,
    pub audit_entry_count: u64,
    pub versions_size_bytes: u64,
    pub audit_size_bytes: u64,
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"ANS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// A directory-backed history store.
///
/// Holds the version history and the audit trail of any number of
/// entities. Only one process may open a store at a time.
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    versions: VersionStore<FileBackend>,

    audit: AuditRecorder<FileAuditSink>,
}

impl Store {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(HistoryError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        Self::open_components(config)
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        Self::open_components(config)
    }

    fn open_components(config: StoreConfig) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.path)?;

        let backend = FileBackend::open_with(
            config.path.join("versions.log"),
            config.record_cache_size,
            config.sync_interval,
        )?;
        let sink =
            FileAuditSink::open_with_sync_interval(config.path.join("audit.log"), config.sync_interval)?;

        let diff_options = DiffOptions::excluding(config.excluded_fields.iter().cloned());
        let versions = VersionStore::with_config(
            backend,
            VersionStoreConfig {
                snapshot_interval: config.snapshot_interval,
                diff_options: diff_options.clone(),
            },
        );
        let audit = AuditRecorder::with_diff_options(sink, diff_options);

        tracing::info!(path = %config.path.display(), "opened history store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            versions,
            audit,
        })
    }

    // --- Components ---

    /// Version history operations.
    pub fn versions(&self) -> &VersionStore<FileBackend> {
        &self.versions
    }

    /// Audit trail operations.
    pub fn audit(&self) -> &AuditRecorder<FileAuditSink> {
        &self.audit
    }

    pub fn reconstructor(&self) -> Reconstructor<&FileBackend> {
        self.versions.reconstructor()
    }

    // --- Combined operations ---

    /// Record the creation of an entity: version 1 plus a CREATE audit entry.
    pub fn record_create<E: Versionable>(
        &self,
        entity: &mut E,
        actor: &Actor,
        context: Option<&RequestContext>,
    ) -> Result<(VersionRecord, AuditLogEntry)> {
        let state = entity.to_snapshot();
        let version = self.versions.record_initial(entity, actor)?;
        let entry = self.audit.log_create(
            entity.entity_type(),
            &entity.entity_id(),
            &state,
            Some(actor),
            context,
        )?;
        Ok((version, entry))
    }

    /// Record an update given the entity's state before the mutation.
    ///
    /// The two halves are independent: an update touching only fields the
    /// entity does not version still produces an audit entry.
    pub fn record_update<E: Versionable>(
        &self,
        entity: &mut E,
        old_state: &Attributes,
        actor: &Actor,
        reason: Option<&str>,
        context: Option<&RequestContext>,
    ) -> Result<(Option<VersionRecord>, Option<AuditLogEntry>)> {
        let new_state = entity.to_snapshot();
        let version = self.versions.record_change(entity, old_state, actor, reason)?;
        let entry = self.audit.log_update(
            entity.entity_type(),
            &entity.entity_id(),
            old_state,
            &new_state,
            Some(actor),
            context,
        )?;
        Ok((version, entry))
    }

    /// Record a deletion in the audit trail. Version history is left intact.
    pub fn record_delete<E: Versionable>(
        &self,
        entity: &E,
        actor: &Actor,
        context: Option<&RequestContext>,
    ) -> Result<AuditLogEntry> {
        self.audit.log_delete(
            entity.entity_type(),
            &entity.entity_id(),
            &entity.to_snapshot(),
            Some(actor),
            context,
        )
    }

    /// State of an entity at a past version.
    pub fn reconstruct_at_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        version: u64,
    ) -> Result<Option<StateMap>> {
        self.versions.reconstruct_at_version(entity_type, entity_id, version)
    }

    // --- Store Operations ---

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let backend = self.versions.backend();
        let sink = self.audit.sink();
        StoreStats {
            entity_count: backend.entity_count() as u64,
            version_count: backend.version_count() as u64,
            audit_entry_count: sink.len(),
            versions_size_bytes: backend.size(),
            audit_size_bytes: sink.size(),
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.versions.backend().sync()?;
        self.audit.sink().sync()?;
        Ok(())
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let manifest_path = path.join("MANIFEST");
        if !manifest_path.exists() {
            return Err(HistoryError::NotInitialized);
        }
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(HistoryError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(HistoryError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| HistoryError::Locked)?;
        Ok(lock_file)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
