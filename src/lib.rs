//! # Annals
//!
//! Change tracking and version history for domain entities.
//!
//! ## Core Concepts
//!
//! - **Diffs**: Field-level change sets between two states, over normalized values
//! - **Audit trail**: One immutable, human-oriented entry per logged action
//! - **Versions**: Append-only, per-entity numbered history of diffs
//! - **Snapshots**: Periodic full states that bound reconstruction cost
//! - **Reconstruction**: The exact state of an entity at any recorded version
//!
//! ## Example
//!
//! ```ignore
//! use annals::{Actor, Attributes, Store, StoreConfig};
//!
//! let store = Store::open_or_create(StoreConfig {
//!     path: "./history".into(),
//!     ..Default::default()
//! })?;
//!
//! let versions = store.versions();
//! versions.create_initial_version("customer", "42", &before, &Actor::system())?;
//! versions.create_version("customer", "42", &before, &after, &Actor::system(), None)?;
//!
//! let state = store.reconstruct_at_version("customer", "42", 1)?;
//! ```

pub mod audit;
pub mod diff;
pub mod error;
pub mod reconstruct;
pub mod records;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod versions;

// Re-exports
pub use audit::{
    display_name, AuditAction, AuditChanges, AuditLogEntry, AuditRecorder, AuditSink,
    FileAuditSink, MemoryAuditSink,
};
pub use diff::{
    compute_diff, compute_diff_with, normalize, normalize_state, ChangeSet, DiffOptions,
    FieldChange, DEFAULT_EXCLUDED_FIELDS,
};
pub use error::{HistoryError, Result};
pub use reconstruct::{apply_diff, Reconstructor};
pub use records::{RecordIndex, RecordLog};
pub use snapshot::{should_snapshot, SnapshotPolicy, DEFAULT_SNAPSHOT_INTERVAL};
pub use store::{Store, StoreConfig, StoreStats};
pub use types::*;
pub use versions::{
    narrow, FileBackend, MemoryBackend, VersionBackend, VersionDiff, VersionRecord, VersionStore,
    VersionStoreConfig, Versionable,
};
