//! Per-entity version history.
//!
//! Each entity identity owns a linear, append-only chain of versions
//! numbered from 1. Every version stores the diff from its predecessor;
//! versions selected by the snapshot policy also store the full state.

mod backend;
mod file;
mod record;
mod store;
mod versionable;

pub use backend::{MemoryBackend, VersionBackend};
pub use file::FileBackend;
pub use record::{VersionDiff, VersionRecord};
pub use store::{VersionStore, VersionStoreConfig};
pub use versionable::{narrow, Versionable};
