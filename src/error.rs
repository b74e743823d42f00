//! Error types for the history engine.

use crate::types::EntityKey;
use thiserror::Error;

/// Main error type for history operations.
///
/// Missing data and no-op mutations are never errors; they surface as
/// `Ok(None)` or empty collections.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    /// Two writers allocated the same version number for one entity.
    /// The caller should re-read the latest version and retry.
    #[error("Version conflict: {key} already has version {version}")]
    VersionConflict { key: EntityKey, version: u64 },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl HistoryError {
    /// Whether retrying the same call after re-reading state may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, HistoryError::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Serialization(e.to_string())
    }
}

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
