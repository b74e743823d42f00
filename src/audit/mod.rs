//! Human-oriented audit trail.
//!
//! One immutable entry per logged action. Unlike version history, the
//! audit trail cannot be replayed; it exists for display and compliance.

mod entry;
mod recorder;
mod sink;

pub use entry::{AuditAction, AuditChanges, AuditLogEntry};
pub use recorder::{display_name, AuditRecorder};
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};
