//! On-disk record storage.
//!
//! Records are stored in an append-only, checksummed log. The index maps
//! entity versions to log offsets and is rebuilt from the log on open.

mod index;
mod log;

pub use index::{IndexEntry, RecordIndex};
pub use log::{LogEntry, LogIterator, RecordLog};
