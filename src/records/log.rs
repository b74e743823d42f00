//! Append-only record log.

use crate::error::{HistoryError, Result};
use crate::types::Timestamp;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for each log entry.
const LOG_MAGIC: &[u8; 4] = b"ANL\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// A single framed entry in the log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// Monotonic entry id (assigned by the log, starts at 1).
    pub id: u64,

    /// When the entry was written.
    pub timestamp: Timestamp,

    /// Application-defined kind (e.g. "version", "audit").
    pub kind: String,

    /// JSON payload.
    pub payload: Vec<u8>,
}

/// Append-only record log.
///
/// Entry layout: magic, version, flags, id, timestamp, kind, payload, crc32
/// of the payload. A torn entry at the tail (from a crash mid-write) is
/// truncated away on open.
pub struct RecordLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: Mutex<File>,

    /// Next entry id to assign.
    next_id: RwLock<u64>,

    /// Current file size (for appending).
    file_size: RwLock<u64>,

    /// Number of writes since last sync.
    writes_since_sync: Mutex<u64>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl RecordLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Open or create a log that syncs on every write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log with a custom sync interval.
    /// - sync_interval = 0 or 1: sync every write
    /// - sync_interval = 100: sync every 100 writes
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let (max_id, valid_len) = Self::scan(&mut file)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn entry at log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            next_id: RwLock::new(max_id + 1),
            file_size: RwLock::new(valid_len),
            writes_since_sync: Mutex::new(0),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append an entry. Returns the entry and the offset it was written at.
    pub fn append(&self, kind: &str, payload: Vec<u8>) -> Result<(LogEntry, u64)> {
        let mut file = self.file.lock();

        let entry = LogEntry {
            id: *self.next_id.read(),
            timestamp: Timestamp::now(),
            kind: kind.to_string(),
            payload,
        };

        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        let frame = Self::encode(&entry)?;
        file.write_all(&frame)?;

        *self.file_size.write() = offset + frame.len() as u64;
        *self.next_id.write() += 1;

        let mut writes = self.writes_since_sync.lock();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_data()?;
            *writes = 0;
        }

        Ok((entry, offset))
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        *self.writes_since_sync.lock() = 0;
        Ok(())
    }

    /// Read the entry at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        self.read_with_next(offset).map(|(entry, _)| entry)
    }

    /// Read the entry at `offset`, also returning the offset of the next one.
    pub fn read_with_next(&self, offset: u64) -> Result<(LogEntry, u64)> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let entry = Self::decode(&mut *file)?;
        let next = file.stream_position()?;
        Ok((entry, next))
    }

    /// Iterate all entries from a given offset.
    pub fn iter_from(&self, offset: u64) -> LogIterator<'_> {
        LogIterator {
            log: self,
            offset,
            end: *self.file_size.read(),
        }
    }

    /// Current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> u64 {
        *self.next_id.read() - 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(entry: &LogEntry) -> Result<Vec<u8>> {
        let kind = entry.kind.as_bytes();
        let kind_len = u16::try_from(kind.len())
            .map_err(|_| HistoryError::InvalidOperation(format!("kind too long: {}", entry.kind)))?;
        let payload_len = u32::try_from(entry.payload.len()).map_err(|_| {
            HistoryError::InvalidOperation(format!("payload too large: {} bytes", entry.payload.len()))
        })?;

        let mut buf = Vec::with_capacity(4 + 1 + 1 + 8 + 8 + 2 + kind.len() + 4 + entry.payload.len() + 4);
        buf.extend_from_slice(LOG_MAGIC);
        buf.push(LOG_VERSION);
        buf.push(0u8); // flags (reserved)
        buf.extend_from_slice(&entry.id.to_le_bytes());
        buf.extend_from_slice(&entry.timestamp.0.to_le_bytes());
        buf.extend_from_slice(&kind_len.to_le_bytes());
        buf.extend_from_slice(kind);
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&entry.payload);
        buf.extend_from_slice(&crc32fast::hash(&entry.payload).to_le_bytes());
        Ok(buf)
    }

    fn decode(reader: &mut impl Read) -> Result<LogEntry> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(HistoryError::InvalidFormat("Invalid log entry magic".into()));
        }

        let mut header = [0u8; 2];
        reader.read_exact(&mut header)?;
        if header[0] != LOG_VERSION {
            return Err(HistoryError::InvalidFormat(format!(
                "Unsupported log version: {}",
                header[0]
            )));
        }

        let mut u64_bytes = [0u8; 8];
        reader.read_exact(&mut u64_bytes)?;
        let id = u64::from_le_bytes(u64_bytes);

        reader.read_exact(&mut u64_bytes)?;
        let timestamp = Timestamp(i64::from_le_bytes(u64_bytes));

        let mut kind_len_bytes = [0u8; 2];
        reader.read_exact(&mut kind_len_bytes)?;
        let mut kind_bytes = vec![0u8; u16::from_le_bytes(kind_len_bytes) as usize];
        reader.read_exact(&mut kind_bytes)?;
        let kind = String::from_utf8(kind_bytes)
            .map_err(|e| HistoryError::Corruption(format!("entry {} kind: {}", id, e)))?;

        let mut payload_len_bytes = [0u8; 4];
        reader.read_exact(&mut payload_len_bytes)?;
        let mut payload = vec![0u8; u32::from_le_bytes(payload_len_bytes) as usize];
        reader.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&payload);
        if stored_checksum != computed_checksum {
            return Err(HistoryError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(LogEntry {
            id,
            timestamp,
            kind,
            payload,
        })
    }

    /// Walk the file, returning the highest entry id and the length of the
    /// valid prefix. An undecodable entry with no valid entry after it is a
    /// torn tail and ends the scan; one followed by a valid entry is
    /// corruption.
    fn scan(file: &mut File) -> Result<(u64, u64)> {
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        let mut max_id = 0u64;
        let mut valid_len = 0u64;

        while valid_len < file_len {
            match Self::decode(file) {
                Ok(entry) => {
                    max_id = max_id.max(entry.id);
                    valid_len = file.stream_position()?;
                }
                Err(HistoryError::Io(io)) if io.kind() != std::io::ErrorKind::UnexpectedEof => {
                    return Err(HistoryError::Io(io));
                }
                Err(e) => {
                    if Self::entry_follows(file, valid_len + 1)? {
                        return Err(e);
                    }
                    break;
                }
            }
        }

        Ok((max_id, valid_len))
    }

    /// Whether a decodable entry starts anywhere at or after `from`.
    fn entry_follows(file: &mut File, from: u64) -> Result<bool> {
        file.seek(SeekFrom::Start(from))?;
        let mut rest = Vec::new();
        file.read_to_end(&mut rest)?;

        Ok(rest
            .windows(LOG_MAGIC.len())
            .enumerate()
            .filter(|(_, window)| *window == LOG_MAGIC)
            .any(|(start, _)| Self::decode(&mut &rest[start..]).is_ok()))
    }
}

/// Iterator over entries in the log, yielding `(offset, entry)`.
pub struct LogIterator<'a> {
    log: &'a RecordLog,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for LogIterator<'a> {
    type Item = Result<(u64, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current = self.offset;
        match self.log.read_with_next(current) {
            Ok((entry, next)) => {
                self.offset = next;
                Some(Ok((current, entry)))
            }
            Err(e) => {
                self.offset = self.end; // Stop iteration on error
                Some(Err(e))
            }
        }
    }
}
