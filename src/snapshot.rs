//! Snapshot policy.
//!
//! Every version whose number is 1 or a multiple of the interval carries a
//! full state snapshot, so reconstruction never replays more than
//! `interval - 1` diffs after locating the nearest snapshot.

/// Default snapshot interval.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 10;

/// Whether `version_number` must carry a full snapshot.
///
/// An interval of 0 is treated as 1 (snapshot every version).
pub fn should_snapshot(version_number: u64, interval: u64) -> bool {
    version_number == 1 || version_number % interval.max(1) == 0
}

/// Snapshot rule bound to an interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotPolicy {
    interval: u64,
}

impl SnapshotPolicy {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn should_snapshot(&self, version_number: u64) -> bool {
        should_snapshot(version_number, self.interval)
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_INTERVAL)
    }
}
