//! Historical state reconstruction.
//!
//! The state at version `n` is the nearest snapshot at or before `n` with
//! every later diff up to `n` replayed on top, oldest first.

use crate::error::{HistoryError, Result};
use crate::types::{EntityKey, StateMap};
use crate::versions::{VersionBackend, VersionDiff, VersionRecord};

/// Materializes past entity states from a [`VersionBackend`].
pub struct Reconstructor<B> {
    backend: B,
}

impl<B: VersionBackend> Reconstructor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// State of the entity as of `target_version`.
    ///
    /// Returns `Ok(None)` when the entity has no version at or before
    /// `target_version`. A returned mapping may be empty when history exists
    /// but tracks no fields.
    pub fn reconstruct_at_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        target_version: u64,
    ) -> Result<Option<StateMap>> {
        let key = EntityKey::new(entity_type, entity_id);

        let base = self.backend.latest_snapshot_at_or_before(&key, target_version)?;
        let (mut state, replay_from) = match base {
            Some(VersionRecord {
                version_number,
                snapshot: Some(snapshot),
                ..
            }) => {
                if version_number == target_version {
                    return Ok(Some(snapshot));
                }
                (snapshot, version_number + 1)
            }
            Some(record) => {
                return Err(HistoryError::Corruption(format!(
                    "version {} of {} was returned as a snapshot but carries none",
                    record.version_number, key
                )))
            }
            None => (StateMap::new(), 1),
        };

        let records = self.backend.range(&key, replay_from, target_version)?;
        if records.is_empty() && replay_from == 1 {
            return Ok(None);
        }

        tracing::debug!(
            entity = %key,
            target = target_version,
            replayed = records.len(),
            "reconstructing from snapshot"
        );

        for record in &records {
            apply_diff(&mut state, &record.diff);
        }

        Ok(Some(state))
    }

    /// State after the most recent version, if any.
    pub fn reconstruct_latest(&self, entity_type: &str, entity_id: &str) -> Result<Option<StateMap>> {
        let key = EntityKey::new(entity_type, entity_id);
        match self.backend.last_version_number(&key)? {
            0 => Ok(None),
            latest => self.reconstruct_at_version(entity_type, entity_id, latest),
        }
    }
}

/// Apply one version's diff to a working state.
///
/// The creation marker carries no fields; removals drop the field.
pub fn apply_diff(state: &mut StateMap, diff: &VersionDiff) {
    let Some(changes) = diff.changes() else {
        return;
    };
    for (field, change) in changes {
        match &change.new {
            Some(value) => {
                state.insert(field.clone(), value.clone());
            }
            None => {
                state.remove(field);
            }
        }
    }
}
