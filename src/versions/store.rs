//! Version store: numbering, diffing and snapshotting of entity versions.

use super::backend::VersionBackend;
use super::record::{VersionDiff, VersionRecord};
use super::versionable::{narrow, Versionable};
use crate::diff::{compute_diff_with, normalize_state, ChangeSet, DiffOptions};
use crate::error::{HistoryError, Result};
use crate::reconstruct::Reconstructor;
use crate::snapshot::{SnapshotPolicy, DEFAULT_SNAPSHOT_INTERVAL};
use crate::types::{Actor, AttrValue, Attributes, EntityKey, StateMap, Timestamp};
use std::collections::BTreeSet;

/// Version store configuration.
#[derive(Clone, Debug)]
pub struct VersionStoreConfig {
    /// Versions at multiples of this interval carry a full snapshot.
    pub snapshot_interval: u64,

    /// Fields never tracked.
    pub diff_options: DiffOptions,
}

impl Default for VersionStoreConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            diff_options: DiffOptions::default(),
        }
    }
}

/// Creates and queries entity versions over a [`VersionBackend`].
///
/// The store holds no state of its own beyond configuration; version
/// numbering is derived from the backend on every write. Callers must
/// serialize writers to one entity or retry on
/// [`HistoryError::VersionConflict`].
pub struct VersionStore<B> {
    backend: B,
    policy: SnapshotPolicy,
    diff_options: DiffOptions,
}

impl<B: VersionBackend> VersionStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, VersionStoreConfig::default())
    }

    pub fn with_config(backend: B, config: VersionStoreConfig) -> Self {
        Self {
            backend,
            policy: SnapshotPolicy::new(config.snapshot_interval),
            diff_options: config.diff_options,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> SnapshotPolicy {
        self.policy
    }

    /// Reconstructor reading from this store's backend.
    pub fn reconstructor(&self) -> Reconstructor<&B> {
        Reconstructor::new(&self.backend)
    }

    // --- Writes ---

    /// Record a change to an entity whose every field is versionable.
    ///
    /// Returns `None` when no tracked field changed; no version number is
    /// consumed in that case.
    pub fn create_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        old_state: &Attributes,
        new_state: &Attributes,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Option<VersionRecord>> {
        let key = EntityKey::new(entity_type, entity_id);
        self.create_version_narrowed(&key, old_state, new_state, None, actor, reason)
    }

    /// Record a change, tracking only `fields` when given.
    pub fn create_version_narrowed(
        &self,
        key: &EntityKey,
        old_state: &Attributes,
        new_state: &Attributes,
        fields: Option<&BTreeSet<String>>,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Option<VersionRecord>> {
        let old_state = narrow(old_state, fields);
        let new_state = narrow(new_state, fields);

        let diff = compute_diff_with(&old_state, &new_state, &self.diff_options);
        if diff.is_empty() {
            tracing::debug!(entity = %key, "no versionable changes, skipping version");
            return Ok(None);
        }

        let next_version = self.backend.last_version_number(key)? + 1;
        let snapshot = self
            .policy
            .should_snapshot(next_version)
            .then(|| self.tracked_state(&new_state));

        let record = self.insert(
            key,
            next_version,
            VersionDiff::Changes(diff),
            snapshot,
            actor,
            reason,
        )?;
        Ok(Some(record))
    }

    /// Record a change to a [`Versionable`] entity, given its state before
    /// the mutation. The entity's version mirror is updated on success.
    pub fn record_change<E: Versionable>(
        &self,
        entity: &mut E,
        old_state: &Attributes,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Option<VersionRecord>> {
        let key = EntityKey::new(entity.entity_type(), entity.entity_id());
        let fields = entity.versionable_fields();
        let new_state = entity.to_snapshot();

        let record =
            self.create_version_narrowed(&key, old_state, &new_state, fields.as_ref(), actor, reason)?;
        if let Some(record) = &record {
            entity.set_version(record.version_number);
        }
        Ok(record)
    }

    /// Create version 1 with the `{"created": true}` marker and a full snapshot.
    pub fn create_initial_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        full_state: &Attributes,
        actor: &Actor,
    ) -> Result<VersionRecord> {
        let key = EntityKey::new(entity_type, entity_id);
        self.create_initial_narrowed(&key, full_state, None, actor)
    }

    /// Create version 1 for a [`Versionable`] entity.
    pub fn record_initial<E: Versionable>(&self, entity: &mut E, actor: &Actor) -> Result<VersionRecord> {
        let key = EntityKey::new(entity.entity_type(), entity.entity_id());
        let fields = entity.versionable_fields();
        let record = self.create_initial_narrowed(&key, &entity.to_snapshot(), fields.as_ref(), actor)?;
        entity.set_version(record.version_number);
        Ok(record)
    }

    fn create_initial_narrowed(
        &self,
        key: &EntityKey,
        full_state: &Attributes,
        fields: Option<&BTreeSet<String>>,
        actor: &Actor,
    ) -> Result<VersionRecord> {
        let snapshot = self.tracked_state(&narrow(full_state, fields));
        self.insert(key, 1, VersionDiff::Created, Some(snapshot), actor, None)
    }

    /// Append a version whose state equals version `version`.
    ///
    /// Returns `None` when the latest state already matches. Fails with
    /// [`HistoryError::InvalidOperation`] when `version` does not exist.
    pub fn restore_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        version: u64,
        actor: &Actor,
    ) -> Result<Option<VersionRecord>> {
        let key = EntityKey::new(entity_type, entity_id);
        let latest = self.backend.last_version_number(&key)?;
        if version == 0 || version > latest {
            return Err(HistoryError::InvalidOperation(format!(
                "cannot restore {} to version {} (latest is {})",
                key, version, latest
            )));
        }

        let reconstructor = self.reconstructor();
        let target = reconstructor
            .reconstruct_at_version(&key.entity_type, &key.entity_id, version)?
            .unwrap_or_default();
        let current = reconstructor
            .reconstruct_at_version(&key.entity_type, &key.entity_id, latest)?
            .unwrap_or_default();

        let reason = format!("Restored from version {}", version);
        let record = self.create_version_narrowed(
            &key,
            &to_attributes(current),
            &to_attributes(target),
            None,
            actor,
            Some(&reason),
        )?;

        if let Some(record) = &record {
            tracing::info!(entity = %key, from = version, version = record.version_number, "restored version");
        }
        Ok(record)
    }

    fn insert(
        &self,
        key: &EntityKey,
        version_number: u64,
        diff: VersionDiff,
        snapshot: Option<StateMap>,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<VersionRecord> {
        let record = VersionRecord {
            entity_type: key.entity_type.clone(),
            entity_id: key.entity_id.clone(),
            version_number,
            diff,
            snapshot,
            actor_id: actor.id.clone(),
            actor_label: actor.label.clone(),
            change_reason: reason.map(str::to_string),
            created_at: Timestamp::now(),
        };

        match self.backend.insert(record) {
            Ok(record) => {
                tracing::info!(
                    entity = %key,
                    version = record.version_number,
                    snapshot = record.has_snapshot(),
                    "created version"
                );
                Ok(record)
            }
            Err(e) => {
                if e.is_conflict() {
                    tracing::warn!(entity = %key, version = version_number, "version number already taken");
                }
                Err(e)
            }
        }
    }

    /// Normalized state minus excluded fields, as stored in snapshots.
    fn tracked_state(&self, state: &Attributes) -> StateMap {
        let mut tracked = normalize_state(state);
        tracked.retain(|field, _| !self.diff_options.is_excluded(field));
        tracked
    }

    // --- Reads ---

    /// Versions newest first.
    pub fn get_version_history(
        &self,
        entity_type: &str,
        entity_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<VersionRecord>> {
        self.backend
            .history(&EntityKey::new(entity_type, entity_id), limit, offset)
    }

    pub fn get_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        version_number: u64,
    ) -> Result<Option<VersionRecord>> {
        self.backend
            .get(&EntityKey::new(entity_type, entity_id), version_number)
    }

    /// Latest version number, 0 if the entity has no history.
    pub fn get_latest_version_number(&self, entity_type: &str, entity_id: &str) -> Result<u64> {
        self.backend
            .last_version_number(&EntityKey::new(entity_type, entity_id))
    }

    pub fn get_version_count(&self, entity_type: &str, entity_id: &str) -> Result<u64> {
        self.backend.count(&EntityKey::new(entity_type, entity_id))
    }

    /// State of the entity at `version`; see [`Reconstructor`].
    pub fn reconstruct_at_version(
        &self,
        entity_type: &str,
        entity_id: &str,
        version: u64,
    ) -> Result<Option<StateMap>> {
        self.reconstructor()
            .reconstruct_at_version(entity_type, entity_id, version)
    }

    /// Field changes going from version `from` to version `to`.
    ///
    /// `None` if either version has no reconstructible state.
    pub fn compare_versions(
        &self,
        entity_type: &str,
        entity_id: &str,
        from: u64,
        to: u64,
    ) -> Result<Option<ChangeSet>> {
        let reconstructor = self.reconstructor();
        let old = reconstructor.reconstruct_at_version(entity_type, entity_id, from)?;
        let new = reconstructor.reconstruct_at_version(entity_type, entity_id, to)?;

        Ok(match (old, new) {
            (Some(old), Some(new)) => Some(compute_diff_with(
                &to_attributes(old),
                &to_attributes(new),
                &self.diff_options,
            )),
            _ => None,
        })
    }
}

/// Lift a stored state back into attributes. Normalization of the result
/// reproduces the stored values exactly.
fn to_attributes(state: StateMap) -> Attributes {
    state
        .into_iter()
        .map(|(field, value)| (field, AttrValue::from_json(value)))
        .collect()
}
