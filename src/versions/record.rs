//! Version record types.

use crate::diff::ChangeSet;
use crate::types::{EntityKey, StateMap, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// The change carried by a version.
#[derive(Clone, Debug, PartialEq)]
pub enum VersionDiff {
    /// Version 1 of an entity; stored as `{"created": true}`.
    Created,
    /// Field changes from the previous version.
    Changes(ChangeSet),
}

impl VersionDiff {
    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            VersionDiff::Created => None,
            VersionDiff::Changes(changes) => Some(changes),
        }
    }
}

impl Serialize for VersionDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            VersionDiff::Created => json!({"created": true}).serialize(serializer),
            VersionDiff::Changes(changes) => changes.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for VersionDiff {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value == json!({"created": true}) {
            return Ok(VersionDiff::Created);
        }
        serde_json::from_value(value)
            .map(VersionDiff::Changes)
            .map_err(serde::de::Error::custom)
    }
}

/// One immutable revision of one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub entity_type: String,
    pub entity_id: String,

    /// Starts at 1, strictly increasing per entity.
    pub version_number: u64,

    pub diff: VersionDiff,

    /// Full normalized state, present when the snapshot policy selected
    /// this version.
    pub snapshot: Option<StateMap>,

    pub actor_id: Option<String>,
    pub actor_label: Option<String>,
    pub change_reason: Option<String>,
    pub created_at: Timestamp,
}

impl VersionRecord {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type.clone(), self.entity_id.clone())
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_initial(&self) -> bool {
        self.diff == VersionDiff::Created
    }
}
