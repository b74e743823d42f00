//! Audit entry types.

use crate::diff::ChangeSet;
use crate::types::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;

/// Logged action.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    /// Domain-specific action, e.g. "APPROVE".
    Custom(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::Custom(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CREATE" => AuditAction::Create,
            "UPDATE" => AuditAction::Update,
            "DELETE" => AuditAction::Delete,
            "LOGIN" => AuditAction::Login,
            "LOGOUT" => AuditAction::Logout,
            other => AuditAction::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuditAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(AuditAction::parse(&s))
    }
}

/// What an audit entry records about the entity's fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AuditChanges {
    #[default]
    None,
    /// Stored as `{"created": true}`.
    Created,
    /// Stored as `{"deleted": true}`.
    Deleted,
    Diff(ChangeSet),
}

impl Serialize for AuditChanges {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AuditChanges::None => serializer.serialize_none(),
            AuditChanges::Created => json!({"created": true}).serialize(serializer),
            AuditChanges::Deleted => json!({"deleted": true}).serialize(serializer),
            AuditChanges::Diff(changes) => changes.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AuditChanges {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            Ok(AuditChanges::None)
        } else if value == json!({"created": true}) {
            Ok(AuditChanges::Created)
        } else if value == json!({"deleted": true}) {
            Ok(AuditChanges::Deleted)
        } else {
            serde_json::from_value(value)
                .map(AuditChanges::Diff)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// One immutable audit trail entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assigned by the sink; 0 until persisted.
    pub id: u64,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub entity_name: Option<String>,
    #[serde(default)]
    pub changes: AuditChanges,
    pub actor_id: Option<String>,
    pub actor_label: Option<String>,
    pub ip_address: Option<String>,
    pub client_agent: Option<String>,
    pub created_at: Timestamp,
}
