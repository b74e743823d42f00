//! Core types shared by the diff engine, audit recorder and version store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    /// Canonical textual form: RFC 3339, UTC, microsecond precision.
    ///
    /// Out-of-range values fall back to the raw microsecond count.
    pub fn to_rfc3339(&self) -> String {
        match DateTime::<Utc>::from_timestamp_micros(self.0) {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
            None => self.0.to_string(),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_micros())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Identity of a versioned entity: its kind plus an opaque instance id.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({}/{})", self.entity_type, self.entity_id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A single attribute value of a domain entity.
///
/// Entities hand the engine their state as a mapping of these; the engine
/// never interprets them beyond normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
    Id(Uuid),
    /// Enumeration member; compared and stored by its underlying scalar.
    Enum {
        variant: String,
        value: Box<AttrValue>,
    },
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Build an enumeration member.
    pub fn enumeration(variant: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        AttrValue::Enum {
            variant: variant.into(),
            value: Box::new(value.into()),
        }
    }

    /// Lift plain JSON into an attribute value.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Int(i),
                None => AttrValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttrValue::Text(s),
            serde_json::Value::Array(items) => {
                AttrValue::List(items.into_iter().map(AttrValue::from_json).collect())
            }
            serde_json::Value::Object(obj) => AttrValue::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Text view, if this value is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<i32> for AttrValue {
    fn from(i: i32) -> Self {
        AttrValue::Int(i as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<Uuid> for AttrValue {
    fn from(id: Uuid) -> Self {
        AttrValue::Id(id)
    }
}

impl From<Timestamp> for AttrValue {
    fn from(ts: Timestamp) -> Self {
        AttrValue::Timestamp(ts)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttrValue::Timestamp(dt.into())
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(items: Vec<T>) -> Self {
        AttrValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Live attribute mapping of an entity (field name -> value).
pub type Attributes = BTreeMap<String, AttrValue>;

/// Normalized, storable attribute mapping. Snapshots and reconstructed
/// states use this form.
pub type StateMap = BTreeMap<String, serde_json::Value>;

/// Who performed a mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<String>,
    pub label: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            label: Some(label.into()),
        }
    }

    /// Actor for changes made by the system itself.
    pub fn system() -> Self {
        Self {
            id: None,
            label: Some("system".to_string()),
        }
    }
}

/// Request metadata attached to audit entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub client_agent: Option<String>,
}
