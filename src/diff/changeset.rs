//! Change set types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Old and new normalized value of one field.
///
/// A side is `None` when the field was absent from that state, which is
/// distinct from the field being present with a JSON `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub old: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub new: Option<Value>,
}

impl FieldChange {
    pub fn new(old: Option<Value>, new: Option<Value>) -> Self {
        Self { old, new }
    }

    /// Whether the field was removed by this change.
    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }
}

/// A key that is present deserializes to `Some`, even when it holds `null`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Field-level difference between two states.
///
/// Only fields whose normalized values differ are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, FieldChange>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, field: String, change: FieldChange) {
        self.0.insert(field, change);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Names of the changed fields, in order.
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a String, &'a FieldChange);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FieldChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let mut changes = ChangeSet::new();
        changes.insert(
            "name".into(),
            FieldChange::new(Some(json!("A")), Some(json!("B"))),
        );
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({"name": {"old": "A", "new": "B"}})
        );
    }

    #[test]
    fn test_null_is_not_absence() {
        let parsed: FieldChange = serde_json::from_value(json!({"old": null})).unwrap();
        assert_eq!(parsed.old, Some(Value::Null));
        assert_eq!(parsed.new, None);
        assert!(parsed.is_removal());
    }
}
