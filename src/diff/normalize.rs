//! Canonical scalar form of attribute values.

use crate::types::{AttrValue, Attributes, StateMap};
use serde_json::Value;

/// Normalize a value into its canonical, storable form.
///
/// Timestamps become RFC 3339 text, identifiers become hyphenated lowercase
/// text, enumeration members become their underlying scalar. Collections are
/// normalized element-wise.
pub fn normalize(value: &AttrValue) -> Value {
    match value {
        AttrValue::Null => Value::Null,
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Int(i) => Value::from(*i),
        AttrValue::Float(f) => Value::from(*f),
        AttrValue::Text(s) => Value::String(s.clone()),
        AttrValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        AttrValue::Id(id) => Value::String(id.hyphenated().to_string()),
        AttrValue::Enum { value, .. } => normalize(value),
        AttrValue::List(items) => Value::Array(items.iter().map(normalize).collect()),
        AttrValue::Map(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
    }
}

/// Normalize every field of an attribute mapping.
pub fn normalize_state(state: &Attributes) -> StateMap {
    state
        .iter()
        .map(|(field, value)| (field.clone(), normalize(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_timestamp_normalizes_to_text() {
        let value = AttrValue::Timestamp(Timestamp(0));
        assert_eq!(normalize(&value), json!("1970-01-01T00:00:00.000000Z"));
    }

    #[test]
    fn test_id_normalizes_to_hyphenated() {
        let id = Uuid::parse_str("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        assert_eq!(
            normalize(&AttrValue::Id(id)),
            json!("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
    }

    #[test]
    fn test_enum_normalizes_to_scalar() {
        let status = AttrValue::enumeration("Active", "active");
        assert_eq!(normalize(&status), json!("active"));

        let priority = AttrValue::enumeration("High", 3);
        assert_eq!(normalize(&priority), json!(3));
    }

    #[test]
    fn test_nested_collections() {
        let value = AttrValue::List(vec![
            AttrValue::enumeration("A", 1),
            AttrValue::Timestamp(Timestamp(0)),
        ]);
        assert_eq!(normalize(&value), json!([1, "1970-01-01T00:00:00.000000Z"]));
    }
}
