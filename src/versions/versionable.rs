//! Capability interface for entities that take part in versioning.

use crate::types::Attributes;
use std::collections::BTreeSet;

/// An entity whose state can be versioned.
///
/// Only `entity_type`, `entity_id` and `to_snapshot` are required. By
/// default every field is versionable and the version mirror is ignored.
pub trait Versionable {
    /// Kind of entity, e.g. "customer".
    fn entity_type(&self) -> &str;

    /// Opaque instance identifier.
    fn entity_id(&self) -> String;

    /// Current full attribute mapping.
    fn to_snapshot(&self) -> Attributes;

    /// Subset of fields tracked in version history; `None` tracks all.
    fn versionable_fields(&self) -> Option<BTreeSet<String>> {
        None
    }

    /// Mirror of the latest version number. Not authoritative.
    fn set_version(&mut self, _version: u64) {}
}

/// Restrict a state to `fields`, or return it whole when `fields` is `None`.
pub fn narrow(state: &Attributes, fields: Option<&BTreeSet<String>>) -> Attributes {
    match fields {
        None => state.clone(),
        Some(fields) => state
            .iter()
            .filter(|(field, _)| fields.contains(*field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect(),
    }
}
