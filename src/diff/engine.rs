//! Diff computation.

use super::changeset::{ChangeSet, FieldChange};
use super::normalize::normalize;
use crate::types::Attributes;
use std::collections::BTreeSet;

/// Fields ignored by default: volatile timestamps and credential material.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &["updated_at", "created_at", "password_hash"];

/// Diff configuration.
#[derive(Clone, Debug)]
pub struct DiffOptions {
    /// Fields never reported, whether or not they changed.
    pub excluded_fields: BTreeSet<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            excluded_fields: DEFAULT_EXCLUDED_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl DiffOptions {
    /// Options with a custom exclusion list.
    pub fn excluding<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.excluded_fields.contains(field)
    }
}

/// Compute the change set between two states using the default exclusions.
pub fn compute_diff(old: &Attributes, new: &Attributes) -> ChangeSet {
    compute_diff_with(old, new, &DiffOptions::default())
}

/// Compute the change set between two states.
///
/// Every field present in either state, minus excluded ones, is compared by
/// normalized value. `compute_diff_with(x, x, _)` is always empty.
pub fn compute_diff_with(old: &Attributes, new: &Attributes, options: &DiffOptions) -> ChangeSet {
    let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

    let mut changes = ChangeSet::new();
    for field in fields {
        if options.is_excluded(field) {
            continue;
        }

        let old_value = old.get(field).map(normalize);
        let new_value = new.get(field).map(normalize);

        if old_value != new_value {
            changes.insert(field.clone(), FieldChange::new(old_value, new_value));
        }
    }

    changes
}
