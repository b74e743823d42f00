//! Field-level differencing between two states of an entity.
//!
//! Values are normalized before comparison so that timestamps, identifiers
//! and enumeration members compare by their canonical scalar form, and the
//! resulting change sets hold plain storable JSON rather than live values.

mod changeset;
mod engine;
mod normalize;

pub use changeset::{ChangeSet, FieldChange};
pub use engine::{compute_diff, compute_diff_with, DiffOptions, DEFAULT_EXCLUDED_FIELDS};
pub use normalize::{normalize, normalize_state};
