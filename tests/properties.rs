//! Property tests for diffing and reconstruction.

use annals::{
    compute_diff, normalize_state, Actor, AttrValue, Attributes, MemoryBackend, StateMap,
    Timestamp, VersionStore, VersionStoreConfig, DEFAULT_EXCLUDED_FIELDS,
};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = AttrValue> {
    prop_oneof![
        Just(AttrValue::Null),
        any::<bool>().prop_map(AttrValue::Bool),
        (-1000i64..1000).prop_map(AttrValue::Int),
        "[a-z]{0,6}".prop_map(AttrValue::Text),
        (0i64..4_000_000_000_000_000).prop_map(|us| AttrValue::Timestamp(Timestamp(us))),
        (0u8..3).prop_map(|n| AttrValue::enumeration(format!("V{}", n), n as i64)),
    ]
}

fn value() -> impl Strategy<Value = AttrValue> {
    prop_oneof![
        4 => scalar(),
        1 => vec(scalar(), 0..3).prop_map(AttrValue::List),
    ]
}

fn field() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-e]".prop_map(|s| s.to_string()),
        Just("updated_at".to_string()),
        Just("created_at".to_string()),
        Just("password_hash".to_string()),
    ]
}

fn state() -> impl Strategy<Value = Attributes> {
    btree_map(field(), value(), 0..6)
}

/// Normalized state as history stores it.
fn tracked(state: &Attributes) -> StateMap {
    let mut tracked = normalize_state(state);
    tracked.retain(|f, _| !DEFAULT_EXCLUDED_FIELDS.contains(&f.as_str()));
    tracked
}

proptest! {
    #[test]
    fn diff_is_reflexive(s in state()) {
        prop_assert!(compute_diff(&s, &s).is_empty());
    }

    #[test]
    fn excluded_fields_never_reported(old in state(), new in state()) {
        let diff = compute_diff(&old, &new);
        for field in DEFAULT_EXCLUDED_FIELDS {
            prop_assert!(!diff.contains(field));
        }
    }

    #[test]
    fn every_version_reconstructs_exactly(
        states in vec(state(), 1..30),
        interval in 1u64..8,
    ) {
        let backend = MemoryBackend::new();
        let store = VersionStore::with_config(
            &backend,
            VersionStoreConfig { snapshot_interval: interval, ..Default::default() },
        );
        let actor = Actor::system();

        let mut expected = vec![tracked(&states[0])];
        store.create_initial_version("doc", "1", &states[0], &actor).unwrap();

        for pair in states.windows(2) {
            if let Some(record) = store
                .create_version("doc", "1", &pair[0], &pair[1], &actor, None)
                .unwrap()
            {
                prop_assert_eq!(record.version_number, expected.len() as u64 + 1);
                expected.push(tracked(&pair[1]));
            } else {
                prop_assert_eq!(expected.last(), Some(&tracked(&pair[1])));
            }
        }

        for (i, state) in expected.iter().enumerate() {
            let version = i as u64 + 1;
            let rebuilt = store.reconstruct_at_version("doc", "1", version).unwrap();
            prop_assert_eq!(rebuilt.as_ref(), Some(state));

            let record = store.get_version("doc", "1", version).unwrap().unwrap();
            if version == 1 || version % interval == 0 {
                prop_assert_eq!(record.snapshot.as_ref(), Some(state));
            } else {
                prop_assert!(record.snapshot.is_none());
            }
        }

        let history: Vec<u64> = store
            .get_version_history("doc", "1", usize::MAX, 0)
            .unwrap()
            .iter()
            .map(|r| r.version_number)
            .collect();
        let gap_free: Vec<u64> = (1..=expected.len() as u64).rev().collect();
        prop_assert_eq!(history, gap_free);
    }
}
