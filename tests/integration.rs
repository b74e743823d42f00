//! Integration tests for the history store.

use annals::{
    Actor, AttrValue, Attributes, AuditAction, AuditChanges, RequestContext, Store, StoreConfig,
    Timestamp, VersionDiff, Versionable,
};
use serde_json::json;
use std::collections::BTreeSet;
use tempfile::TempDir;

fn test_store(dir: &TempDir) -> Store {
    Store::create(StoreConfig {
        path: dir.path().join("store"),
        ..Default::default()
    })
    .unwrap()
}

fn named(name: &str) -> Attributes {
    [("name".to_string(), AttrValue::from(name))].into()
}

/// A customer record as a business layer would hold it.
struct Customer {
    id: u64,
    name: String,
    email: String,
    notes: String,
    updated_at: Timestamp,
    version: u64,
}

impl Customer {
    fn new(id: u64, name: &str, email: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            email: email.to_string(),
            notes: String::new(),
            updated_at: Timestamp(0),
            version: 0,
        }
    }
}

impl Versionable for Customer {
    fn entity_type(&self) -> &str {
        "customer"
    }

    fn entity_id(&self) -> String {
        self.id.to_string()
    }

    fn to_snapshot(&self) -> Attributes {
        [
            ("name".to_string(), AttrValue::from(self.name.as_str())),
            ("email".to_string(), AttrValue::from(self.email.as_str())),
            ("notes".to_string(), AttrValue::from(self.notes.as_str())),
            ("updated_at".to_string(), AttrValue::from(self.updated_at)),
        ]
        .into()
    }

    fn versionable_fields(&self) -> Option<BTreeSet<String>> {
        Some(["name".to_string(), "email".to_string()].into())
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

// --- Version lifecycle scenarios ---

#[test]
fn test_version_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let versions = store.versions();
    let actor = Actor::new("u1", "editor");

    // Creation yields version 1 with the created marker and a snapshot.
    let v1 = versions
        .create_initial_version("doc", "E", &named("A"), &actor)
        .unwrap();
    assert_eq!(v1.version_number, 1);
    assert_eq!(serde_json::to_value(&v1.diff).unwrap(), json!({"created": true}));
    assert_eq!(v1.snapshot, Some([("name".to_string(), json!("A"))].into()));

    // A rename yields version 2 with a diff and no snapshot.
    let v2 = versions
        .create_version("doc", "E", &named("A"), &named("B"), &actor, None)
        .unwrap()
        .unwrap();
    assert_eq!(v2.version_number, 2);
    assert!(v2.snapshot.is_none());
    assert_eq!(
        serde_json::to_value(&v2.diff).unwrap(),
        json!({"name": {"old": "A", "new": "B"}})
    );
    assert_eq!(
        store.reconstruct_at_version("doc", "E", 2).unwrap(),
        Some([("name".to_string(), json!("B"))].into())
    );

    // Eight more updates bring the history to version 10.
    let mut current = "B".to_string();
    for i in 3..=10 {
        let next = format!("B{}", i);
        versions
            .create_version("doc", "E", &named(&current), &named(&next), &actor, None)
            .unwrap()
            .unwrap();
        current = next;
    }

    let v10 = versions.get_version("doc", "E", 10).unwrap().unwrap();
    assert_eq!(v10.snapshot, Some([("name".to_string(), json!("B10"))].into()));
    assert_eq!(
        store.reconstruct_at_version("doc", "E", 10).unwrap(),
        v10.snapshot
    );

    // Setting the name to its current value creates nothing.
    let noop = versions
        .create_version("doc", "E", &named(&current), &named(&current), &actor, None)
        .unwrap();
    assert!(noop.is_none());
    assert_eq!(versions.get_latest_version_number("doc", "E").unwrap(), 10);

    // Version 5 comes from the snapshot at 1 plus diffs 2..=5.
    assert_eq!(
        store.reconstruct_at_version("doc", "E", 5).unwrap(),
        Some([("name".to_string(), json!("B5"))].into())
    );
}

#[test]
fn test_history_is_descending_and_paginated() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let versions = store.versions();
    let actor = Actor::system();

    versions.create_initial_version("doc", "1", &named("v1"), &actor).unwrap();
    for v in 2..=25 {
        versions
            .create_version(
                "doc",
                "1",
                &named(&format!("v{}", v - 1)),
                &named(&format!("v{}", v)),
                &actor,
                None,
            )
            .unwrap();
    }

    let all: Vec<u64> = versions
        .get_version_history("doc", "1", 100, 0)
        .unwrap()
        .iter()
        .map(|r| r.version_number)
        .collect();
    assert_eq!(all, (1..=25).rev().collect::<Vec<_>>());

    let page: Vec<u64> = versions
        .get_version_history("doc", "1", 5, 10)
        .unwrap()
        .iter()
        .map(|r| r.version_number)
        .collect();
    assert_eq!(page, vec![15, 14, 13, 12, 11]);

    assert_eq!(versions.get_version_count("doc", "1").unwrap(), 25);
    assert!(versions.get_version("doc", "1", 26).unwrap().is_none());
}

#[test]
fn test_entities_have_independent_histories() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let versions = store.versions();
    let actor = Actor::system();

    versions.create_initial_version("doc", "1", &named("a"), &actor).unwrap();
    versions.create_initial_version("doc", "2", &named("x"), &actor).unwrap();
    versions.create_initial_version("note", "1", &named("n"), &actor).unwrap();
    versions
        .create_version("doc", "1", &named("a"), &named("b"), &actor, None)
        .unwrap();

    assert_eq!(versions.get_latest_version_number("doc", "1").unwrap(), 2);
    assert_eq!(versions.get_latest_version_number("doc", "2").unwrap(), 1);
    assert_eq!(versions.get_latest_version_number("note", "1").unwrap(), 1);
    assert_eq!(versions.get_latest_version_number("note", "9").unwrap(), 0);
    assert_eq!(store.stats().entity_count, 3);
}

// --- Versionable entities ---

#[test]
fn test_versionable_entity_workflow() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let actor = Actor::new("u7", "support");
    let context = RequestContext {
        ip_address: Some("192.0.2.1".into()),
        client_agent: Some("backoffice/2.1".into()),
    };

    let mut customer = Customer::new(42, "Ann", "ann@example.com");
    let (v1, created) = store.record_create(&mut customer, &actor, Some(&context)).unwrap();
    assert_eq!(customer.version, 1);
    assert_eq!(v1.snapshot.as_ref().map(|s| s.len()), Some(2));
    assert_eq!(created.changes, AuditChanges::Created);
    assert_eq!(created.entity_name.as_deref(), Some("Ann"));

    // Notes are not versioned but are audited.
    let before = customer.to_snapshot();
    customer.notes = "prefers email".into();
    customer.updated_at = Timestamp(10);
    let (version, entry) = store
        .record_update(&mut customer, &before, &actor, None, Some(&context))
        .unwrap();
    assert!(version.is_none());
    let entry = entry.unwrap();
    assert_eq!(entry.action, AuditAction::Update);
    assert_eq!(
        serde_json::to_value(&entry.changes).unwrap(),
        json!({"notes": {"old": "", "new": "prefers email"}})
    );
    assert_eq!(customer.version, 1);

    // Email is versioned.
    let before = customer.to_snapshot();
    customer.email = "ann@corp.example".into();
    customer.updated_at = Timestamp(20);
    let (version, entry) = store
        .record_update(&mut customer, &before, &actor, Some("email change"), None)
        .unwrap();
    let version = version.unwrap();
    assert_eq!(version.version_number, 2);
    assert_eq!(version.change_reason.as_deref(), Some("email change"));
    assert!(entry.is_some());
    assert_eq!(customer.version, 2);

    assert_eq!(
        store.reconstruct_at_version("customer", "42", 2).unwrap(),
        Some(
            [
                ("email".to_string(), json!("ann@corp.example")),
                ("name".to_string(), json!("Ann")),
            ]
            .into()
        )
    );

    // Saving with nothing changed leaves both logs untouched.
    let before = customer.to_snapshot();
    let (version, entry) = store
        .record_update(&mut customer, &before, &actor, None, None)
        .unwrap();
    assert!(version.is_none());
    assert!(entry.is_none());

    let deleted = store.record_delete(&customer, &actor, None).unwrap();
    assert_eq!(deleted.changes, AuditChanges::Deleted);

    let trail: Vec<AuditAction> = store
        .audit()
        .history_for("customer", "42")
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        trail,
        vec![
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Update,
            AuditAction::Delete
        ]
    );
    assert_eq!(store.versions().get_version_count("customer", "42").unwrap(), 2);
}

#[test]
fn test_heterogeneous_values_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let versions = store.versions();
    let actor = Actor::system();
    let owner = uuid::Uuid::new_v4();

    let v1: Attributes = [
        ("status".to_string(), AttrValue::enumeration("Draft", "draft")),
        ("owner".to_string(), AttrValue::Id(owner)),
        ("due".to_string(), AttrValue::Timestamp(Timestamp(0))),
        ("tags".to_string(), AttrValue::from(vec!["a", "b"])),
    ]
    .into();
    let mut v2 = v1.clone();
    v2.insert("status".into(), AttrValue::enumeration("Published", "published"));
    v2.insert("tags".into(), AttrValue::from(vec!["a"]));

    versions.create_initial_version("post", "1", &v1, &actor).unwrap();
    let record = versions
        .create_version("post", "1", &v1, &v2, &actor, None)
        .unwrap()
        .unwrap();

    let diff = match &record.diff {
        VersionDiff::Changes(changes) => changes.clone(),
        VersionDiff::Created => panic!("expected changes"),
    };
    assert_eq!(diff.changed_fields().collect::<Vec<_>>(), vec!["status", "tags"]);

    let state = store.reconstruct_at_version("post", "1", 2).unwrap().unwrap();
    assert_eq!(state["status"], json!("published"));
    assert_eq!(state["owner"], json!(owner.hyphenated().to_string()));
    assert_eq!(state["due"], json!("1970-01-01T00:00:00.000000Z"));
    assert_eq!(state["tags"], json!(["a"]));
}

#[test]
fn test_restore_and_compare() {
    let dir = TempDir::new().unwrap();
    let store = test_store(&dir);
    let versions = store.versions();
    let actor = Actor::system();

    versions.create_initial_version("doc", "1", &named("first"), &actor).unwrap();
    versions
        .create_version("doc", "1", &named("first"), &named("second"), &actor, None)
        .unwrap();

    let diff = versions.compare_versions("doc", "1", 1, 2).unwrap().unwrap();
    assert_eq!(
        serde_json::to_value(&diff).unwrap(),
        json!({"name": {"old": "first", "new": "second"}})
    );
    assert!(versions.compare_versions("doc", "1", 0, 2).unwrap().is_none());

    let restored = versions.restore_version("doc", "1", 1, &actor).unwrap().unwrap();
    assert_eq!(restored.version_number, 3);
    assert_eq!(
        store.reconstruct_at_version("doc", "1", 3).unwrap(),
        store.reconstruct_at_version("doc", "1", 1).unwrap()
    );
}

#[test]
fn test_reopen_preserves_history_and_trail() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: dir.path().join("store"),
        snapshot_interval: 4,
        ..Default::default()
    };

    {
        let store = Store::create(config.clone()).unwrap();
        let actor = Actor::system();
        store
            .versions()
            .create_initial_version("doc", "1", &named("v1"), &actor)
            .unwrap();
        for v in 2..=9 {
            store
                .versions()
                .create_version(
                    "doc",
                    "1",
                    &named(&format!("v{}", v - 1)),
                    &named(&format!("v{}", v)),
                    &actor,
                    None,
                )
                .unwrap();
        }
        store.audit().log_login(&actor, None).unwrap();
    }

    let store = Store::open(config).unwrap();
    for v in 1..=9 {
        assert_eq!(
            store.reconstruct_at_version("doc", "1", v).unwrap(),
            Some([("name".to_string(), json!(format!("v{}", v)))].into())
        );
    }

    let snapshotted: Vec<u64> = store
        .versions()
        .get_version_history("doc", "1", 100, 0)
        .unwrap()
        .into_iter()
        .filter(|r| r.has_snapshot())
        .map(|r| r.version_number)
        .collect();
    assert_eq!(snapshotted, vec![8, 4, 1]);
    assert_eq!(store.stats().audit_entry_count, 1);
}
