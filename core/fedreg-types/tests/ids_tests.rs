use fedreg_types::{ChangeKind, EntryId, RegistryId, REGISTRY_ID_PREFIX};
use proptest::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;

// ── EntryId ──────────────────────────────────────────────────────

#[test]
fn entry_id_new_is_unique() {
    let a = EntryId::new();
    let b = EntryId::new();
    assert_ne!(a, b);
}

#[test]
fn entry_id_display_and_parse() {
    let id = EntryId::new();
    let parsed = EntryId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn entry_id_parse_invalid() {
    assert!(EntryId::parse("not-a-uuid").is_err());
}

#[test]
fn entry_id_serializes_transparently() {
    let id = EntryId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

// ── RegistryId ───────────────────────────────────────────────────

#[test]
fn generated_registry_id_has_urn_prefix_and_no_hyphens() {
    let id = RegistryId::generate();
    let s = id.as_str();
    assert!(s.starts_with(REGISTRY_ID_PREFIX));
    let tail = &s[REGISTRY_ID_PREFIX.len()..];
    assert_eq!(tail.len(), 32);
    assert!(!tail.contains('-'));
}

#[test]
fn generated_registry_ids_are_unique() {
    let ids: HashSet<_> = (0..100).map(|_| RegistryId::generate()).collect();
    assert_eq!(ids.len(), 100);
}

#[test]
fn blank_registry_id_is_rejected() {
    assert!(RegistryId::new("").is_err());
    assert!(RegistryId::from_str("   ").is_err());
}

#[test]
fn foreign_registry_id_is_accepted_verbatim() {
    let id = RegistryId::new("peer-node-17").unwrap();
    assert_eq!(id.to_string(), "peer-node-17");
}

#[test]
fn change_kind_display() {
    assert_eq!(ChangeKind::Created.to_string(), "created");
    assert_eq!(ChangeKind::Updated.to_string(), "updated");
    assert_eq!(ChangeKind::Deleted.to_string(), "deleted");
}

proptest! {
    #[test]
    fn registry_id_roundtrips_through_json(s in "[a-zA-Z0-9:._-]{1,40}") {
        let id = RegistryId::new(s.clone()).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        let back: RegistryId = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.as_str(), s.as_str());
    }
}
