use chrono::{Duration, Utc};
use fedreg_model::{RegistryEntry, REGISTRY_TAG};
use fedreg_store::{wildcard_match, Field, Filter, Query, Sort, SortOrder};
use fedreg_types::RegistryId;

fn make_entry(registry_id: &str, title: &str) -> RegistryEntry {
    RegistryEntry::new(RegistryId::new(registry_id).unwrap(), title)
}

// ── Wildcards ────────────────────────────────────────────────────

#[test]
fn wildcard_exact_and_star() {
    assert!(wildcard_match("registry", "registry"));
    assert!(!wildcard_match("registry", "registryx"));
    assert!(wildcard_match("urn:uuid:*", "urn:uuid:abc"));
    assert!(wildcard_match("*abc", "urn:uuid:abc"));
    assert!(wildcard_match("a*c*e", "abcde"));
    assert!(!wildcard_match("a*c*f", "abcde"));
    assert!(wildcard_match("*", ""));
    assert!(!wildcard_match("Registry", "registry"));
}

// ── Matching ─────────────────────────────────────────────────────

#[test]
fn like_on_tags_matches_any_tag() {
    let mut entry = make_entry("r1", "a");
    entry.tags.insert("extra".into());
    assert!(Filter::like(Field::Tags, REGISTRY_TAG).matches(&entry));
    assert!(Filter::like(Field::Tags, "ext*").matches(&entry));
    assert!(!Filter::like(Field::Tags, "other").matches(&entry));
}

#[test]
fn and_or_is_combinations() {
    let mut entry = make_entry("r1", "a");
    entry.local_node = true;

    let local_registry = Filter::and(vec![
        Filter::like(Field::Tags, REGISTRY_TAG),
        Filter::is(Field::LocalNode, true),
    ]);
    assert!(local_registry.matches(&entry));

    entry.local_node = false;
    assert!(!local_registry.matches(&entry));

    let ids = Filter::or(vec![
        Filter::like(Field::RegistryId, "r0"),
        Filter::like(Field::RegistryId, "r1"),
    ]);
    assert!(ids.matches(&entry));
}

#[test]
fn equals_takes_stars_literally() {
    let plain = make_entry("node-1", "a");
    let starred = make_entry("node*", "b");

    let exact = Filter::equals(Field::RegistryId, "node*");
    assert!(!exact.matches(&plain));
    assert!(exact.matches(&starred));
    assert!(Filter::like(Field::RegistryId, "node*").matches(&plain));

    assert!(Filter::equals(Field::Tags, REGISTRY_TAG).matches(&plain));
    assert!(!Filter::equals(Field::Tags, "reg*").matches(&plain));
}

#[test]
fn empty_or_matches_nothing_and_empty_and_matches_all() {
    let entry = make_entry("r1", "a");
    assert!(!Filter::or(vec![]).matches(&entry));
    assert!(Filter::and(vec![]).matches(&entry));
    assert!(Filter::All.matches(&entry));
}

#[test]
fn like_on_missing_field_does_not_match() {
    let mut entry = make_entry("r1", "a");
    entry.title = None;
    assert!(!Filter::like(Field::Title, "*").matches(&entry));
    assert!(!Filter::like(Field::Id, "*").matches(&entry));
}

// ── Sorting and paging ───────────────────────────────────────────

#[test]
fn query_sorts_by_created_and_pages() {
    let base = Utc::now();
    let entries: Vec<RegistryEntry> = (0..5)
        .rev()
        .map(|i| {
            let mut e = make_entry(&format!("r{i}"), "n");
            e.created = base + Duration::seconds(i);
            e
        })
        .collect();

    let query = Query::new(Filter::All, 2).sorted_by(Sort::ascending(Field::Created));
    let response = query.evaluate(entries.clone());
    assert_eq!(response.hits, 5);
    let ids: Vec<_> = response
        .results
        .iter()
        .map(|e| e.registry_id.as_ref().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["r0", "r1"]);

    let mut second = query.clone();
    second.start_index = 4;
    assert_eq!(second.evaluate(entries.clone()).results.len(), 1);

    let desc = Query::new(Filter::All, 1).sorted_by(Sort {
        field: Field::Created,
        order: SortOrder::Descending,
    });
    let top = desc.evaluate(entries).results.remove(0);
    assert_eq!(top.registry_id.unwrap().as_str(), "r4");
}

#[test]
fn filter_serializes_with_op_tag() {
    let filter = Filter::and(vec![Filter::is(Field::LocalNode, true)]);
    let json = serde_json::to_value(&filter).unwrap();
    assert_eq!(json["op"], "and");
    assert_eq!(json["filters"][0]["op"], "is");
    let back: Filter = serde_json::from_value(json).unwrap();
    assert_eq!(back, filter);
}
