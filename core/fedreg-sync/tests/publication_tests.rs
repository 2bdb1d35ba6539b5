mod common;

use common::{entry_at, make_entry, make_harness, rid, Harness};
use fedreg_model::RegistryEntry;
use fedreg_store::mock::{MockStore, Op};
use fedreg_store::{ChangeNotification, IdField, RecordStore};
use fedreg_sync::{FederationError, PublicationReconciler};
use fedreg_types::ChangeKind;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn next(rx: &mut UnboundedReceiver<ChangeNotification>) -> ChangeNotification {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notification arrived")
        .expect("catalog still open")
}

struct Fixture {
    h: Harness,
    a: Arc<MockStore>,
    b: Arc<MockStore>,
    rx: UnboundedReceiver<ChangeNotification>,
    publisher: PublicationReconciler,
}

async fn fixture() -> Fixture {
    let h = make_harness().await;
    let a = h.remote("peer-a").await;
    let b = h.remote("peer-b").await;
    let rx = h.catalog.subscribe().await;
    let publisher = PublicationReconciler::new(h.engine.clone());
    Fixture {
        h,
        a,
        b,
        rx,
        publisher,
    }
}

fn local_entry(registry_id: &str, offset: i64, destinations: &[&str]) -> RegistryEntry {
    let mut entry = entry_at(registry_id, offset);
    entry.local_node = true;
    entry.published_locations = Some(set(destinations));
    entry
}

/// Creates `r1` published to both peers and runs the resulting passes.
async fn published_everywhere(f: &mut Fixture) {
    f.h.engine
        .add_entry(local_entry("r1", 0, &["peer-a", "peer-b"]))
        .await
        .unwrap();
    let created = next(&mut f.rx).await;
    f.publisher.handle(&created).await.unwrap();
    let written_back = next(&mut f.rx).await;
    assert!(f.publisher.handle(&written_back).await.is_none());
}

// ── Gate ─────────────────────────────────────────────────────────

#[test]
fn gate_requires_stale_registry_entry_with_destinations() {
    let entry = local_entry("r1", 0, &["peer-a"]);
    let note = |kind, entry: RegistryEntry| ChangeNotification {
        kind,
        entry,
        previous: None,
    };

    assert!(PublicationReconciler::needs_publication(&note(ChangeKind::Created, entry.clone())));
    assert!(!PublicationReconciler::needs_publication(&note(ChangeKind::Deleted, entry.clone())));

    let mut untagged = entry.clone();
    untagged.tags.clear();
    assert!(!PublicationReconciler::needs_publication(&note(ChangeKind::Updated, untagged)));

    let mut current = entry.clone();
    current.last_published = Some(current.modified);
    assert!(!PublicationReconciler::needs_publication(&note(ChangeKind::Updated, current)));

    let mut behind = entry.clone();
    behind.last_published = Some(entry_at("r1", -60).modified);
    assert!(PublicationReconciler::needs_publication(&note(ChangeKind::Updated, behind)));

    let mut nowhere = entry;
    nowhere.published_locations = Some(BTreeSet::new());
    assert!(!PublicationReconciler::needs_publication(&note(ChangeKind::Updated, nowhere)));
}

// ── Convergence ──────────────────────────────────────────────────

#[tokio::test]
async fn new_entry_is_created_once_at_each_destination() {
    let mut f = fixture().await;
    f.h.engine
        .add_entry(local_entry("r1", 0, &["peer-a", "peer-b"]))
        .await
        .unwrap();

    let created = next(&mut f.rx).await;
    let outcome = f.publisher.handle(&created).await.unwrap();
    assert_eq!(outcome.published, set(&["peer-a", "peer-b"]));
    assert_eq!(outcome.confirmed, set(&["peer-a", "peer-b"]));
    assert!(outcome.failed.is_empty());
    assert_eq!(f.a.calls(Op::Create), 1);
    assert_eq!(f.b.calls(Op::Create), 1);

    let copy = &f.a.snapshot().await[0];
    assert!(!copy.local_node);
    assert!(copy.published_locations.is_none());

    let stored = &f.h.local.snapshot().await[0];
    assert_eq!(stored.published_locations, Some(set(&["peer-a", "peer-b"])));
    assert_eq!(stored.last_published, Some(stored.modified));

    let written_back = next(&mut f.rx).await;
    f.a.reset_calls();
    f.b.reset_calls();
    assert!(f.publisher.handle(&written_back).await.is_none());
    assert_eq!(f.a.writes() + f.b.writes(), 0);
    assert_eq!(f.a.calls(Op::Query) + f.b.calls(Op::Query), 0);
}

#[tokio::test]
async fn failed_create_is_retried_then_left_out() {
    let mut f = fixture().await;
    f.a.set_failing(Op::Create, true);
    f.h.engine
        .add_entry(local_entry("r1", 0, &["peer-a", "peer-b"]))
        .await
        .unwrap();

    let created = next(&mut f.rx).await;
    let outcome = f.publisher.handle(&created).await.unwrap();
    assert_eq!(f.a.calls(Op::Create), 2);
    assert_eq!(outcome.failed, set(&["peer-a"]));
    assert_eq!(outcome.confirmed, set(&["peer-b"]));
    assert_eq!(
        f.h.local.snapshot().await[0].published_locations,
        Some(set(&["peer-b"]))
    );
}

#[tokio::test]
async fn shrinking_destinations_removes_and_refreshes() {
    let mut f = fixture().await;
    published_everywhere(&mut f).await;

    let mut edited = local_entry("r1", 60, &["peer-a"]);
    edited.title = Some("v2".into());
    f.h.engine.update_entry(edited).await.unwrap();

    let updated = next(&mut f.rx).await;
    let outcome = f.publisher.handle(&updated).await.unwrap();
    assert_eq!(outcome.unpublished, set(&["peer-b"]));
    assert_eq!(outcome.refreshed, set(&["peer-a"]));
    assert_eq!(outcome.confirmed, set(&["peer-a"]));

    assert!(f.b.snapshot().await.is_empty());
    assert_eq!(f.a.snapshot().await[0].title.as_deref(), Some("v2"));

    let stored = &f.h.local.snapshot().await[0];
    assert_eq!(stored.published_locations, Some(set(&["peer-a"])));
    assert_eq!(stored.last_published, Some(entry_at("r1", 60).modified));
}

#[tokio::test]
async fn failed_delete_of_missing_copy_counts_as_removed() {
    let mut f = fixture().await;
    published_everywhere(&mut f).await;
    f.b.delete(IdField::RegistryId, vec!["r1".into()]).await.unwrap();

    f.h.engine
        .update_entry(local_entry("r1", 60, &["peer-a"]))
        .await
        .unwrap();
    let outcome = f.publisher.handle(&next(&mut f.rx).await).await.unwrap();
    assert_eq!(outcome.unpublished, set(&["peer-b"]));
    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.confirmed, set(&["peer-a"]));
}

#[tokio::test]
async fn failed_delete_of_present_copy_stays_confirmed() {
    let mut f = fixture().await;
    published_everywhere(&mut f).await;
    f.b.set_failing(Op::Delete, true);

    f.h.engine
        .update_entry(local_entry("r1", 60, &["peer-a"]))
        .await
        .unwrap();
    let outcome = f.publisher.handle(&next(&mut f.rx).await).await.unwrap();
    assert_eq!(f.b.calls(Op::Delete), 2);
    assert_eq!(outcome.failed, set(&["peer-b"]));
    assert_eq!(outcome.confirmed, set(&["peer-a", "peer-b"]));
    assert_eq!(f.b.snapshot().await.len(), 1);
    assert_eq!(
        f.h.local.snapshot().await[0].published_locations,
        Some(set(&["peer-a", "peer-b"]))
    );
}

#[tokio::test]
async fn unreachable_destination_stays_confirmed_on_unpublish() {
    let mut f = fixture().await;
    published_everywhere(&mut f).await;
    f.b.set_failing(Op::Query, true);

    f.h.engine
        .update_entry(local_entry("r1", 60, &["peer-a"]))
        .await
        .unwrap();
    let outcome = f.publisher.handle(&next(&mut f.rx).await).await.unwrap();
    assert_eq!(outcome.failed, set(&["peer-b"]));
    assert!(outcome.confirmed.contains("peer-b"));
}

// ── Operator form ────────────────────────────────────────────────

#[tokio::test]
async fn update_publications_sets_the_complete_destination_set() {
    let f = fixture().await;
    let mut entry = make_entry("r1");
    entry.local_node = true;
    f.h.engine.add_entry(entry).await.unwrap();

    let outcome = f
        .publisher
        .update_publications(&rid("r1"), set(&["peer-a"]))
        .await
        .unwrap();
    assert_eq!(outcome.published, set(&["peer-a"]));
    assert_eq!(f.a.snapshot().await.len(), 1);
    assert_eq!(
        f.h.local.snapshot().await[0].published_locations,
        Some(set(&["peer-a"]))
    );

    let outcome = f
        .publisher
        .update_publications(&rid("r1"), BTreeSet::new())
        .await
        .unwrap();
    assert_eq!(outcome.unpublished, set(&["peer-a"]));
    assert!(f.a.snapshot().await.is_empty());
    assert_eq!(
        f.h.local.snapshot().await[0].published_locations,
        Some(BTreeSet::new())
    );
}

#[tokio::test]
async fn update_publications_of_unknown_entry_is_not_found() {
    let f = fixture().await;
    assert!(matches!(
        f.publisher.update_publications(&rid("nope"), set(&["peer-a"])).await,
        Err(FederationError::NotFound(_))
    ));
}
