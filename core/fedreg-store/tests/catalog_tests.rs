use async_trait::async_trait;
use fedreg_model::RegistryEntry;
use fedreg_store::mock::{MockStore, Op};
use fedreg_store::{
    Catalog, CreateRequest, DeleteRequest, Filter, IdField, IngestContext, IngestPlugin, Query,
    QueryRequest, RecordGateway, StoreError, StoreResult, UpdateRequest,
};
use fedreg_types::{ChangeKind, RegistryId};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

fn make_entry(registry_id: &str) -> RegistryEntry {
    RegistryEntry::new(RegistryId::new(registry_id).unwrap(), registry_id)
}

fn make_catalog() -> (Catalog, Arc<MockStore>) {
    let local = Arc::new(MockStore::new("local"));
    (Catalog::new(local.clone()), local)
}

fn dest(name: &str) -> BTreeSet<String> {
    BTreeSet::from([name.to_string()])
}

/// Records what it saw and drops every update.
#[derive(Default)]
struct Recorder {
    seen_previous: Mutex<Option<Option<usize>>>,
    creates: Mutex<usize>,
    aborted: Mutex<Vec<RegistryEntry>>,
}

#[async_trait]
impl IngestPlugin for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn pre_update(
        &self,
        _updates: Vec<(String, RegistryEntry)>,
        context: &IngestContext,
    ) -> StoreResult<Vec<(String, RegistryEntry)>> {
        *self.seen_previous.lock().unwrap() = Some(context.previous.as_ref().map(Vec::len));
        Ok(Vec::new())
    }

    async fn create_aborted(&self, entries: &[RegistryEntry], _context: &IngestContext) {
        self.aborted.lock().unwrap().extend_from_slice(entries);
    }

    async fn post_create(&self, created: &[RegistryEntry], _context: &IngestContext) -> StoreResult<()> {
        *self.creates.lock().unwrap() += created.len();
        Err(StoreError::Ingest("post hooks never fail the write".into()))
    }
}

// ── Security ─────────────────────────────────────────────────────

#[tokio::test]
async fn write_without_subject_is_rejected() {
    let (catalog, local) = make_catalog();
    let err = catalog
        .create(CreateRequest::new(vec![make_entry("r1")], IngestContext::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized));
    assert_eq!(local.calls(Op::Create), 0);
}

// ── Local writes ─────────────────────────────────────────────────

#[tokio::test]
async fn local_create_assigns_ids_and_notifies() {
    let (catalog, _local) = make_catalog();
    let mut rx = catalog.subscribe().await;

    let response = catalog
        .create(CreateRequest::new(vec![make_entry("r1")], IngestContext::system()))
        .await
        .unwrap();
    assert!(response.created[0].id.is_some());

    let note = rx.recv().await.unwrap();
    assert_eq!(note.kind, ChangeKind::Created);
    assert_eq!(note.entry.id, response.created[0].id);
    assert!(note.previous.is_none());
}

#[tokio::test]
async fn update_notification_carries_previous_state() {
    let (catalog, local) = make_catalog();
    local.seed(vec![make_entry("r1")]).await;
    let mut rx = catalog.subscribe().await;

    let mut changed = make_entry("r1");
    changed.title = Some("changed".into());
    catalog
        .update(UpdateRequest::new(
            IdField::RegistryId,
            vec![("r1".into(), changed)],
            IngestContext::system(),
        ))
        .await
        .unwrap();

    let note = rx.recv().await.unwrap();
    assert_eq!(note.kind, ChangeKind::Updated);
    assert_eq!(note.entry.title.as_deref(), Some("changed"));
    assert_eq!(note.previous.unwrap().title.as_deref(), Some("r1"));
}

#[tokio::test]
async fn plugins_see_previous_state_and_can_drop_updates() {
    let (catalog, local) = make_catalog();
    local.seed(vec![make_entry("r1")]).await;
    let recorder = Arc::new(Recorder::default());
    catalog.add_plugin(recorder.clone()).await;

    let response = catalog
        .update(UpdateRequest::new(
            IdField::RegistryId,
            vec![("r1".into(), make_entry("r1"))],
            IngestContext::system(),
        ))
        .await
        .unwrap();

    assert!(response.updated.is_empty());
    assert_eq!(local.calls(Op::Update), 0);
    assert_eq!(*recorder.seen_previous.lock().unwrap(), Some(Some(1)));
}

#[tokio::test]
async fn failed_previous_state_lookup_reaches_plugins_as_none() {
    let (catalog, local) = make_catalog();
    let recorder = Arc::new(Recorder::default());
    catalog.add_plugin(recorder.clone()).await;
    local.set_failing(Op::Query, true);

    catalog
        .update(UpdateRequest::new(
            IdField::RegistryId,
            vec![("r1".into(), make_entry("r1"))],
            IngestContext::system(),
        ))
        .await
        .unwrap();
    assert_eq!(*recorder.seen_previous.lock().unwrap(), Some(None));
}

#[tokio::test]
async fn post_hook_failure_does_not_fail_create() {
    let (catalog, _local) = make_catalog();
    let recorder = Arc::new(Recorder::default());
    catalog.add_plugin(recorder.clone()).await;

    let response = catalog
        .create(CreateRequest::new(vec![make_entry("r1")], IngestContext::system()))
        .await
        .unwrap();
    assert_eq!(response.created.len(), 1);
    assert_eq!(*recorder.creates.lock().unwrap(), 1);
    assert!(recorder.aborted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_store_create_reports_accepted_entries() {
    let (catalog, local) = make_catalog();
    let recorder = Arc::new(Recorder::default());
    catalog.add_plugin(recorder.clone()).await;
    local.fail_next(Op::Create, 1);

    let err = catalog
        .create(CreateRequest::new(
            vec![make_entry("r1"), make_entry("r2")],
            IngestContext::system(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    let aborted = recorder.aborted.lock().unwrap();
    assert_eq!(aborted.len(), 2);
    assert!(aborted.iter().all(|e| e.id.is_some()));
    assert_eq!(*recorder.creates.lock().unwrap(), 0);
}

#[tokio::test]
async fn local_delete_notifies() {
    let (catalog, local) = make_catalog();
    local.seed(vec![make_entry("r1")]).await;
    let mut rx = catalog.subscribe().await;

    catalog
        .delete(DeleteRequest::new(IdField::RegistryId, vec!["r1".into()], IngestContext::system()))
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Deleted);
}

// ── Scoped requests ──────────────────────────────────────────────

#[tokio::test]
async fn scoped_create_goes_to_destination_without_plugins_or_notifications() {
    let (catalog, local) = make_catalog();
    let remote = Arc::new(MockStore::new("peer-a"));
    catalog.register_store(remote.clone()).await;
    let recorder = Arc::new(Recorder::default());
    catalog.add_plugin(recorder.clone()).await;
    let mut rx = catalog.subscribe().await;

    let mut entry = make_entry("r1");
    entry.local_node = true;
    entry.published_locations = Some(dest("peer-a"));
    catalog
        .create(CreateRequest::new(vec![entry], IngestContext::system()).to(dest("peer-a")))
        .await
        .unwrap();

    assert_eq!(local.calls(Op::Create), 0);
    assert_eq!(remote.calls(Op::Create), 1);
    assert_eq!(*recorder.creates.lock().unwrap(), 0);
    assert!(rx.try_recv().is_err());

    let copy = &remote.snapshot().await[0];
    assert!(!copy.local_node);
    assert!(copy.published_locations.is_none());
}

#[tokio::test]
async fn unknown_destination_is_an_error() {
    let (catalog, _local) = make_catalog();
    let err = catalog
        .create(CreateRequest::new(vec![make_entry("r1")], IngestContext::system()).to(dest("nowhere")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownSource(_)));
}

#[tokio::test]
async fn query_merges_named_sources() {
    let (catalog, local) = make_catalog();
    let a = Arc::new(MockStore::new("peer-a"));
    let b = Arc::new(MockStore::new("peer-b"));
    a.seed(vec![make_entry("r1")]).await;
    b.seed(vec![make_entry("r2"), make_entry("r3")]).await;
    local.seed(vec![make_entry("r4")]).await;
    catalog.register_store(a).await;
    catalog.register_store(b).await;

    let sources = BTreeSet::from(["peer-a".to_string(), "peer-b".to_string()]);
    let response = catalog
        .query(QueryRequest::from_sources(Query::new(Filter::All, 10), sources))
        .await
        .unwrap();
    assert_eq!(response.hits, 3);
    assert!(response
        .results
        .iter()
        .all(|e| e.source_id.as_deref() != Some("local")));

    assert_eq!(catalog.store_ids().await, vec!["peer-a", "peer-b"]);
    assert!(catalog.unregister_store("peer-a").await);
    assert_eq!(catalog.store_ids().await, vec!["peer-b"]);
}
