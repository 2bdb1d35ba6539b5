//! Instrumented in-memory store for tests.

use async_trait::async_trait;
use fedreg_model::RegistryEntry;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{StoreError, StoreResult};
use crate::filter::{Filter, Query, QueryResponse};
use crate::ingest::{EntryUpdate, IdField};
use crate::sqlite::SqliteRecordStore;
use crate::store::RecordStore;

/// Store operation, used to address counters and failure switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create = 0,
    Update = 1,
    Delete = 2,
    Query = 3,
}

/// In-memory SQLite store that counts calls and can be told to fail or hang.
pub struct MockStore {
    inner: SqliteRecordStore,
    calls: [AtomicUsize; 4],
    failing: [AtomicBool; 4],
    fail_next: [AtomicUsize; 4],
    hang_queries: AtomicBool,
}

impl MockStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: SqliteRecordStore::open_in_memory(id).expect("in-memory sqlite store"),
            calls: Default::default(),
            failing: Default::default(),
            fail_next: Default::default(),
            hang_queries: AtomicBool::new(false),
        }
    }

    /// Inserts records without counting the call.
    pub async fn seed(&self, entries: Vec<RegistryEntry>) -> Vec<RegistryEntry> {
        self.inner.create(entries).await.expect("seed mock store")
    }

    /// Every stored record, without counting the call.
    pub async fn snapshot(&self) -> Vec<RegistryEntry> {
        self.inner
            .query(Query::new(Filter::All, usize::MAX))
            .await
            .expect("snapshot mock store")
            .results
    }

    /// Number of calls made for `op`, failed ones included.
    pub fn calls(&self, op: Op) -> usize {
        self.calls[op as usize].load(Ordering::SeqCst)
    }

    /// Total write calls (create, update, delete).
    pub fn writes(&self) -> usize {
        self.calls(Op::Create) + self.calls(Op::Update) + self.calls(Op::Delete)
    }

    pub fn reset_calls(&self) {
        for c in &self.calls {
            c.store(0, Ordering::SeqCst);
        }
    }

    /// Makes every call for `op` fail until switched off.
    pub fn set_failing(&self, op: Op, failing: bool) {
        self.failing[op as usize].store(failing, Ordering::SeqCst);
    }

    /// Makes the next `n` calls for `op` fail.
    pub fn fail_next(&self, op: Op, n: usize) {
        self.fail_next[op as usize].store(n, Ordering::SeqCst);
    }

    /// Makes queries never complete.
    pub fn set_hanging(&self, hanging: bool) {
        self.hang_queries.store(hanging, Ordering::SeqCst);
    }

    fn enter(&self, op: Op) -> StoreResult<()> {
        let i = op as usize;
        self.calls[i].fetch_add(1, Ordering::SeqCst);
        let budget = self.fail_next[i]
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if budget || self.failing[i].load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "{} rejected {:?}",
                self.inner.id(),
                op
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MockStore {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn create(&self, entries: Vec<RegistryEntry>) -> StoreResult<Vec<RegistryEntry>> {
        self.enter(Op::Create)?;
        self.inner.create(entries).await
    }

    async fn update(
        &self,
        id_field: IdField,
        updates: Vec<(String, RegistryEntry)>,
    ) -> StoreResult<Vec<EntryUpdate>> {
        self.enter(Op::Update)?;
        self.inner.update(id_field, updates).await
    }

    async fn delete(&self, id_field: IdField, ids: Vec<String>) -> StoreResult<Vec<RegistryEntry>> {
        self.enter(Op::Delete)?;
        self.inner.delete(id_field, ids).await
    }

    async fn query(&self, query: Query) -> StoreResult<QueryResponse> {
        self.enter(Op::Query)?;
        if self.hang_queries.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.query(query).await
    }
}
