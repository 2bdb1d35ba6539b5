//! Record store abstraction.

use async_trait::async_trait;
use fedreg_model::RegistryEntry;

use crate::error::StoreResult;
use crate::filter::{Query, QueryResponse};
use crate::ingest::{EntryUpdate, IdField};

/// A single catalog of registry entries, local or remote.
///
/// Stores persist what they are given. Identity checks, transient merges and
/// stale-write suppression happen above them in the gateway's plugins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Identifier this store is registered under.
    fn id(&self) -> &str;

    /// Persists new records, assigning an id to any record without one.
    ///
    /// Fails with [`StoreError::Duplicate`](crate::StoreError::Duplicate) when
    /// an id is already taken.
    async fn create(&self, entries: Vec<RegistryEntry>) -> StoreResult<Vec<RegistryEntry>>;

    /// Replaces the records matching each key. Every key must match a record.
    async fn update(
        &self,
        id_field: IdField,
        updates: Vec<(String, RegistryEntry)>,
    ) -> StoreResult<Vec<EntryUpdate>>;

    /// Removes the records matching `ids`. Every id must match a record.
    async fn delete(&self, id_field: IdField, ids: Vec<String>) -> StoreResult<Vec<RegistryEntry>>;

    /// Runs a query. Results carry this store's id as `source_id`.
    async fn query(&self, query: Query) -> StoreResult<QueryResponse>;
}
