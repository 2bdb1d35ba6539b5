//! Ingest plugin hooks run by the gateway around local writes.

use async_trait::async_trait;
use fedreg_model::RegistryEntry;

use crate::error::StoreResult;
use crate::ingest::{EntryUpdate, IngestContext};

/// Hooks observing the lifecycle of local writes.
///
/// Pre hooks may rewrite or drop records, or stop the request with an
/// error. Post hook errors are logged by the gateway and never undo a
/// committed write.
#[async_trait]
pub trait IngestPlugin: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    async fn pre_create(
        &self,
        entries: Vec<RegistryEntry>,
        _context: &IngestContext,
    ) -> StoreResult<Vec<RegistryEntry>> {
        Ok(entries)
    }

    async fn pre_update(
        &self,
        updates: Vec<(String, RegistryEntry)>,
        _context: &IngestContext,
    ) -> StoreResult<Vec<(String, RegistryEntry)>> {
        Ok(updates)
    }

    /// Entries this plugin accepted in `pre_create` that were never
    /// committed, because a later plugin or the store refused them.
    async fn create_aborted(&self, _entries: &[RegistryEntry], _context: &IngestContext) {}

    async fn post_create(&self, _created: &[RegistryEntry], _context: &IngestContext) -> StoreResult<()> {
        Ok(())
    }

    async fn post_update(&self, _updated: &[EntryUpdate], _context: &IngestContext) -> StoreResult<()> {
        Ok(())
    }

    async fn post_delete(&self, _deleted: &[RegistryEntry], _context: &IngestContext) -> StoreResult<()> {
        Ok(())
    }
}
