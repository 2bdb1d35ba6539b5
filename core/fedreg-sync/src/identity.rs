//! Identity guard: the ingest plugin that keeps registry ids unique, stamps
//! identifier annotations, suppresses stale updates and carries transient
//! fields forward.

use async_trait::async_trait;
use dashmap::DashSet;
use fedreg_model::{
    ExternalIdentifier, RegistryEntry, ENTRY_ID_SCHEME, LOCAL_ID_ANNOTATION, ORIGIN_ID_ANNOTATION,
};
use fedreg_store::{
    EntryUpdate, IngestContext, IngestPlugin, RecordGateway, StoreError, StoreResult,
};
use fedreg_types::RegistryId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::query::{fetch_all, RegistryQuery};
use crate::service_config::{derive_configurations, ConfigurationSink};

/// Registry ids of every registry entry in the local store, plus ids
/// reserved by creates still in flight.
#[derive(Debug, Default)]
pub struct ActiveRegistryIds {
    ids: DashSet<RegistryId>,
}

impl ActiveRegistryIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id was already present.
    pub fn add(&self, id: RegistryId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&self, id: &RegistryId) -> bool {
        self.ids.remove(id).is_some()
    }

    pub fn contains(&self, id: &RegistryId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Stamps the local-id and origin-id annotations on the entry's document.
///
/// Third-party annotations are kept. The local id is always overwritten; the
/// origin id is only added when missing, so a record keeps pointing at the
/// installation that created it.
pub fn annotate_identifiers(entry: &mut RegistryEntry) -> StoreResult<()> {
    if entry.metadata.is_empty() {
        return Ok(());
    }
    let (Some(id), Some(registry_id)) = (entry.id, entry.registry_id.clone()) else {
        return Err(StoreError::Transform(
            "cannot annotate an entry without store and registry ids".into(),
        ));
    };
    let mut document = entry
        .document()
        .map_err(|e| StoreError::Transform(format!("unable to read registry metadata: {e}")))?;

    let value = id.to_string();
    let mut local_found = false;
    let mut origin_found = false;
    for annotation in &mut document.external_identifiers {
        annotation.registry_object = registry_id.to_string();
        if annotation.id == LOCAL_ID_ANNOTATION {
            annotation.value = value.clone();
            local_found = true;
        } else if annotation.id == ORIGIN_ID_ANNOTATION {
            origin_found = true;
        }
    }
    for (annotation_id, found) in [
        (LOCAL_ID_ANNOTATION, local_found),
        (ORIGIN_ID_ANNOTATION, origin_found),
    ] {
        if !found {
            document.external_identifiers.push(ExternalIdentifier {
                id: annotation_id.to_string(),
                registry_object: registry_id.to_string(),
                identification_scheme: ENTRY_ID_SCHEME.to_string(),
                value: value.clone(),
            });
        }
    }

    entry
        .set_document(&document)
        .map_err(|e| StoreError::Transform(format!("unable to write registry metadata: {e}")))
}

/// Ingest plugin guarding registry identity on local writes.
pub struct IdentityGuard {
    active: ActiveRegistryIds,
    sink: Arc<dyn ConfigurationSink>,
}

impl IdentityGuard {
    pub fn new(sink: Arc<dyn ConfigurationSink>) -> Self {
        Self {
            active: ActiveRegistryIds::new(),
            sink,
        }
    }

    pub fn active_ids(&self) -> &ActiveRegistryIds {
        &self.active
    }

    /// Seeds the active id set from every registry entry in the local store.
    pub async fn initialize(&self, gateway: &dyn RecordGateway, page_size: usize) -> StoreResult<usize> {
        let query = RegistryQuery::new(page_size).build();
        let entries = fetch_all(gateway, query, BTreeSet::new()).await?;
        let mut seeded = 0;
        for registry_id in entries.into_iter().filter_map(|e| e.registry_id) {
            if self.active.add(registry_id) {
                seeded += 1;
            }
        }
        info!("Identity guard seeded with {} registry id(s)", seeded);
        Ok(seeded)
    }

    /// Drops reservations made for creates that did not commit.
    fn release(&self, ids: &[RegistryId]) {
        for id in ids {
            if self.active.remove(id) {
                debug!("Released registry id {}", id);
            }
        }
    }

    async fn apply_configurations(&self, entry: &RegistryEntry) {
        if entry.identity_node {
            return;
        }
        let Some(registry_id) = &entry.registry_id else {
            return;
        };
        match derive_configurations(entry) {
            Ok(configurations) => {
                if let Err(e) = self.sink.apply(registry_id, configurations).await {
                    warn!("Failed to apply configurations for {}: {}", registry_id, e);
                }
            }
            Err(e) => warn!("Failed to derive configurations for {}: {}", registry_id, e),
        }
    }
}

#[async_trait]
impl IngestPlugin for IdentityGuard {
    fn name(&self) -> &str {
        "identity-guard"
    }

    async fn pre_create(
        &self,
        mut entries: Vec<RegistryEntry>,
        _context: &IngestContext,
    ) -> StoreResult<Vec<RegistryEntry>> {
        let mut reserved = Vec::new();
        for entry in &mut entries {
            if !entry.is_registry_entry() {
                continue;
            }
            let Some(registry_id) = entry.registry_id.clone() else {
                continue;
            };
            if !self.active.add(registry_id.clone()) {
                self.release(&reserved);
                return Err(StoreError::Duplicate(format!(
                    "registry id {registry_id} already exists"
                )));
            }
            reserved.push(registry_id);
            if let Err(e) = annotate_identifiers(entry) {
                self.release(&reserved);
                return Err(e);
            }
        }
        Ok(entries)
    }

    async fn pre_update(
        &self,
        updates: Vec<(String, RegistryEntry)>,
        context: &IngestContext,
    ) -> StoreResult<Vec<(String, RegistryEntry)>> {
        if context.previous.is_none() {
            return Err(StoreError::Conflict(
                "previous state unavailable, refusing to apply update".into(),
            ));
        }

        let mut kept = Vec::with_capacity(updates.len());
        for (key, mut entry) in updates {
            if !entry.is_registry_entry() {
                kept.push((key, entry));
                continue;
            }
            let previous = entry.id.as_ref().and_then(|id| context.previous_for(id));
            let Some(previous) = previous else {
                return Err(StoreError::Conflict(format!(
                    "no previous state for update of {key}"
                )));
            };
            if previous.registry_id != entry.registry_id {
                kept.push((key, entry));
                continue;
            }
            if context.transient_update || entry.is_newer_than(previous) {
                entry.carry_transient_from(previous);
                kept.push((key, entry));
            } else {
                debug!(
                    "Dropping stale update of {} (incoming {} <= stored {})",
                    key, entry.modified, previous.modified
                );
            }
        }
        Ok(kept)
    }

    async fn create_aborted(&self, entries: &[RegistryEntry], _context: &IngestContext) {
        let ids: Vec<RegistryId> = entries
            .iter()
            .filter(|e| e.is_registry_entry())
            .filter_map(|e| e.registry_id.clone())
            .collect();
        self.release(&ids);
    }

    async fn post_create(&self, created: &[RegistryEntry], _context: &IngestContext) -> StoreResult<()> {
        for entry in created.iter().filter(|e| e.is_registry_entry()) {
            self.apply_configurations(entry).await;
        }
        Ok(())
    }

    async fn post_update(&self, updated: &[EntryUpdate], _context: &IngestContext) -> StoreResult<()> {
        for update in updated.iter().filter(|u| u.new.is_registry_entry()) {
            self.apply_configurations(&update.new).await;
        }
        Ok(())
    }

    async fn post_delete(&self, deleted: &[RegistryEntry], _context: &IngestContext) -> StoreResult<()> {
        for entry in deleted.iter().filter(|e| e.is_registry_entry()) {
            let Some(registry_id) = &entry.registry_id else {
                continue;
            };
            self.active.remove(registry_id);
            if let Err(e) = self.sink.remove(registry_id).await {
                warn!("Failed to remove configurations for {}: {}", registry_id, e);
            }
        }
        Ok(())
    }
}
