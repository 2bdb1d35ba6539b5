//! Federation engine: the create/update/delete/query protocol for registry
//! entries.
//!
//! Every write, whether it comes from an operator, the reconciler or the
//! publication workers, goes through here. The engine attaches the system
//! subject, validates the entry, performs the transient-field merge and hands
//! the request to the gateway, where the identity guard sees it.

use crate::config::{FederationConfig, NodeInfo};
use crate::error::{FederationError, FederationResult};
use crate::query::{fetch_all, RegistryQuery};
use chrono::Utc;
use fedreg_model::{
    RegistryDocument, RegistryEntry, DATE_TIME_SLOT_TYPE, LAST_UPDATED_SLOT, LIVE_DATE_SLOT,
    REGISTRY_NODE_OBJECT_TYPE, TRANSIENT_FIELDS,
};
use fedreg_store::{
    CreateRequest, DeleteRequest, IdField, IngestContext, Query, RecordGateway,
    SchemaTransform, UpdateRequest,
};
use fedreg_types::{EntryId, RegistryId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The federation engine.
pub struct FederationEngine {
    gateway: Arc<dyn RecordGateway>,
    transform: Arc<dyn SchemaTransform>,
    config: FederationConfig,
}

fn no_destinations() -> BTreeSet<String> {
    BTreeSet::new()
}

fn registry_id_of(entry: &RegistryEntry) -> FederationResult<&RegistryId> {
    entry
        .registry_id
        .as_ref()
        .ok_or_else(|| FederationError::Validation("entry has no registry id".into()))
}

fn validate(entry: &RegistryEntry) -> FederationResult<()> {
    let registry_id = registry_id_of(entry)?;
    if !entry.is_registry_entry() {
        return Err(FederationError::Validation(format!(
            "entry {registry_id} is missing the registry tag"
        )));
    }
    Ok(())
}

fn stamp_dates(document: &mut RegistryDocument) {
    let now = Utc::now().to_rfc3339();
    document.set_slot(LAST_UPDATED_SLOT, Some(DATE_TIME_SLOT_TYPE), vec![now.clone()]);
    if document.slot(LIVE_DATE_SLOT).is_none() {
        document.set_slot(LIVE_DATE_SLOT, Some(DATE_TIME_SLOT_TYPE), vec![now]);
    }
}

impl FederationEngine {
    pub fn new(
        gateway: Arc<dyn RecordGateway>,
        transform: Arc<dyn SchemaTransform>,
        config: FederationConfig,
    ) -> Self {
        Self {
            gateway,
            transform,
            config,
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    fn registry_query(&self) -> RegistryQuery {
        RegistryQuery::new(self.config.page_size)
    }

    async fn run_query(
        &self,
        query: Query,
        sources: BTreeSet<String>,
    ) -> FederationResult<Vec<RegistryEntry>> {
        fetch_all(&*self.gateway, query, sources)
            .await
            .map_err(FederationError::from_read)
    }

    // ── Create ───────────────────────────────────────────────────

    /// Creates `entry` in the local store and returns its store id.
    pub async fn add_entry(&self, entry: RegistryEntry) -> FederationResult<EntryId> {
        self.add_entry_to(entry, no_destinations()).await
    }

    /// Creates `entry` in the given destinations, or locally when empty.
    pub async fn add_entry_to(
        &self,
        entry: RegistryEntry,
        destinations: BTreeSet<String>,
    ) -> FederationResult<EntryId> {
        validate(&entry)?;
        let registry_id = registry_id_of(&entry)?.clone();
        let request = CreateRequest::new(vec![entry], IngestContext::system()).to(destinations);
        let response = self
            .gateway
            .create(request)
            .await
            .map_err(FederationError::from_write)?;
        response
            .created
            .first()
            .and_then(|e| e.id)
            .ok_or_else(|| FederationError::Ingest(format!("no record created for {registry_id}")))
    }

    /// Creates many local entries in one gateway call.
    pub async fn add_entries(
        &self,
        entries: Vec<RegistryEntry>,
    ) -> FederationResult<Vec<RegistryEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        for entry in &entries {
            validate(entry)?;
        }
        let response = self
            .gateway
            .create(CreateRequest::new(entries, IngestContext::system()))
            .await
            .map_err(FederationError::from_write)?;
        Ok(response.created)
    }

    /// Creates a local entry from a wire document.
    pub async fn add_entry_document(&self, document: &[u8]) -> FederationResult<EntryId> {
        let entry = self
            .transform
            .document_to_entry(document)
            .map_err(FederationError::from_write)?;
        self.add_entry(entry).await
    }

    // ── Update ───────────────────────────────────────────────────

    /// Updates the local copy of `entry`, keyed by registry id.
    pub async fn update_entry(&self, entry: RegistryEntry) -> FederationResult<()> {
        self.update_entry_to(entry, no_destinations()).await
    }

    /// Updates `entry` in the given destinations, or locally when empty.
    ///
    /// Exactly one stored entry must carry the registry id in every target
    /// store. Unset transient fields are copied forward from the stored entry;
    /// set ones that differ mark the request as a transient-only update.
    pub async fn update_entry_to(
        &self,
        mut entry: RegistryEntry,
        destinations: BTreeSet<String>,
    ) -> FederationResult<()> {
        validate(&entry)?;
        let registry_id = registry_id_of(&entry)?.clone();
        let lookup = self
            .registry_query()
            .registry_ids(std::slice::from_ref(&registry_id))
            .build();

        let mut transient_update = false;
        if destinations.is_empty() {
            let existing = self.run_query(lookup, no_destinations()).await?;
            let stored = Self::exactly_one(&registry_id, existing)?;
            for field in TRANSIENT_FIELDS {
                if !field.is_set(&entry) {
                    field.copy(&stored, &mut entry);
                } else if field.differs(&entry, &stored) {
                    transient_update = true;
                }
            }
        } else {
            for destination in &destinations {
                let existing = self
                    .run_query(lookup.clone(), BTreeSet::from([destination.clone()]))
                    .await?;
                Self::exactly_one(&registry_id, existing)?;
            }
        }

        let context = IngestContext::system().with_transient_update(transient_update);
        let request = UpdateRequest::new(
            IdField::RegistryId,
            vec![(registry_id.to_string(), entry)],
            context,
        )
        .to(destinations);
        self.gateway
            .update(request)
            .await
            .map_err(FederationError::from_write)?;
        debug!("Updated registry entry {} (transient: {})", registry_id, transient_update);
        Ok(())
    }

    fn exactly_one(
        registry_id: &RegistryId,
        mut existing: Vec<RegistryEntry>,
    ) -> FederationResult<RegistryEntry> {
        match existing.len() {
            0 => Err(FederationError::NotFound(format!(
                "no registry entry with registry id {registry_id}"
            ))),
            1 => Ok(existing.remove(0)),
            _ => {
                let ids: Vec<String> = existing
                    .iter()
                    .filter_map(|e| e.id.map(|id| id.to_string()))
                    .collect();
                Err(FederationError::Conflict(format!(
                    "multiple registry entries with registry id {registry_id}: {}",
                    ids.join(", ")
                )))
            }
        }
    }

    /// Updates many local entries in one gateway call, keyed by registry id.
    ///
    /// No transient merge happens here; the identity guard carries transient
    /// fields forward.
    pub async fn update_entries(&self, entries: Vec<RegistryEntry>) -> FederationResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut updates = Vec::with_capacity(entries.len());
        for entry in entries {
            validate(&entry)?;
            let key = registry_id_of(&entry)?.to_string();
            updates.push((key, entry));
        }
        let response = self
            .gateway
            .update(UpdateRequest::new(
                IdField::RegistryId,
                updates,
                IngestContext::system(),
            ))
            .await
            .map_err(FederationError::from_write)?;
        Ok(response.updated.len())
    }

    /// Updates the local copy from a wire document.
    pub async fn update_entry_document(&self, document: &[u8]) -> FederationResult<()> {
        let entry = self
            .transform
            .document_to_entry(document)
            .map_err(FederationError::from_write)?;
        self.update_entry(entry).await
    }

    // ── Delete ───────────────────────────────────────────────────

    /// Deletes local entries by store id.
    pub async fn delete_entries(&self, ids: &[EntryId]) -> FederationResult<usize> {
        self.delete_entries_to(ids, no_destinations()).await
    }

    pub async fn delete_entries_to(
        &self,
        ids: &[EntryId],
        destinations: BTreeSet<String>,
    ) -> FederationResult<usize> {
        if ids.is_empty() {
            return Err(FederationError::Validation(
                "an empty list of ids cannot be deleted".into(),
            ));
        }
        let request = DeleteRequest::new(
            IdField::Id,
            ids.iter().map(EntryId::to_string).collect(),
            IngestContext::system(),
        )
        .to(destinations);
        let response = self
            .gateway
            .delete(request)
            .await
            .map_err(FederationError::from_write)?;
        Ok(response.deleted.len())
    }

    /// Deletes local entries by registry id.
    pub async fn delete_entries_by_registry_ids(
        &self,
        registry_ids: &[RegistryId],
    ) -> FederationResult<usize> {
        self.delete_entries_by_registry_ids_to(registry_ids, no_destinations())
            .await
    }

    /// Resolves `registry_ids` to store ids in every target store, then
    /// deletes them. If any store does not resolve every id, nothing is
    /// deleted anywhere.
    pub async fn delete_entries_by_registry_ids_to(
        &self,
        registry_ids: &[RegistryId],
        destinations: BTreeSet<String>,
    ) -> FederationResult<usize> {
        if registry_ids.is_empty() {
            return Err(FederationError::Validation(
                "an empty list of registry ids cannot be deleted".into(),
            ));
        }
        let query = self.registry_query().registry_ids(registry_ids).build();
        let targets: Vec<BTreeSet<String>> = if destinations.is_empty() {
            vec![no_destinations()]
        } else {
            destinations
                .iter()
                .map(|d| BTreeSet::from([d.clone()]))
                .collect()
        };

        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            let found = self.run_query(query.clone(), target.clone()).await?;
            let ids = Self::resolve_all(registry_ids, &found)?;
            resolved.push((target, ids));
        }

        let mut deleted = 0;
        for (target, ids) in resolved {
            deleted += self.delete_entries_to(&ids, target).await?;
        }
        Ok(deleted)
    }

    /// Deletes locally-owned entries by registry id.
    pub async fn delete_local_entries(&self, registry_ids: &[RegistryId]) -> FederationResult<usize> {
        if registry_ids.is_empty() {
            return Err(FederationError::Validation(
                "an empty list of registry ids cannot be deleted".into(),
            ));
        }
        let found = self.query_local_by_registry_ids(registry_ids).await?;
        let ids = Self::resolve_all(registry_ids, &found)?;
        self.delete_entries(&ids).await
    }

    /// Maps every requested registry id to exactly one store id. Missing or
    /// ambiguous ids fail the whole batch.
    fn resolve_all(
        registry_ids: &[RegistryId],
        found: &[RegistryEntry],
    ) -> FederationResult<Vec<EntryId>> {
        let mut by_registry_id: BTreeMap<&RegistryId, Vec<EntryId>> = BTreeMap::new();
        for entry in found {
            if let (Some(registry_id), Some(id)) = (&entry.registry_id, entry.id) {
                by_registry_id.entry(registry_id).or_default().push(id);
            }
        }

        let requested: BTreeSet<&RegistryId> = registry_ids.iter().collect();
        let mut ids = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        let mut ambiguous = Vec::new();
        for registry_id in requested {
            match by_registry_id.get(registry_id).map(Vec::as_slice) {
                Some([id]) => ids.push(*id),
                Some([]) | None => missing.push(registry_id.to_string()),
                Some(_) => ambiguous.push(registry_id.to_string()),
            }
        }
        if !missing.is_empty() || !ambiguous.is_empty() {
            return Err(FederationError::Conflict(format!(
                "nothing deleted; not found: [{}], ambiguous: [{}]",
                missing.join(", "),
                ambiguous.join(", ")
            )));
        }
        Ok(ids)
    }

    // ── Query ────────────────────────────────────────────────────

    /// Every registry entry in the local store.
    pub async fn query_entries(&self) -> FederationResult<Vec<RegistryEntry>> {
        self.run_query(self.registry_query().build(), no_destinations())
            .await
    }

    /// Every locally-owned registry entry.
    pub async fn query_local_entries(&self) -> FederationResult<Vec<RegistryEntry>> {
        self.run_query(self.registry_query().local().build(), no_destinations())
            .await
    }

    pub async fn query_by_registry_ids(
        &self,
        registry_ids: &[RegistryId],
    ) -> FederationResult<Vec<RegistryEntry>> {
        Self::require_ids(registry_ids)?;
        self.run_query(
            self.registry_query().registry_ids(registry_ids).build(),
            no_destinations(),
        )
        .await
    }

    pub async fn query_local_by_registry_ids(
        &self,
        registry_ids: &[RegistryId],
    ) -> FederationResult<Vec<RegistryEntry>> {
        Self::require_ids(registry_ids)?;
        self.run_query(
            self.registry_query().local().registry_ids(registry_ids).build(),
            no_destinations(),
        )
        .await
    }

    fn require_ids(registry_ids: &[RegistryId]) -> FederationResult<()> {
        if registry_ids.is_empty() {
            return Err(FederationError::Validation(
                "at least one registry id is required".into(),
            ));
        }
        Ok(())
    }

    /// Looks up one entry by registry id in `sources` (local when empty).
    pub async fn entry_by_registry_id(
        &self,
        registry_id: &RegistryId,
        sources: BTreeSet<String>,
    ) -> FederationResult<Option<RegistryEntry>> {
        let query = self
            .registry_query()
            .registry_ids(std::slice::from_ref(registry_id))
            .build();
        let mut found = self.run_query(query, sources).await?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found.remove(0))),
            n => Err(FederationError::Conflict(format!(
                "{n} registry entries found for registry id {registry_id}"
            ))),
        }
    }

    /// Every registry entry held by one remote source.
    pub async fn query_source_entries(&self, source: &str) -> FederationResult<Vec<RegistryEntry>> {
        self.run_query(
            self.registry_query().build(),
            BTreeSet::from([source.to_string()]),
        )
        .await
    }

    // ── Identity node ────────────────────────────────────────────

    /// The entry describing this installation, if it exists.
    pub async fn identity_entry(&self) -> FederationResult<Option<RegistryEntry>> {
        let mut found = self
            .run_query(self.registry_query().identity().build(), no_destinations())
            .await?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found.remove(0))),
            n => Err(FederationError::Conflict(format!(
                "{n} identity entries found, expected at most one"
            ))),
        }
    }

    /// Returns the identity entry, creating it from `node` when missing.
    pub async fn ensure_identity_entry(&self, node: &NodeInfo) -> FederationResult<RegistryEntry> {
        if let Some(existing) = self.identity_entry().await? {
            return Ok(existing);
        }

        let registry_id = RegistryId::generate();
        let mut document = RegistryDocument::new(registry_id.as_str());
        document.object_type = Some(REGISTRY_NODE_OBJECT_TYPE.to_string());
        document.name = Some(node.name.clone());
        document.home = Some(node.home.clone());
        document.version = Some(node.version.clone());
        stamp_dates(&mut document);

        let mut entry = self.entry_from_document(&document)?;
        entry.identity_node = true;
        entry.local_node = true;
        let id = self.add_entry(entry.clone()).await?;
        entry.id = Some(id);
        info!("Created identity entry {} for node {}", registry_id, node.name);
        Ok(entry)
    }

    // ── Local entries ────────────────────────────────────────────

    fn entry_from_document(&self, document: &RegistryDocument) -> FederationResult<RegistryEntry> {
        let bytes = document
            .to_json()
            .map_err(|e| FederationError::Transform(e.to_string()))?;
        self.transform
            .document_to_entry(bytes.as_bytes())
            .map_err(FederationError::from_write)
    }

    /// Creates a locally-owned entry from an operator-supplied document.
    ///
    /// Assigns a registry id when the document has none, defaults home and
    /// object type, and stamps the live and last-updated dates.
    pub async fn create_local_entry(&self, mut document: RegistryDocument) -> FederationResult<EntryId> {
        if document.id.trim().is_empty() {
            document.id = RegistryId::generate().to_string();
        }
        if document.home.is_none() {
            document.home = Some(self.config.node.home.clone());
        }
        if document.object_type.is_none() {
            document.object_type = Some(REGISTRY_NODE_OBJECT_TYPE.to_string());
        }
        stamp_dates(&mut document);

        let mut entry = self.entry_from_document(&document)?;
        entry.local_node = true;
        self.add_entry(entry).await
    }

    /// Replaces a locally-owned entry from an operator-supplied document.
    pub async fn update_local_entry(&self, mut document: RegistryDocument) -> FederationResult<()> {
        let registry_id = RegistryId::new(document.id.clone())
            .map_err(|e| FederationError::Validation(e.to_string()))?;
        let existing = self
            .query_local_by_registry_ids(std::slice::from_ref(&registry_id))
            .await?;
        let stored = Self::exactly_one(&registry_id, existing)?;

        stamp_dates(&mut document);
        let mut entry = self.entry_from_document(&document)?;
        entry.id = stored.id;
        entry.created = stored.created;
        entry.local_node = true;
        entry.identity_node = stored.identity_node;
        self.update_entry(entry).await
    }

    // ── Publication ──────────────────────────────────────────────

    async fn local_entry(&self, registry_id: &RegistryId) -> FederationResult<RegistryEntry> {
        self.entry_by_registry_id(registry_id, no_destinations())
            .await?
            .ok_or_else(|| {
                FederationError::NotFound(format!("no registry entry with registry id {registry_id}"))
            })
    }

    /// Publishes the local entry to `destination`. Returns `false` when it
    /// was already published there.
    pub async fn publish(&self, registry_id: &RegistryId, destination: &str) -> FederationResult<bool> {
        let mut entry = self.local_entry(registry_id).await?;
        let mut locations = entry.published_to();
        if locations.contains(destination) {
            debug!("{} already published to {}", registry_id, destination);
            return Ok(false);
        }

        self.add_entry_to(entry.clone(), BTreeSet::from([destination.to_string()]))
            .await?;
        locations.insert(destination.to_string());
        entry.published_locations = Some(locations);
        entry.last_published = Some(entry.modified);
        self.update_entry(entry).await?;
        info!("Published {} to {}", registry_id, destination);
        Ok(true)
    }

    /// Removes the entry from `destination`. Returns `false` when it was not
    /// published there.
    pub async fn unpublish(&self, registry_id: &RegistryId, destination: &str) -> FederationResult<bool> {
        let mut entry = self.local_entry(registry_id).await?;
        let mut locations = entry.published_to();
        if !locations.contains(destination) {
            debug!("{} is not published to {}", registry_id, destination);
            return Ok(false);
        }

        self.delete_entries_by_registry_ids_to(
            std::slice::from_ref(registry_id),
            BTreeSet::from([destination.to_string()]),
        )
        .await?;
        locations.remove(destination);
        entry.published_locations = Some(locations);
        if let Err(e) = self.update_entry(entry).await {
            warn!("Unpublished {} from {} but failed to record it: {}", registry_id, destination, e);
            return Err(e);
        }
        info!("Unpublished {} from {}", registry_id, destination);
        Ok(true)
    }
}
