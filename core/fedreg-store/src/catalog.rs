//! The record gateway: routes requests to stores and runs ingest plugins.

use async_trait::async_trait;
use fedreg_model::RegistryEntry;
use fedreg_types::{ChangeKind, EntryId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::filter::{Field, Filter, Query, QueryResponse};
use crate::ingest::{
    ChangeNotification, CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, IdField,
    IngestContext, QueryRequest, UpdateRequest, UpdateResponse,
};
use crate::plugin::IngestPlugin;
use crate::store::RecordStore;

const PREVIOUS_STATE_PAGE_SIZE: usize = 1000;

/// Entry point for every read and write the federation layer performs.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn create(&self, request: CreateRequest) -> StoreResult<CreateResponse>;

    async fn update(&self, request: UpdateRequest) -> StoreResult<UpdateResponse>;

    async fn delete(&self, request: DeleteRequest) -> StoreResult<DeleteResponse>;

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryResponse>;
}

/// Gateway over one local store and any number of named remote stores.
///
/// Requests with destinations (or sources) go straight to those stores.
/// Local requests run through the registered [`IngestPlugin`]s and emit a
/// [`ChangeNotification`] per committed record.
pub struct Catalog {
    local: Arc<dyn RecordStore>,
    remotes: RwLock<HashMap<String, Arc<dyn RecordStore>>>,
    plugins: RwLock<Vec<Arc<dyn IngestPlugin>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeNotification>>>,
}

impl Catalog {
    pub fn new(local: Arc<dyn RecordStore>) -> Self {
        Self {
            local,
            remotes: RwLock::new(HashMap::new()),
            plugins: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    // ── Registration ─────────────────────────────────────────────

    /// Registers a remote store under its own id, replacing any previous one.
    pub async fn register_store(&self, store: Arc<dyn RecordStore>) {
        let id = store.id().to_string();
        debug!("Registering store {}", id);
        self.remotes.write().await.insert(id, store);
    }

    pub async fn unregister_store(&self, id: &str) -> bool {
        self.remotes.write().await.remove(id).is_some()
    }

    /// Ids of the registered remote stores, sorted.
    pub async fn store_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.remotes.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn add_plugin(&self, plugin: Arc<dyn IngestPlugin>) {
        self.plugins.write().await.push(plugin);
    }

    /// Returns a receiver of change notifications for local writes.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(tx);
        rx
    }

    // ── Internals ────────────────────────────────────────────────

    async fn store(&self, id: &str) -> StoreResult<Arc<dyn RecordStore>> {
        if id == self.local.id() {
            return Ok(Arc::clone(&self.local));
        }
        self.remotes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSource(id.to_string()))
    }

    async fn plugins(&self) -> Vec<Arc<dyn IngestPlugin>> {
        self.plugins.read().await.clone()
    }

    async fn notify(&self, notifications: Vec<ChangeNotification>) {
        if notifications.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| {
            notifications
                .iter()
                .all(|n| tx.send(n.clone()).is_ok())
        });
    }

    /// Looks up the stored state of the records an update targets.
    async fn previous_state(
        &self,
        id_field: IdField,
        keys: &[String],
    ) -> StoreResult<Vec<RegistryEntry>> {
        let field = match id_field {
            IdField::Id => Field::Id,
            IdField::RegistryId => Field::RegistryId,
        };
        let filter = Filter::or(keys.iter().map(|k| Filter::equals(field, k.clone())).collect());
        let response = self
            .local
            .query(Query::new(filter, PREVIOUS_STATE_PAGE_SIZE))
            .await?;
        Ok(response.results)
    }

    /// Tells each plugin which of the entries it accepted did not end up in
    /// `committed`.
    async fn abort_create(
        accepted: &[(Arc<dyn IngestPlugin>, Vec<RegistryEntry>)],
        committed: &[RegistryEntry],
        context: &IngestContext,
    ) {
        let committed: HashSet<EntryId> = committed.iter().filter_map(|e| e.id).collect();
        for (plugin, entries) in accepted {
            let dropped: Vec<RegistryEntry> = entries
                .iter()
                .filter(|e| e.id.is_none_or(|id| !committed.contains(&id)))
                .cloned()
                .collect();
            if !dropped.is_empty() {
                debug!("{} accepted {} uncommitted create(s)", plugin.name(), dropped.len());
                plugin.create_aborted(&dropped, context).await;
            }
        }
    }

    fn check_subject(context: &IngestContext) -> StoreResult<()> {
        if context.subject.is_none() {
            return Err(StoreError::Unauthorized);
        }
        Ok(())
    }

    async fn create_remote(
        &self,
        entries: &[RegistryEntry],
        destinations: &BTreeSet<String>,
    ) -> StoreResult<CreateResponse> {
        let mut created = Vec::new();
        for destination in destinations {
            let store = self.store(destination).await?;
            let copies = entries.iter().map(RegistryEntry::detached).collect();
            created.extend(store.create(copies).await?);
        }
        Ok(CreateResponse { created })
    }
}

#[async_trait]
impl RecordGateway for Catalog {
    async fn create(&self, request: CreateRequest) -> StoreResult<CreateResponse> {
        Self::check_subject(&request.context)?;
        if !request.is_local() {
            return self
                .create_remote(&request.entries, &request.destinations)
                .await;
        }

        let mut context = request.context;
        context.operation = Some(ChangeKind::Created);
        let mut entries = request.entries;
        for entry in &mut entries {
            if entry.id.is_none() {
                entry.id = Some(EntryId::new());
            }
        }

        let plugins = self.plugins().await;
        let mut accepted = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            match plugin.pre_create(entries, &context).await {
                Ok(kept) => {
                    accepted.push((Arc::clone(plugin), kept.clone()));
                    entries = kept;
                }
                Err(e) => {
                    Self::abort_create(&accepted, &[], &context).await;
                    return Err(e);
                }
            }
        }
        if entries.is_empty() {
            Self::abort_create(&accepted, &[], &context).await;
            return Ok(CreateResponse::default());
        }

        let created = match self.local.create(entries).await {
            Ok(created) => created,
            Err(e) => {
                Self::abort_create(&accepted, &[], &context).await;
                return Err(e);
            }
        };
        Self::abort_create(&accepted, &created, &context).await;
        for plugin in &plugins {
            if let Err(e) = plugin.post_create(&created, &context).await {
                warn!("Post-create hook {} failed: {}", plugin.name(), e);
            }
        }
        self.notify(
            created
                .iter()
                .map(|entry| ChangeNotification {
                    kind: ChangeKind::Created,
                    entry: entry.clone(),
                    previous: None,
                })
                .collect(),
        )
        .await;
        Ok(CreateResponse { created })
    }

    async fn update(&self, request: UpdateRequest) -> StoreResult<UpdateResponse> {
        Self::check_subject(&request.context)?;
        if !request.is_local() {
            let mut updated = Vec::new();
            for destination in &request.destinations {
                let store = self.store(destination).await?;
                let copies = request
                    .updates
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.detached()))
                    .collect();
                updated.extend(store.update(request.id_field, copies).await?);
            }
            return Ok(UpdateResponse { updated });
        }

        let mut context = request.context;
        context.operation = Some(ChangeKind::Updated);
        let keys: Vec<String> = request.updates.iter().map(|(k, _)| k.clone()).collect();
        context.previous = match self.previous_state(request.id_field, &keys).await {
            Ok(previous) => Some(previous),
            Err(e) => {
                warn!("Previous-state lookup failed for {:?}: {}", keys, e);
                None
            }
        };

        let mut updates = request.updates;
        if let Some(previous) = &context.previous {
            for (key, entry) in &mut updates {
                let matches: Vec<&RegistryEntry> = previous
                    .iter()
                    .filter(|p| request.id_field.value_of(p).as_deref() == Some(key.as_str()))
                    .collect();
                if let [stored] = matches.as_slice() {
                    entry.id = stored.id;
                }
            }
        }

        let plugins = self.plugins().await;
        for plugin in &plugins {
            updates = plugin.pre_update(updates, &context).await?;
        }
        if updates.is_empty() {
            debug!("All updates dropped by ingest plugins");
            return Ok(UpdateResponse::default());
        }

        let updated = self.local.update(request.id_field, updates).await?;
        for plugin in &plugins {
            if let Err(e) = plugin.post_update(&updated, &context).await {
                warn!("Post-update hook {} failed: {}", plugin.name(), e);
            }
        }
        self.notify(
            updated
                .iter()
                .map(|u| ChangeNotification {
                    kind: ChangeKind::Updated,
                    entry: u.new.clone(),
                    previous: Some(u.old.clone()),
                })
                .collect(),
        )
        .await;
        Ok(UpdateResponse { updated })
    }

    async fn delete(&self, request: DeleteRequest) -> StoreResult<DeleteResponse> {
        Self::check_subject(&request.context)?;
        if !request.is_local() {
            let mut deleted = Vec::new();
            for destination in &request.destinations {
                let store = self.store(destination).await?;
                deleted.extend(store.delete(request.id_field, request.ids.clone()).await?);
            }
            return Ok(DeleteResponse { deleted });
        }

        let mut context = request.context;
        context.operation = Some(ChangeKind::Deleted);
        let deleted = self.local.delete(request.id_field, request.ids).await?;
        for plugin in self.plugins().await {
            if let Err(e) = plugin.post_delete(&deleted, &context).await {
                warn!("Post-delete hook {} failed: {}", plugin.name(), e);
            }
        }
        self.notify(
            deleted
                .iter()
                .map(|entry| ChangeNotification {
                    kind: ChangeKind::Deleted,
                    entry: entry.clone(),
                    previous: None,
                })
                .collect(),
        )
        .await;
        Ok(DeleteResponse { deleted })
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<QueryResponse> {
        if request.sources.is_empty() {
            return self.local.query(request.query).await;
        }
        let mut merged = QueryResponse::default();
        for source in &request.sources {
            let store = self.store(source).await?;
            let response = store.query(request.query.clone()).await?;
            merged.hits += response.hits;
            merged.results.extend(response.results);
        }
        Ok(merged)
    }
}
