//! Shared test helpers for federation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fedreg_model::{RegistryDocument, RegistryEntry, Service, ServiceBinding, Slot};
use fedreg_store::mock::MockStore;
use fedreg_store::{Catalog, JsonSchemaTransform};
use fedreg_sync::{
    ConfigurationSink, FederationConfig, FederationEngine, FederationResult, IdentityGuard,
    ServiceConfiguration,
};
use fedreg_types::RegistryId;
use std::sync::{Arc, Mutex};

/// Sink recording every call.
#[derive(Default)]
pub struct RecordingSink {
    pub applied: Mutex<Vec<(RegistryId, Vec<ServiceConfiguration>)>>,
    pub removed: Mutex<Vec<RegistryId>>,
}

#[async_trait]
impl ConfigurationSink for RecordingSink {
    async fn apply(
        &self,
        registry_id: &RegistryId,
        configurations: Vec<ServiceConfiguration>,
    ) -> FederationResult<()> {
        self.applied
            .lock()
            .unwrap()
            .push((registry_id.clone(), configurations));
        Ok(())
    }

    async fn remove(&self, registry_id: &RegistryId) -> FederationResult<()> {
        self.removed.lock().unwrap().push(registry_id.clone());
        Ok(())
    }
}

pub struct Harness {
    pub local: Arc<MockStore>,
    pub catalog: Arc<Catalog>,
    pub guard: Arc<IdentityGuard>,
    pub sink: Arc<RecordingSink>,
    pub engine: Arc<FederationEngine>,
}

impl Harness {
    /// Registers a mock remote store under `id`.
    pub async fn remote(&self, id: &str) -> Arc<MockStore> {
        let store = Arc::new(MockStore::new(id));
        self.catalog.register_store(store.clone()).await;
        store
    }
}

pub fn test_config() -> FederationConfig {
    FederationConfig {
        source_query_timeout_ms: 200,
        publish_attempts: 2,
        publish_retry_backoff_ms: 1,
        shutdown_grace_ms: 200,
        ..Default::default()
    }
}

pub async fn make_harness() -> Harness {
    make_harness_with(test_config()).await
}

pub async fn make_harness_with(config: FederationConfig) -> Harness {
    let local = Arc::new(MockStore::new("local"));
    let catalog = Arc::new(Catalog::new(local.clone()));
    let sink = Arc::new(RecordingSink::default());
    let guard = Arc::new(IdentityGuard::new(sink.clone()));
    guard.initialize(&*catalog, config.page_size).await.unwrap();
    catalog.add_plugin(guard.clone()).await;
    let engine = Arc::new(FederationEngine::new(
        catalog.clone(),
        Arc::new(JsonSchemaTransform),
        config,
    ));
    Harness {
        local,
        catalog,
        guard,
        sink,
        engine,
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Registry entry with a document, modified `offset` seconds after the base time.
pub fn entry_at(registry_id: &str, offset: i64) -> RegistryEntry {
    let registry_id = RegistryId::new(registry_id).unwrap();
    let mut entry = RegistryEntry::new(registry_id.clone(), format!("node {registry_id}"));
    entry.created = base_time();
    entry.modified = base_time() + Duration::seconds(offset);
    let mut document = RegistryDocument::new(registry_id.as_str());
    document.name = entry.title.clone();
    entry.set_document(&document).unwrap();
    entry
}

pub fn make_entry(registry_id: &str) -> RegistryEntry {
    entry_at(registry_id, 0)
}

/// Entry whose document carries one service binding of `binding_type`.
pub fn entry_with_binding(registry_id: &str, binding_type: &str) -> RegistryEntry {
    let mut entry = make_entry(registry_id);
    let mut document = entry.document().unwrap();
    document.services.push(Service {
        id: format!("{registry_id}-svc"),
        bindings: vec![ServiceBinding {
            id: format!("{registry_id}-binding"),
            access_uri: Some("https://peer:8993/services/csw".into()),
            slots: vec![
                Slot::new("bindingType", vec![binding_type.to_string()]),
                Slot::new("cswUrl", vec!["https://peer:8993/services/csw".into()]),
                Slot::new("empty", vec![]),
            ],
            ..Default::default()
        }],
        ..Default::default()
    });
    entry.set_document(&document).unwrap();
    entry
}

pub fn rid(s: &str) -> RegistryId {
    RegistryId::new(s).unwrap()
}
