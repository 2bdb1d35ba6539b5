//! Service configuration derived from registry documents.

use async_trait::async_trait;
use fedreg_model::{DocumentError, RegistryEntry};
use fedreg_types::RegistryId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::FederationResult;

/// Binding slot naming the factory a configuration is created from.
pub const BINDING_TYPE_SLOT: &str = "bindingType";

/// Suffix of factory pids for configurations created from remote metadata.
/// They start disabled until an operator enables them.
pub const DISABLED_SUFFIX: &str = "_disabled";

/// One service configuration derived from a service binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    pub factory_pid: String,
    pub properties: BTreeMap<String, String>,
}

/// Derives a configuration for every binding that names a binding type.
///
/// Properties are the first value of each non-empty binding slot, plus the
/// configuration id and short name (the entry title, falling back to the
/// registry id), the registry id and the binding's access URI.
pub fn derive_configurations(entry: &RegistryEntry) -> Result<Vec<ServiceConfiguration>, DocumentError> {
    if entry.metadata.is_empty() {
        return Ok(Vec::new());
    }
    let document = entry.document()?;
    let registry_id = entry
        .registry_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| document.id.clone());
    let config_id = entry
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| registry_id.clone());

    let mut configurations = Vec::new();
    for binding in document.bindings() {
        let Some(binding_type) = binding.slot(BINDING_TYPE_SLOT).and_then(|s| s.first_value()) else {
            continue;
        };
        let mut properties: BTreeMap<String, String> = binding
            .slots
            .iter()
            .filter_map(|s| s.first_value().map(|v| (s.name.clone(), v.to_string())))
            .collect();
        properties.insert("id".into(), config_id.clone());
        properties.insert("shortname".into(), config_id.clone());
        properties.insert("registry-id".into(), registry_id.clone());
        if let Some(uri) = &binding.access_uri {
            properties.insert("accessUri".into(), uri.clone());
        }
        configurations.push(ServiceConfiguration {
            factory_pid: format!("{binding_type}{DISABLED_SUFFIX}"),
            properties,
        });
    }
    Ok(configurations)
}

/// Receives configurations derived from registry entries.
#[async_trait]
pub trait ConfigurationSink: Send + Sync {
    /// Replaces the configurations derived from `registry_id`.
    async fn apply(
        &self,
        registry_id: &RegistryId,
        configurations: Vec<ServiceConfiguration>,
    ) -> FederationResult<()>;

    /// Drops the configurations derived from `registry_id`.
    async fn remove(&self, _registry_id: &RegistryId) -> FederationResult<()> {
        Ok(())
    }
}

/// Sink that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl ConfigurationSink for LoggingSink {
    async fn apply(
        &self,
        registry_id: &RegistryId,
        configurations: Vec<ServiceConfiguration>,
    ) -> FederationResult<()> {
        for config in &configurations {
            info!("Configuration {} derived from {}", config.factory_pid, registry_id);
        }
        Ok(())
    }
}
