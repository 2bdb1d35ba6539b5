//! Node configuration file.

use anyhow::{Context, Result};
use fedreg_sync::FederationConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A peer node this node federates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Source id the peer's store is registered under.
    pub id: String,
    /// Base URL of the peer's HTTP API.
    pub url: String,
    /// Reconcile the peer's registry entries into the local store.
    #[serde(default = "enabled")]
    pub pull: bool,
    /// Allow publishing local entries to the peer.
    #[serde(default = "enabled")]
    pub push: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen_port: u16,
    pub db_path: PathBuf,
    /// Source id of the local store.
    pub local_source_id: String,
    /// Request timeout for calls to peers, in milliseconds.
    pub remote_timeout_ms: u64,
    pub federation: FederationConfig,
    pub remotes: Vec<RemoteConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 8993,
            db_path: PathBuf::from("fedreg.db"),
            local_source_id: "local".to_string(),
            remote_timeout_ms: 10_000,
            federation: FederationConfig::default(),
            remotes: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Invalid node configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Peers that may be published to.
    pub fn push_targets(&self) -> BTreeSet<String> {
        self.remotes
            .iter()
            .filter(|r| r.push)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Peers whose registries are pulled.
    pub fn pull_sources(&self) -> Vec<String> {
        self.remotes
            .iter()
            .filter(|r| r.pull)
            .map(|r| r.id.clone())
            .collect()
    }
}
