//! Federation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Description of this installation, used when bootstrapping its identity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    /// Node name, also the identity entry's title.
    pub name: String,
    /// Base URL peers reach this node at.
    pub home: String,
    pub version: String,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            name: "fedreg-node".to_string(),
            home: "https://localhost:8993".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration for the federation engine, reconciler and publication pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub node: NodeInfo,
    /// Page size bound on every registry query.
    pub page_size: usize,
    /// Workers draining change notifications for publication.
    pub worker_pool_size: usize,
    /// Per-source timeout for reconciliation queries, in milliseconds.
    pub source_query_timeout_ms: u64,
    /// Interval between reconciliation cycles, in seconds.
    pub refresh_interval_secs: u64,
    /// Time in-flight publication work gets to finish on shutdown, in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Attempts per destination before the existence check.
    pub publish_attempts: u32,
    pub publish_retry_backoff_ms: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            node: NodeInfo::default(),
            page_size: 1000,
            worker_pool_size: 1,
            source_query_timeout_ms: 30_000,
            refresh_interval_secs: 30,
            shutdown_grace_ms: 5_000,
            publish_attempts: 3,
            publish_retry_backoff_ms: 500,
        }
    }
}

impl FederationConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn source_query_timeout(&self) -> Duration {
        Duration::from_millis(self.source_query_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn publish_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_retry_backoff_ms)
    }
}
