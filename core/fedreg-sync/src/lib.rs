//! Federation sync engine for the federated registry.
//!
//! Keeps a local catalog of registry entries consistent with a set of
//! loosely-coupled remote registries.
//!
//! ## Components
//!
//! - **Engine**: create/update/delete/query protocol with the transient-field
//!   merge, identity bootstrap and single-destination publish/unpublish
//! - **Identity guard**: ingest plugin rejecting duplicate registry ids,
//!   stamping identifier annotations and dropping stale updates
//! - **Reconciler**: pulls subscribed sources and merges them last-writer-wins,
//!   never touching locally-owned entries
//! - **Publication**: worker pool pushing entries to the destinations they
//!   should be published to
//!
//! # Example
//!
//! ```
//! use fedreg_sync::FederationConfig;
//!
//! let config = FederationConfig::from_toml_str("page_size = 50").unwrap();
//! assert_eq!(config.page_size, 50);
//! assert_eq!(config.worker_pool_size, 1);
//! ```

mod config;
mod engine;
mod error;
pub mod identity;
mod pool;
pub mod publication;
mod query;
pub mod reconcile;
pub mod service_config;

pub use config::{FederationConfig, NodeInfo};
pub use engine::FederationEngine;
pub use error::{FederationError, FederationResult};
pub use identity::{annotate_identifiers, ActiveRegistryIds, IdentityGuard};
pub use pool::PublicationPool;
pub use publication::{PublicationOutcome, PublicationReconciler};
pub use query::RegistryQuery;
pub use reconcile::{collapse_latest, ReconciliationReport, Reconciler};
pub use service_config::{
    derive_configurations, ConfigurationSink, LoggingSink, ServiceConfiguration,
    BINDING_TYPE_SLOT, DISABLED_SUFFIX,
};
