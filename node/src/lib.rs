//! Federated registry node: configuration, assembly and HTTP API.

mod api;
mod config;
mod node;

pub use api::{
    build_router, ApiError, ApiErrorBody, AppState, DeletedEntries, LocalEntryCreated,
    PublicationChange,
};
pub use config::{NodeConfig, RemoteConfig};
pub use node::Node;
