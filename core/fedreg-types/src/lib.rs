//! Core type definitions for the federated registry.
//!
//! This crate defines the identifiers shared by every other crate:
//! - Store-assigned entry identifiers (UUID v7)
//! - Globally unique registry identifiers (`urn:uuid:` form)
//! - The closed set of change kinds carried by write notifications

mod change;
mod ids;

pub use change::ChangeKind;
pub use ids::{EntryId, RegistryId, REGISTRY_ID_PREFIX};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid registry id: {0}")]
    InvalidRegistryId(String),
}
