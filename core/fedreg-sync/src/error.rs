//! Error types for the federation layer.

use fedreg_store::StoreError;
use thiserror::Error;

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Errors surfaced by federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The input is missing something every registry entry must have.
    #[error("validation error: {0}")]
    Validation(String),

    /// No stored entry matched.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lookup matched more entries than allowed, or required state was missing.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The registry id is already in use.
    #[error("duplicate registry entry: {0}")]
    Duplicate(String),

    /// A store rejected a write or could not be reached while writing.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// A store failed to answer a query.
    #[error("query error: {0}")]
    Query(String),

    /// A registry document could not be converted.
    #[error("transform error: {0}")]
    Transform(String),
}

impl FederationError {
    /// Maps a store error raised on a write path.
    pub(crate) fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(m) => Self::Duplicate(m),
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::Transform(m) => Self::Transform(m),
            other => Self::Ingest(other.to_string()),
        }
    }

    /// Maps a store error raised on a read path.
    pub(crate) fn from_read(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::Transform(m) => Self::Transform(m),
            other => Self::Query(other.to_string()),
        }
    }
}
