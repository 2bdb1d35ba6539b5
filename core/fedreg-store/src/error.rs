//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A store rejected a write.
    #[error("ingest error: {0}")]
    Ingest(String),

    /// A store failed to answer a query.
    #[error("query error: {0}")]
    Query(String),

    /// A store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No store is registered under the given id.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// A record with the same identity already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A lookup that must be unambiguous was not, or required state was missing.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A document could not be converted.
    #[error("transform error: {0}")]
    Transform(String),

    /// A write arrived without a security subject.
    #[error("write rejected: no security subject attached")]
    Unauthorized,

    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
