//! Record store gateway for the federated registry.
//!
//! - [`RecordStore`]: one catalog of registry entries (SQLite, remote HTTP, mock)
//! - [`Catalog`]: the [`RecordGateway`] routing requests between the local
//!   store and named remote stores, running [`IngestPlugin`]s around local
//!   writes and emitting [`ChangeNotification`]s
//! - [`Filter`] / [`Query`]: attribute filters with sorting and paging
//! - [`SchemaTransform`]: wire document marshalling

mod catalog;
mod error;
mod filter;
mod ingest;
pub mod mock;
mod plugin;
pub mod remote;
mod sqlite;
mod store;
mod transform;

pub use catalog::{Catalog, RecordGateway};
pub use error::{StoreError, StoreResult};
pub use filter::{wildcard_match, Field, Filter, Query, QueryResponse, Sort, SortOrder};
pub use ingest::{
    ChangeNotification, CreateRequest, CreateResponse, DeleteRequest, DeleteResponse,
    EntryUpdate, IdField, IngestContext, QueryRequest, Subject, UpdateRequest, UpdateResponse,
};
pub use plugin::IngestPlugin;
pub use remote::RemoteRecordStore;
pub use sqlite::SqliteRecordStore;
pub use store::RecordStore;
pub use transform::{JsonSchemaTransform, SchemaTransform};
