//! HTTP client for a peer node's store endpoints, and the wire bodies both
//! sides share.

use async_trait::async_trait;
use fedreg_model::RegistryEntry;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::filter::{Query, QueryResponse};
use crate::ingest::{CreateResponse, DeleteResponse, EntryUpdate, IdField, UpdateResponse};
use crate::store::RecordStore;

/// Path prefix of the store endpoints on a node.
pub const STORE_API_PREFIX: &str = "/api/v1/store";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBody {
    pub entries: Vec<RegistryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBody {
    pub id_field: IdField,
    pub updates: Vec<(String, RegistryEntry)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteBody {
    pub id_field: IdField,
    pub ids: Vec<String>,
}

/// Error classes carried over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Ingest,
    Query,
    Unavailable,
    UnknownSource,
    Duplicate,
    Conflict,
    Transform,
    Unauthorized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StoreError> for ErrorBody {
    fn from(err: &StoreError) -> Self {
        let kind = match err {
            StoreError::Ingest(_) | StoreError::Database(_) | StoreError::Serialization(_) => {
                ErrorKind::Ingest
            }
            StoreError::Query(_) => ErrorKind::Query,
            StoreError::Unavailable(_) => ErrorKind::Unavailable,
            StoreError::UnknownSource(_) => ErrorKind::UnknownSource,
            StoreError::Duplicate(_) => ErrorKind::Duplicate,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Transform(_) => ErrorKind::Transform,
            StoreError::Unauthorized => ErrorKind::Unauthorized,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<ErrorBody> for StoreError {
    fn from(body: ErrorBody) -> Self {
        let m = body.message;
        match body.kind {
            ErrorKind::Ingest => StoreError::Ingest(m),
            ErrorKind::Query => StoreError::Query(m),
            ErrorKind::Unavailable => StoreError::Unavailable(m),
            ErrorKind::UnknownSource => StoreError::UnknownSource(m),
            ErrorKind::Duplicate => StoreError::Duplicate(m),
            ErrorKind::Conflict => StoreError::Conflict(m),
            ErrorKind::Transform => StoreError::Transform(m),
            ErrorKind::Unauthorized => StoreError::Unauthorized,
        }
    }
}

/// Record store living on another node, reached over HTTP.
pub struct RemoteRecordStore {
    id: String,
    base_url: String,
    client: Client,
}

impl RemoteRecordStore {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, op: &str, body: &B, on_error: fn(String) -> StoreError) -> StoreResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}/{}", self.base_url, STORE_API_PREFIX, op);
        debug!("[{}] POST {}", self.id, url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{} {op} request failed: {e}", self.id)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => body.into(),
                Err(_) => on_error(format!("{} {op} failed with {status}: {text}", self.id)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| on_error(format!("failed to parse {op} response from {}: {e}", self.id)))
    }
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create(&self, entries: Vec<RegistryEntry>) -> StoreResult<Vec<RegistryEntry>> {
        let response: CreateResponse = self
            .post("create", &CreateBody { entries }, StoreError::Ingest)
            .await?;
        Ok(response.created)
    }

    async fn update(
        &self,
        id_field: IdField,
        updates: Vec<(String, RegistryEntry)>,
    ) -> StoreResult<Vec<EntryUpdate>> {
        let response: UpdateResponse = self
            .post("update", &UpdateBody { id_field, updates }, StoreError::Ingest)
            .await?;
        Ok(response.updated)
    }

    async fn delete(&self, id_field: IdField, ids: Vec<String>) -> StoreResult<Vec<RegistryEntry>> {
        let response: DeleteResponse = self
            .post("delete", &DeleteBody { id_field, ids }, StoreError::Ingest)
            .await?;
        Ok(response.deleted)
    }

    async fn query(&self, query: Query) -> StoreResult<QueryResponse> {
        let mut response: QueryResponse = self.post("query", &query, StoreError::Query).await?;
        for entry in &mut response.results {
            entry.source_id = Some(self.id.clone());
        }
        Ok(response)
    }
}
