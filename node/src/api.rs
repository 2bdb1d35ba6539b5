//! HTTP API: registry administration and the store endpoints peers call.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use fedreg_model::{RegistryDocument, RegistryEntry};
use fedreg_store::remote::{CreateBody, DeleteBody, ErrorBody, UpdateBody};
use fedreg_store::{
    Catalog, CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, IngestContext, Query,
    QueryRequest, QueryResponse, RecordGateway, StoreError, UpdateRequest, UpdateResponse,
};
use fedreg_sync::{
    FederationEngine, FederationError, PublicationOutcome, PublicationReconciler,
    ReconciliationReport, Reconciler,
};
use fedreg_types::{EntryId, RegistryId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FederationEngine>,
    pub catalog: Arc<Catalog>,
    pub reconciler: Arc<Reconciler>,
    pub publisher: Arc<PublicationReconciler>,
    /// Destinations local entries may be published to.
    pub push_targets: Arc<BTreeSet<String>>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error("invalid registry id: {0}")]
    BadRegistryId(String),

    #[error("publishing to {0} is not allowed")]
    PushNotAllowed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Response of the publish and unpublish endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationChange {
    /// `false` when the entry was already in the requested state.
    pub changed: bool,
}

/// Response of the local entry create endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntryCreated {
    /// Store id of the new record.
    pub id: EntryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEntries {
    pub deleted: usize,
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Duplicate(_) | StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Unauthorized => StatusCode::UNAUTHORIZED,
        StoreError::Transform(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::UnknownSource(_) => StatusCode::NOT_FOUND,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn federation_status(err: &FederationError) -> StatusCode {
    match err {
        FederationError::Validation(_) => StatusCode::BAD_REQUEST,
        FederationError::NotFound(_) => StatusCode::NOT_FOUND,
        FederationError::Conflict(_) | FederationError::Duplicate(_) => StatusCode::CONFLICT,
        FederationError::Transform(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FederationError::Ingest(_) | FederationError::Query(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Store endpoints answer with the body `RemoteRecordStore` decodes.
        if let ApiError::Store(err) = &self {
            let status = store_status(err);
            if status.is_server_error() {
                error!("Store request failed: {}", err);
            }
            return (status, Json(ErrorBody::from(err))).into_response();
        }
        let status = match &self {
            ApiError::Federation(err) => federation_status(err),
            ApiError::BadRegistryId(_) => StatusCode::BAD_REQUEST,
            ApiError::PushNotAllowed(_) => StatusCode::FORBIDDEN,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        let body = ApiErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_registry_id(raw: String) -> Result<RegistryId, ApiError> {
    RegistryId::new(raw.clone()).map_err(|_| ApiError::BadRegistryId(raw))
}

// ── Registry ─────────────────────────────────────────────────────

async fn identity_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(match state.engine.identity_entry().await? {
        Some(entry) => Json(entry).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiErrorBody {
                error: "identity entry not created yet".into(),
            }),
        )
            .into_response(),
    })
}

async fn list_handler(State(state): State<AppState>) -> ApiResult<Vec<RegistryEntry>> {
    Ok(Json(state.engine.query_entries().await?))
}

// ── Local entries ────────────────────────────────────────────────

async fn list_local_handler(State(state): State<AppState>) -> ApiResult<Vec<RegistryEntry>> {
    Ok(Json(state.engine.query_local_entries().await?))
}

async fn create_local_handler(
    State(state): State<AppState>,
    Json(document): Json<RegistryDocument>,
) -> Result<(StatusCode, Json<LocalEntryCreated>), ApiError> {
    let id = state.engine.create_local_entry(document).await?;
    Ok((StatusCode::CREATED, Json(LocalEntryCreated { id })))
}

async fn update_local_handler(
    State(state): State<AppState>,
    Json(document): Json<RegistryDocument>,
) -> Result<StatusCode, ApiError> {
    state.engine.update_local_entry(document).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_local_handler(
    State(state): State<AppState>,
    Json(registry_ids): Json<Vec<String>>,
) -> ApiResult<DeletedEntries> {
    let registry_ids = registry_ids
        .into_iter()
        .map(parse_registry_id)
        .collect::<Result<Vec<_>, _>>()?;
    let deleted = state.engine.delete_local_entries(&registry_ids).await?;
    Ok(Json(DeletedEntries { deleted }))
}

async fn publish_handler(
    State(state): State<AppState>,
    Path((registry_id, destination)): Path<(String, String)>,
) -> ApiResult<PublicationChange> {
    let registry_id = parse_registry_id(registry_id)?;
    if !state.push_targets.contains(&destination) {
        return Err(ApiError::PushNotAllowed(destination));
    }
    let changed = state.engine.publish(&registry_id, &destination).await?;
    Ok(Json(PublicationChange { changed }))
}

async fn unpublish_handler(
    State(state): State<AppState>,
    Path((registry_id, destination)): Path<(String, String)>,
) -> ApiResult<PublicationChange> {
    let registry_id = parse_registry_id(registry_id)?;
    let changed = state.engine.unpublish(&registry_id, &destination).await?;
    Ok(Json(PublicationChange { changed }))
}

async fn publications_handler(
    State(state): State<AppState>,
    Path(registry_id): Path<String>,
    Json(destinations): Json<BTreeSet<String>>,
) -> ApiResult<PublicationOutcome> {
    let registry_id = parse_registry_id(registry_id)?;
    if let Some(denied) = destinations.iter().find(|d| !state.push_targets.contains(*d)) {
        return Err(ApiError::PushNotAllowed(denied.clone()));
    }
    let outcome = state
        .publisher
        .update_publications(&registry_id, destinations)
        .await?;
    Ok(Json(outcome))
}

async fn refresh_handler(State(state): State<AppState>) -> Json<ReconciliationReport> {
    Json(state.reconciler.refresh().await)
}

// ── Store ────────────────────────────────────────────────────────

async fn store_query(
    State(state): State<AppState>,
    Json(query): Json<Query>,
) -> ApiResult<QueryResponse> {
    Ok(Json(state.catalog.query(QueryRequest::local(query)).await?))
}

async fn store_create(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> ApiResult<CreateResponse> {
    let request = CreateRequest::new(body.entries, IngestContext::system());
    Ok(Json(state.catalog.create(request).await?))
}

async fn store_update(
    State(state): State<AppState>,
    Json(body): Json<UpdateBody>,
) -> ApiResult<UpdateResponse> {
    let request = UpdateRequest::new(body.id_field, body.updates, IngestContext::system());
    Ok(Json(state.catalog.update(request).await?))
}

async fn store_delete(
    State(state): State<AppState>,
    Json(body): Json<DeleteBody>,
) -> ApiResult<DeleteResponse> {
    let request = DeleteRequest::new(body.id_field, body.ids, IngestContext::system());
    Ok(Json(state.catalog.delete(request).await?))
}

/// Build the HTTP API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/identity", get(identity_handler))
        .route("/api/v1/registry", get(list_handler))
        .route("/api/v1/registry/refresh", post(refresh_handler))
        .route(
            "/api/v1/registry/local",
            get(list_local_handler)
                .post(create_local_handler)
                .put(update_local_handler)
                .delete(delete_local_handler),
        )
        .route(
            "/api/v1/registry/{registry_id}/publication/{destination}",
            post(publish_handler).delete(unpublish_handler),
        )
        .route(
            "/api/v1/registry/{registry_id}/publications",
            put(publications_handler),
        )
        .route("/api/v1/store/query", post(store_query))
        .route("/api/v1/store/create", post(store_create))
        .route("/api/v1/store/update", post(store_update))
        .route("/api/v1/store/delete", post(store_delete))
        .with_state(state)
}
