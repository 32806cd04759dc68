//! HTTP surface.
//!
//! Thin axum handlers over the blocking engine. Each request opens its own
//! store connection inside `spawn_blocking`, so connection release is tied
//! to scope exit on every path. Only unknown tables and missing upsert
//! targets surface as HTTP errors; retrieval anomalies degrade inside the
//! orchestrator and still produce 200.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::Query as MultiQuery;
use serde::Deserialize;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use record_store::SqliteStore;

use crate::error::ServiceError;
use crate::hybrid;
use crate::registry::IndexRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<IndexRegistry>,
    pub database_path: Arc<PathBuf>,
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/indexes/reindex", post(reindex_all))
        .route("/indexes/omnisearch", get(omnisearch))
        .route("/indexes/:table", get(search_table).post(upsert_record))
        .route("/indexes/:table/reindex", post(reindex_table))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Binds and serves until shutdown.
pub async fn serve(
    state: AppState,
    listen: &str,
    request_timeout: Duration,
) -> std::io::Result<()> {
    let app = router(state, request_timeout);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("listening on {listen}");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn default_top() -> usize {
    50
}

fn default_omni_top() -> usize {
    25
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default = "default_top")]
    top: usize,
    #[serde(default)]
    filters: String,
}

async fn search_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let results = run_blocking(move || {
        let store = SqliteStore::open_existing(&state.database_path)?;
        hybrid::search(
            &state.registry,
            &store,
            &table,
            &params.query,
            params.top,
            &params.filters,
        )
    })
    .await?;
    Ok(Json(json!({ "results": results })))
}

#[derive(Debug, Deserialize)]
struct UpsertParams {
    item_id: i64,
}

async fn upsert_record(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<UpsertParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_blocking(move || {
        let store = SqliteStore::open_existing(&state.database_path)?;
        state.registry.upsert_record(&store, &table, params.item_id)
    })
    .await?;
    Ok(Json(json!({ "message": "Item added/updated successfully." })))
}

async fn reindex_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = run_blocking(move || {
        let store = SqliteStore::open_existing(&state.database_path)?;
        state.registry.rebuild(&store, &table)?;
        Ok(format!("{table} reindexed successfully."))
    })
    .await?;
    Ok(Json(json!({ "message": message })))
}

async fn reindex_all(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run_blocking(move || {
        let store = SqliteStore::open_existing(&state.database_path)?;
        state.registry.rebuild_all(&store)
    })
    .await?;
    Ok(Json(json!({ "message": "All tables reindexed successfully." })))
}

#[derive(Debug, Deserialize)]
struct OmniParams {
    #[serde(default)]
    query: String,
    #[serde(default = "default_omni_top")]
    top: usize,
    /// Repeatable: `tables=items&tables=users`. Empty means every
    /// configured table.
    #[serde(default)]
    tables: Vec<String>,
    #[serde(default)]
    filters: String,
}

/// Fans the same search out over several tables; each table reports its
/// own result or error object.
async fn omnisearch(
    State(state): State<AppState>,
    MultiQuery(params): MultiQuery<OmniParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let out = run_blocking(move || {
        let store = SqliteStore::open_existing(&state.database_path)?;
        let tables = if params.tables.is_empty() {
            state
                .registry
                .schemas()
                .names()
                .map(str::to_string)
                .collect()
        } else {
            params.tables.clone()
        };

        let mut out: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        for table in tables {
            let entry = match hybrid::search(
                &state.registry,
                &store,
                &table,
                &params.query,
                params.top,
                &params.filters,
            ) {
                Ok(results) => json!({ "results": results }),
                Err(err) => json!({
                    "error": err.to_string(),
                    "status_code": status_for(&err).as_u16(),
                }),
            };
            out.insert(table, entry);
        }
        Ok(out)
    })
    .await?;
    Ok(Json(json!(out)))
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(ServiceError::Internal(format!("blocking task failed: {e}"))))?
        .map_err(ApiError)
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::TableNotFound(_) | ServiceError::RecordNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}
