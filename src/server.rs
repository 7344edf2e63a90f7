//! HTTP API server.
//!
//! Exposes the registry mirror over JSON HTTP:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | API information |
//! | `GET`  | `/search` | Hybrid search (`q`, `limit`, `full_text_weight`, `semantic_weight`) |
//! | `GET`  | `/servers` | Paginated catalog listing (`limit`, `offset`) |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/cron/etl` | Scheduler-triggered pipeline run, bearer-token gated |
//!
//! # Error Contract
//!
//! Error responses carry a JSON envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid limit: must be in [1, 100]" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `etl_failed` (500),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Secrets;
use crate::embedding::Embedder;
use crate::etl;
use crate::models::{IndexedRecord, ScoredRecord};
use crate::registry::RegistryClient;
use crate::search::HybridSearch;
use crate::store::RegistryStore;

/// Shared application state, constructed once at startup and passed to all
/// route handlers. No handler reaches for ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<HybridSearch>,
    pub registry: Arc<RegistryClient>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn RegistryStore>,
    /// Expected bearer token for the cron endpoint; `None` leaves it open.
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(
        search: Arc<HybridSearch>,
        registry: Arc<RegistryClient>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn RegistryStore>,
        secrets: &Secrets,
    ) -> Self {
        Self {
            search,
            registry,
            embedder,
            store,
            cron_secret: secrets.cron_secret.clone(),
        }
    }
}

/// Build the application router. Split out of [`run_server`] so tests can
/// drive it in-process.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/search", get(handle_search))
        .route("/servers", get(handle_servers))
        .route("/health", get(handle_health))
        .route("/api/cron/etl", get(handle_etl_cron))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on `bind_addr` and run until terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    info!(bind = bind_addr, "API server listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error envelope.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"unauthorized"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map engine errors to HTTP statuses: parameter validation failures become
/// 400s, everything else is a 500.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.starts_with("invalid ") {
        bad_request(msg)
    } else {
        internal(msg)
    }
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Registry Search API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/search": "Search servers (hybrid full-text + semantic)",
            "/servers": "List all indexed servers",
            "/health": "Health check",
        }
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
    #[serde(default = "default_weight")]
    full_text_weight: f64,
    #[serde(default = "default_weight")]
    semantic_weight: f64,
}

fn default_search_limit() -> i64 {
    10
}
fn default_weight() -> f64 {
    1.0
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<ScoredRecord>,
    query: String,
    limit: i64,
    count: usize,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state
        .search
        .search(
            &params.q,
            params.limit,
            params.full_text_weight,
            params.semantic_weight,
        )
        .await
        .map_err(classify_error)?;

    let count = results.len();
    Ok(Json(SearchResponse {
        results,
        query: params.q,
        limit: params.limit,
        count,
    }))
}

// ============ GET /servers ============

#[derive(Deserialize)]
struct ServersQuery {
    #[serde(default = "default_list_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_list_limit() -> i64 {
    100
}

#[derive(Serialize)]
struct ServersResponse {
    servers: Vec<IndexedRecord>,
    limit: i64,
    offset: i64,
    count: usize,
}

async fn handle_servers(
    State(state): State<AppState>,
    Query(params): Query<ServersQuery>,
) -> Result<Json<ServersResponse>, AppError> {
    let servers = state
        .search
        .list(params.limit, params.offset)
        .await
        .map_err(classify_error)?;

    let count = servers.len();
    Ok(Json(ServersResponse {
        servers,
        limit: params.limit,
        offset: params.offset,
        count,
    }))
}

// ============ GET /api/cron/etl ============

#[derive(Serialize)]
struct EtlResponse {
    status: String,
    message: String,
}

/// Scheduler-triggered pipeline run.
///
/// When a cron secret is configured the caller must present exactly
/// `Authorization: Bearer <secret>`; no pipeline work happens on a failed
/// check. Pipeline failures surface as 500 with the error detail.
async fn handle_etl_cron(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EtlResponse>, AppError> {
    if let Some(expected) = &state.cron_secret {
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if presented != format!("Bearer {expected}") {
            return Err(unauthorized("Unauthorized"));
        }
    }

    let report = etl::run(
        state.registry.as_ref(),
        state.embedder.as_ref(),
        state.store.as_ref(),
        None,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "ETL run failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "etl_failed".to_string(),
            message: format!("ETL failed: {e:#}"),
        }
    })?;

    Ok(Json(EtlResponse {
        status: "success".to_string(),
        message: format!(
            "ETL pipeline completed: {} fetched, {} latest, {} upserted",
            report.fetched, report.latest, report.upserted
        ),
    }))
}
