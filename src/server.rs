//! JSON HTTP API for the asset finder UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/asset-finder/options` | Filter options (tenants … geo → locales) |
//! | `POST` | `/api/asset-finder/search` | Paged search |
//! | `GET`  | `/api/asset-finder/assets/{id}` | Occurrence + catalog detail |
//! | `GET`  | `/api/asset-finder/extraction-count/{raw_data_id}` | Per-document count |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "asset not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! "No data" is never an error: empty searches return an empty page and
//! options fall back to defaults.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::EngineError;
use crate::get::{get_asset, AssetDetail};
use crate::options::{get_options, OptionsResponse};
use crate::search::{search_assets, SearchRequest, SearchResponse};
use crate::service::AssetService;
use crate::stats::{extraction_count, ExtractionCountResponse};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<AssetService>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let service = Arc::new(AssetService::open(config).await?);
    let app = build_router(service);

    info!(bind = %bind_addr, "asset finder API listening");
    println!("Asset finder API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router over an already opened service.
pub fn build_router(service: Arc<AssetService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/options", get(handle_options))
        .route("/search", post(handle_search))
        .route("/assets/{id}", get(handle_detail))
        .route(
            "/extraction-count/{raw_data_id}",
            get(handle_extraction_count),
        );

    Router::new()
        .nest("/api/asset-finder", api)
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
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

/// Caller mistakes become 400; everything else reaching here is a
/// storage or transport failure.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<EngineError>() {
            Some(EngineError::InvalidRequest(msg)) => bad_request(msg.clone()),
            _ => {
                error!(error = %format!("{:#}", err), "request failed");
                internal(err.to_string())
            }
        }
    }
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

// ============ Asset finder ============

async fn handle_options(State(state): State<AppState>) -> Result<Json<OptionsResponse>, AppError> {
    Ok(Json(get_options(&state.service).await?))
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    Ok(Json(search_assets(&state.service, &request).await?))
}

async fn handle_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssetDetail>, AppError> {
    if id.trim().is_empty() {
        return Err(bad_request("id must not be empty"));
    }
    get_asset(&state.service, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("asset not found: {}", id)))
}

async fn handle_extraction_count(
    State(state): State<AppState>,
    Path(raw_data_id): Path<String>,
) -> Result<Json<ExtractionCountResponse>, AppError> {
    if raw_data_id.trim().is_empty() {
        return Err(bad_request("raw_data_id must not be empty"));
    }
    Ok(Json(extraction_count(&state.service, &raw_data_id).await?))
}
