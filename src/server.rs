//! HTTP search server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search` | Verse-seeded semantic search |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/search` takes query parameters `model_name` (default `hebrew_st`),
//! `record_level` (default `pericope`), `top_k`, and `search_verses`, which
//! is either a JSON array of `{chapter, verse}` or a textual reference such
//! as `Gen 1:1-3`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "search_verses cannot be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `embeddings_disabled` (400),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends can
//! query the server directly.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::corpus::VerseTable;
use crate::search::{search, SearchError, SearchRequest, SearchResponse};
use crate::verse_ref::parse_refs;

const DEFAULT_MODEL: &str = "hebrew_st";
const DEFAULT_LEVEL: &str = "pericope";

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    table: Arc<VerseTable>,
    pool: SqlitePool,
}

/// Starts the search server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let table = VerseTable::load(&config.corpus.verses)?;
    let pool = crate::db::connect_read_only(config).await?;
    tracing::info!(verses = table.len(), "verse table loaded");

    let state = AppState {
        config: Arc::new(config.clone()),
        table: Arc::new(table),
        pool,
    };

    println!("listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
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

#[derive(Debug)]
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

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let message = err.to_string();
        match err {
            SearchError::BadRequest(_) => bad_request(message),
            SearchError::NotFound(_) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found".to_string(),
                message,
            },
            SearchError::EmbeddingsDisabled => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "embeddings_disabled".to_string(),
                message,
            },
            SearchError::Internal(e) => {
                tracing::error!(error = %e, "search failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message,
                }
            }
        }
    }
}

// ============ Handlers ============

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

/// Raw query parameters. `top_k` is parsed by hand so a non-integer gets the
/// JSON error body.
#[derive(Deserialize)]
struct SearchParams {
    model_name: Option<String>,
    record_level: Option<String>,
    top_k: Option<String>,
    search_verses: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> Result<SearchRequest, AppError> {
        let top_k = match self.top_k.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<usize>()
                    .map_err(|_| bad_request(format!("top_k must be an integer, got '{}'", raw)))?,
            ),
        };

        let raw_verses = self
            .search_verses
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| bad_request("search_verses cannot be empty"))?;
        let search_verses =
            parse_refs(&raw_verses).map_err(|e| bad_request(format!("{:#}", e)))?;

        Ok(SearchRequest {
            model_name: self.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            record_level: self.record_level.unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            top_k,
            search_verses,
        })
    }
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let request = params.into_request()?;
    let response = search(&state.config, &state.table, &state.pool, &request).await?;
    Ok(Json(response))
}
