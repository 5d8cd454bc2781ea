//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Stream a cited answer for a chat history |
//! | `GET`  | `/api/doc?file=<name>&section=<n>` | Raw document text, or one paragraph |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Chat stream
//!
//! `POST /api/chat` takes `{ "messages": [{ "role": "user", "content": "..." }] }`
//! and answers with a chunked `text/event-stream` body: the answer text as
//! it is generated, then `\n[CITATIONS]` and a JSON `{ "citations": [...] }`
//! object. See [`crate::framer`].
//!
//! # Error Contract
//!
//! Errors raised before streaming starts use a JSON body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "last message must be from user" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! A failure after streaming has started aborts the chunked body instead.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser widget on
//! another origin can call the API.

use anyhow::Result;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::corpus::CorpusStore;
use crate::doc::{get_document_section, DocError};
use crate::framer::ResponseFramer;
use crate::generation::{create_gateway, GenerationGateway};
use crate::models::Message;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<CorpusStore>,
    framer: ResponseFramer,
}

impl AppState {
    pub fn new(store: Arc<CorpusStore>, gateway: Arc<dyn GenerationGateway>, top_k: usize) -> Self {
        Self {
            framer: ResponseFramer::new(store.clone(), gateway, top_k),
            store,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(CorpusStore::new(&config.corpus)?);
        let gateway = create_gateway(&config.generation)?;
        Ok(Self::new(store, gateway, config.retrieval.top_k))
    }
}

/// Builds the router. Exposed so tests and embedders can serve it themselves.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/doc", get(handle_doc))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        corpus = %config.corpus.dir.display(),
        "Server listening"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
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

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Option<Vec<Message>>,
}

/// Handler for `POST /api/chat`.
///
/// Returns `400` for a missing, empty, or malformed history or when the
/// last message is not from the user. Otherwise streams the framed answer.
async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) =
        payload.map_err(|e| bad_request(format!("Invalid messages format: {}", e.body_text())))?;
    let messages = request
        .messages
        .ok_or_else(|| bad_request("Invalid messages format: messages is required"))?;

    let prepared = state
        .framer
        .prepare(messages)
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(prepared.spawn()))
        .map_err(|e| {
            error!(error = %e, "Failed to build chat response");
            internal("Internal server error")
        })
}

// ============ GET /api/doc ============

#[derive(Deserialize)]
struct DocQuery {
    file: Option<String>,
    section: Option<String>,
}

/// Handler for `GET /api/doc`.
///
/// Returns the whole document as `text/plain`, or only paragraph `section`
/// when it is a valid 1-based index. Unparsable sections are ignored.
async fn handle_doc(
    State(state): State<AppState>,
    Query(query): Query<DocQuery>,
) -> Result<Response, AppError> {
    let file = query.file.unwrap_or_default();
    let section = query.section.and_then(|s| s.trim().parse::<usize>().ok());

    let text = get_document_section(&state.store, &file, section)
        .await
        .map_err(|e| match e {
            DocError::MissingFile => bad_request("Missing or invalid file parameter"),
            DocError::NotFound(_) => not_found("File not found"),
            DocError::Io { .. } => {
                error!(error = %e, "Doc API error");
                internal("Internal server error")
            }
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        text,
    )
        .into_response())
}
