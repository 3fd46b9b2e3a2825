//! JSON/SSE HTTP API over the question-answering pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/stats` | Knowledge-base summary |
//! | `POST`   | `/documents` | Upload a document (base64 body) |
//! | `DELETE` | `/documents/{id}` | Remove a document's chunks |
//! | `POST`   | `/query` | Answer a question |
//! | `POST`   | `/query/stream` | Answer a question as Server-Sent Events |
//! | `GET`    | `/history` | Remembered conversation turns |
//! | `DELETE` | `/history` | Forget the conversation |
//! | `DELETE` | `/knowledge-base` | Remove all documents and the conversation |
//! | `GET`    | `/config` | Active settings (credential redacted) |
//! | `PATCH`  | `/config` | Update settings; all-or-nothing |
//! | `POST`   | `/test` | Probe the generation backend |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_config` (400), `not_found` (404),
//! `payload_too_large` (413), `unsupported_type` (415), `unprocessable` (422),
//! `generation_failed` (502), `internal` (500).
//!
//! # Streaming
//!
//! `POST /query/stream` emits `searching`, `found`, `fragment`, and
//! `complete` events, or a final `error` event. A client that disconnects
//! early cancels the query and nothing is added to the history.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use docqa_core::config::{ConfigPatch, PipelineConfig};
use docqa_core::error::PipelineError;
use docqa_core::models::{Document, QueryResult, StoreStats, Turn};
use docqa_core::pipeline::{IngestReport, RagPipeline, StreamEvent};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path as FsPath;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::extract::{content_type_for_path, ExtractError};
use crate::ingest::{ingest_bytes, IngestError};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pipeline: RagPipeline,
    max_file_bytes: u64,
}

impl AppState {
    pub fn new(pipeline: RagPipeline, max_file_bytes: u64) -> Self {
        Self {
            pipeline,
            max_file_bytes,
        }
    }
}

/// Build the router with every route and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // base64 inflates uploads by a third; leave room for the JSON envelope
    let body_limit = (state.max_file_bytes as usize / 3 + 1) * 4 + 64 * 1024;

    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/documents", post(handle_upload))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/query", post(handle_query))
        .route("/query/stream", post(handle_query_stream))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .route("/knowledge-base", delete(handle_clear_knowledge_base))
        .route("/config", get(handle_get_config).patch(handle_patch_config))
        .route("/test", post(handle_test))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config, pipeline: RagPipeline) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(pipeline, config.ingest.max_file_bytes));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: &'static str,
    message: String,
    /// Offending fields, for `invalid_config`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    fields: Vec<String>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    fn detail(self) -> ErrorDetail {
        ErrorDetail {
            code: self.code,
            message: self.message,
            fields: self.fields,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(ErrorBody { error: self.detail() })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::EmptyQuestion | PipelineError::Chunking(_) => bad_request(message),
            PipelineError::Config(e) => AppError {
                fields: e.errors.iter().map(|f| f.field.to_string()).collect(),
                ..AppError::new(StatusCode::BAD_REQUEST, "invalid_config", message)
            },
            PipelineError::Generation(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "generation_failed", message)
            }
            PipelineError::Store(_) => {
                error!(error = %message, "store failure");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::Pipeline(e) => e.into(),
            IngestError::Extract(ExtractError::Empty) => bad_request(message),
            IngestError::Extract(ExtractError::TooLarge { .. }) => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
            }
            IngestError::Extract(ExtractError::UnsupportedType(_))
            | IngestError::UnknownExtension(_) => AppError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_type",
                message,
            ),
            IngestError::Extract(_) => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", message)
            }
            IngestError::Io { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ GET /health, GET /stats ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StoreStats>, AppError> {
    Ok(Json(state.pipeline.stats().await?))
}

// ============ Documents ============

#[derive(Deserialize)]
struct UploadRequest {
    name: String,
    /// Inferred from the `name` extension when absent.
    content_type: Option<String>,
    /// File bytes, standard base64.
    data: String,
}

#[derive(Serialize)]
struct UploadResponse {
    document: Document,
    report: IngestReport,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    if req.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    let content_type = match req.content_type {
        Some(ct) => ct,
        None => content_type_for_path(FsPath::new(&req.name))
            .map(str::to_string)
            .ok_or_else(|| IngestError::UnknownExtension(req.name.clone().into()))?,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.data.as_bytes())
        .map_err(|e| bad_request(format!("data is not valid base64: {}", e)))?;

    let (mut document, report) = ingest_bytes(
        &state.pipeline,
        &req.name,
        &content_type,
        &bytes,
        state.max_file_bytes,
    )
    .await?;
    // the text is already in the store; echoing it back is wasteful
    document.raw_text.clear();
    Ok((StatusCode::CREATED, Json(UploadResponse { document, report })))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state.pipeline.delete_document(&id).await?;
    if removed == 0 {
        return Err(not_found(format!("no document with id: {}", id)));
    }
    Ok(Json(json!({ "removed_chunks": removed })))
}

// ============ Queries ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    Ok(Json(state.pipeline.query(&req.question).await?))
}

async fn handle_query_stream(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = state
        .pipeline
        .stream_query(&req.question)
        .map(|item| match item {
            Ok(event) => sse_event(&event),
            Err(err) => Event::default()
                .event("error")
                .json_data(AppError::from(err).detail()),
        });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(event: &StreamEvent) -> Result<Event, axum::Error> {
    match event {
        StreamEvent::Searching => Ok(Event::default().event("searching").data("{}")),
        StreamEvent::Found { chunks } => Event::default()
            .event("found")
            .json_data(json!({ "chunks": chunks })),
        StreamEvent::Fragment(text) => Event::default()
            .event("fragment")
            .json_data(json!({ "text": text })),
        StreamEvent::Complete(result) => Event::default().event("complete").json_data(result),
    }
}

// ============ History and knowledge base ============

async fn handle_history(State(state): State<AppState>) -> Json<Vec<Turn>> {
    Json(state.pipeline.conversation_history())
}

async fn handle_clear_history(State(state): State<AppState>) -> StatusCode {
    state.pipeline.clear_history();
    StatusCode::NO_CONTENT
}

async fn handle_clear_knowledge_base(
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.pipeline.clear_knowledge_base().await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Configuration and probe ============

async fn handle_get_config(State(state): State<AppState>) -> Json<PipelineConfig> {
    Json(state.pipeline.config().redacted())
}

async fn handle_patch_config(
    State(state): State<AppState>,
    Json(patch): Json<ConfigPatch>,
) -> Result<Json<PipelineConfig>, AppError> {
    let updated = state.pipeline.update_config(&patch)?;
    Ok(Json(updated.redacted()))
}

async fn handle_test(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let ok = state.pipeline.test_pipeline().await?;
    Ok(Json(json!({ "ok": ok })))
}
