//! HTTP server exposing retrieval and generation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/retrieve` | Top-k passages for a query |
//! | `POST` | `/generate` | Retrieve, filter by relevance, and answer with the generation provider |
//! | `GET`  | `/health` | Health check (version, passage count, start mode) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `generation_disabled` (400),
//! `embedding_disabled` (400), `provider_error` (502), `timeout` (504),
//! `index_error` (500), `persistence_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! chat clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::{Config, RetrievalConfig};
use crate::engine::{RetrievalEngine, StartMode};
use crate::error::{ProviderError, RetrievalError};
use crate::generation::{self, ChatMessage, Conversation, GenerationProvider};
use crate::models::RetrievedPassage;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RetrievalEngine>,
    /// `None` when generation is disabled; `/generate` then answers 400.
    pub generator: Option<Arc<dyn GenerationProvider>>,
    pub retrieval: RetrievalConfig,
}

/// Build the router with all routes and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/retrieve", post(handle_retrieve))
        .route("/generate", post(handle_generate))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve `state` on an already-bound listener until the process ends.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Initialize the engine from `config`, then serve on `[server].bind`.
///
/// Generation is optional: when the provider is disabled the server still
/// starts and `/generate` reports `generation_disabled`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = RetrievalEngine::from_config(config).await?;

    let generator = if config.generation.is_enabled() {
        Some(generation::create_generator(&config.generation)?)
    } else {
        warn!("generation provider disabled; /generate will return 400");
        None
    };

    let state = AppState {
        engine: Arc::new(engine),
        generator,
        retrieval: config.retrieval.clone(),
    };

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "server listening");
    println!("Server listening on http://{}", config.server.bind);

    serve(listener, state).await
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

/// Internal error type that converts into an Axum HTTP response.
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

impl AppError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let message = err.to_string();
        match &err {
            RetrievalError::Input(_) => Self::new(StatusCode::BAD_REQUEST, "bad_request", message),
            RetrievalError::Provider(ProviderError::Timeout { .. }) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
            }
            RetrievalError::Provider(ProviderError::Disabled(what)) => Self::new(
                StatusCode::BAD_REQUEST,
                format!("{}_disabled", what),
                message,
            ),
            RetrievalError::Provider(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "provider_error", message)
            }
            RetrievalError::Index(_) | RetrievalError::Persistence(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.kind(), message)
            }
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        RetrievalError::from(err).into()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    passages: usize,
    start_mode: StartMode,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        passages: state.engine.len(),
        start_mode: state.engine.start_mode(),
    })
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    chunks: Vec<RetrievedPassage>,
}

/// Handler for `POST /retrieve`. `top_k` defaults to `retrieval.default_top_k`.
async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    let top_k = req.top_k.unwrap_or(state.retrieval.default_top_k);
    let response = state.engine.query(&req.query, top_k).await?;
    Ok(Json(RetrieveResponse {
        chunks: response.results,
    }))
}

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    /// Overrides `retrieval.relevance_threshold` for this request.
    #[serde(default)]
    threshold: Option<f32>,
    /// Prior turns; omit to start a fresh conversation.
    #[serde(default)]
    history: Conversation,
}

#[derive(Serialize)]
struct GenerateResponse {
    query: String,
    response: String,
    history: Vec<ChatMessage>,
}

/// Handler for `POST /generate`.
///
/// `top_k` defaults to `retrieval.generate_top_k`. The returned `history`
/// is the request history extended by this exchange; clients send it back
/// to continue the conversation.
async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let generator = state
        .generator
        .as_ref()
        .ok_or(ProviderError::Disabled("generation"))?;

    let top_k = req.top_k.unwrap_or(state.retrieval.generate_top_k);
    let threshold = req
        .threshold
        .unwrap_or(state.retrieval.relevance_threshold);

    let answer = generation::answer(
        &state.engine,
        generator.as_ref(),
        &req.history,
        &req.query,
        top_k,
        threshold,
    )
    .await?;

    Ok(Json(GenerateResponse {
        query: answer.query,
        response: answer.response,
        history: answer.conversation.into_messages(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexError, InputError};

    #[test]
    fn test_error_status_mapping() {
        let cases: Vec<(RetrievalError, StatusCode, &str)> = vec![
            (
                InputError::EmptyQuery.into(),
                StatusCode::BAD_REQUEST,
                "bad_request",
            ),
            (
                ProviderError::Timeout {
                    operation: "embedding",
                    secs: 30,
                }
                .into(),
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                ProviderError::Disabled("generation").into(),
                StatusCode::BAD_REQUEST,
                "generation_disabled",
            ),
            (
                ProviderError::Embedding("boom".into()).into(),
                StatusCode::BAD_GATEWAY,
                "provider_error",
            ),
            (
                IndexError::EmptyCorpus.into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "index_error",
            ),
        ];

        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }
}
