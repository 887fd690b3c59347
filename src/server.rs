//! HTTP API for the portfolio assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a question, with links and section chips |
//! | `POST` | `/api/chat/context` | The selected context and its links, no generation |
//! | `GET`  | `/api/sections` | The current portfolio document |
//! | `POST` | `/api/reload` | Force a portfolio reload |
//! | `GET`  | `/api/health` | Provider, retrieval and portfolio status |
//! | `GET`  | `/` | Service info and endpoint map |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `reload_failed` (500).
//!
//! # CORS
//!
//! Origins come from `[server].cors_origins`; `"*"` allows any origin.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use folio_core::models::{Link, Portfolio};

use crate::config::Config;
use crate::generation::{create_generator, Generator};
use crate::selector::ContextSelector;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    selector: Arc<ContextSelector>,
    generator: Arc<dyn Generator>,
}

impl AppState {
    pub fn new(config: Config, selector: ContextSelector, generator: Arc<dyn Generator>) -> Self {
        Self {
            config: Arc::new(config),
            selector: Arc::new(selector),
            generator,
        }
    }

    /// State wired from configuration: file-backed store, lazily built
    /// dense retriever and the configured generator.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.clone(),
            ContextSelector::from_config(config),
            create_generator(&config.generation),
        )
    }
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config);

    // Build the dense retriever in the background so the first request
    // doesn't pay for loading the model.
    if state.selector.dense_enabled() {
        let dense = state.selector.dense().clone();
        tokio::spawn(async move {
            dense.available().await;
        });
    }

    let portfolio = state.selector.load_portfolio().await;
    tracing::info!(
        provider = state.generator.name(),
        dense_enabled = state.selector.dense_enabled(),
        sections = portfolio.section_names().len(),
        cors = ?config.server.cors_origins,
        "folio server starting"
    );

    let app = router(state, &config.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("folio listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router with all routes and the CORS layer.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/context", post(handle_context))
        .route("/api/sections", get(handle_sections))
        .route("/api/reload", post(handle_reload))
        .route("/api/health", get(handle_health))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn reload_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "reload_failed".to_string(),
        message: message.into(),
    }
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    question: String,
    #[serde(default)]
    section: Option<String>,
    /// Accepted for client compatibility; answers are stateless.
    #[serde(default)]
    conversation_id: Option<String>,
}

impl ChatRequest {
    fn section(&self) -> Option<&str> {
        self.section.as_deref().filter(|s| !s.trim().is_empty())
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.question.trim().is_empty() {
            return Err(bad_request("question must not be empty"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    links: Vec<Link>,
    chips: Vec<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    req.validate()?;
    let section = req.section();

    let selection = state.selector.select(section, &req.question).await;
    let (answer, backend_links) = state.generator.answer(&req.question, &selection.context).await;
    let links = state.selector.merge_links(backend_links, &selection.context);

    tracing::info!(
        strategy = selection.strategy.as_str(),
        provider = state.generator.name(),
        conversation = ?req.conversation_id,
        links = links.len(),
        "chat answered"
    );

    Ok(Json(ChatResponse {
        answer,
        links,
        chips: vec![section.unwrap_or("Overview").to_string()],
    }))
}

// ============ POST /api/chat/context ============

#[derive(Serialize)]
struct ContextResponse {
    context: String,
    links: Vec<Link>,
    section: String,
    strategy: &'static str,
}

async fn handle_context(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ContextResponse>, AppError> {
    req.validate()?;
    let section = req.section();

    let selection = state.selector.select(section, &req.question).await;
    let links = state.selector.extract_links(&selection.context);

    Ok(Json(ContextResponse {
        links,
        section: section.unwrap_or("Overview").to_string(),
        strategy: selection.strategy.as_str(),
        context: selection.context,
    }))
}

// ============ GET /api/sections ============

async fn handle_sections(State(state): State<AppState>) -> Json<Portfolio> {
    Json(state.selector.load_portfolio().await.as_ref().clone())
}

// ============ POST /api/reload ============

#[derive(Serialize)]
struct ReloadResponse {
    status: &'static str,
    message: String,
    sections: Vec<String>,
    timestamp: Option<String>,
}

async fn handle_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let store = state.selector.store();
    let portfolio = store.try_force_reload_async().await.map_err(|e| {
        let error = format!("{:#}", e);
        tracing::warn!(%error, "manual reload failed");
        reload_failed(format!("Error reloading portfolio: {}", error))
    })?;

    Ok(Json(ReloadResponse {
        status: "success",
        message: "Portfolio data reloaded".to_string(),
        sections: portfolio.section_names(),
        timestamp: store
            .loaded_mtime()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339()),
    }))
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: String,
    dense_enabled: bool,
    dense_available: bool,
    dense_state: &'static str,
    portfolio_sections: Vec<String>,
    version: &'static str,
}

/// Reports the retriever state without triggering a build.
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let dense_state = state.selector.dense().state();
    let portfolio = state.selector.load_portfolio().await;
    Json(HealthResponse {
        status: "ok",
        provider: state.generator.name().to_string(),
        dense_enabled: state.selector.dense_enabled(),
        dense_available: dense_state == crate::dense::DenseState::Ready,
        dense_state: dense_state.as_str(),
        portfolio_sections: portfolio.section_names(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET / ============

async fn handle_root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "folio",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.generator.name(),
        "endpoints": {
            "chat": "/api/chat (POST)",
            "context": "/api/chat/context (POST)",
            "sections": "/api/sections",
            "health": "/api/health",
            "reload": "/api/reload (POST)",
        },
        "config": {
            "portfolio": state.config.portfolio.path.display().to_string(),
            "dense_enabled": state.config.retrieval.enable_dense,
        },
    }))
}
