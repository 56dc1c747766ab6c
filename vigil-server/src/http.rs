//! Vigil HTTP API
//!
//! Axum-based HTTP server exposing image analysis, history and statistics.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery.
//!
//! Endpoints:
//! - GET  /api/         — service info
//! - POST /api/analyze  — analyze one image and store the result
//! - GET  /api/history  — most recent analyses, newest first
//! - GET  /api/stats    — counts per safety score

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use vigil_core::store::DEFAULT_HISTORY_LIMIT;
use vigil_core::{Analysis, AnalysisStats, AnalysisStore, VigilConfig, VisionModel};

use crate::subsystems::analyze::{run_analysis, AnalyzeRequest};
use crate::subsystems::reports;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn AnalysisStore>,
    pub vision: Arc<dyn VisionModel>,
    pub config: VigilConfig,
}

impl HttpState {
    /// History page size: the configured limit, capped at 50.
    pub fn history_limit(&self) -> u32 {
        self.config.history.limit.clamp(1, DEFAULT_HISTORY_LIMIT)
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = cors_layer(&state.config.http.cors_origins);
    let body_limit = DefaultBodyLimit::max(state.config.http.max_body_bytes);

    Router::new()
        .route("/api", get(root_handler))
        .route("/api/", get(root_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/history", get(history_handler))
        .route("/api/stats", get(stats_handler))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Vigil HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

/// `["*"]` (or an empty list) allows any origin without credentials; an
/// explicit list allows only those origins, with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    // Credentials rule out `*` for methods and headers, so echo the request's.
    CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Error body for failed analyses
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { detail: msg.into() }
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner root — service banner (pure, no IO).
pub fn root_inner() -> serde_json::Value {
    serde_json::json!({
        "message": "Warehouse Vision AI API",
        "status": "operational",
    })
}

/// Inner analyze — runs the pipeline and maps failures to 500 with a detail.
pub async fn analyze_inner(
    state: &HttpState,
    req: AnalyzeRequest,
) -> (StatusCode, serde_json::Value) {
    let analysis = match run_analysis(state.vision.as_ref(), state.store.as_ref(), req).await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "Error in analyze endpoint");
            return error_body(e.to_string());
        }
    };

    match serde_json::to_value(&analysis) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => error_body(e.to_string()),
    }
}

/// Inner history — never fails; an unreachable store yields an empty list.
pub async fn history_inner(state: &HttpState) -> Vec<Analysis> {
    reports::history_or_empty(state.store.as_ref(), state.history_limit()).await
}

/// Inner stats — never fails; an unreachable store yields zeroed counters.
pub async fn stats_inner(state: &HttpState) -> AnalysisStats {
    reports::stats_or_zero(state.store.as_ref()).await
}

fn error_body(detail: String) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!(ErrorDetail::new(detail)),
    )
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_inner(&state, req).await;
    (status, Json(body))
}

pub async fn history_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(history_inner(&state).await)
}

pub async fn stats_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(stats_inner(&state).await)
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
