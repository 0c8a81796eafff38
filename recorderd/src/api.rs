//! HTTP API for the recorder daemon.
//!
//! Provides endpoints for:
//! - Health check
//! - Audit event ingest (`POST /audit/log-event`)
//! - Form submissions (`POST /html-form`)

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::DaemonError;
use crate::form::FormRecorder;
use crate::ingest::AuditIngestor;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub ingestor: AuditIngestor,
    pub forms: FormRecorder,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/audit/log-event", post(log_event_handler))
        .route("/html-form", post(html_form_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ingest one audit event. The body is the raw event JSON.
async fn log_event_handler(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.ingestor.log_event(&body).await.map_err(to_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a form submission. Replies are plain text.
async fn html_form_handler(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    match state.forms.submit_bytes(&body).await {
        Ok(_) => (StatusCode::OK, "Form submitted successfully").into_response(),
        Err(DaemonError::InvalidInput(message)) => (StatusCode::BAD_REQUEST, message).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Map a classified error to its HTTP status.
pub fn status_for(error: &DaemonError) -> StatusCode {
    match error {
        DaemonError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DaemonError::NotFound => StatusCode::NOT_FOUND,
        DaemonError::Aborted => StatusCode::CONFLICT,
        DaemonError::Internal(_) | DaemonError::Store(_) | DaemonError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}
