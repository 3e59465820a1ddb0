//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            service: "fleet-controller".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

/// Basic health check - is the server up?
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse::new("ok"))
}

/// Readiness check - is the controller actor still answering?
///
/// Returns 503 once the actor has stopped.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller().status().await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse::new("ok"))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::new("degraded")),
        ),
    }
}

/// Liveness check - minimal body.
async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
