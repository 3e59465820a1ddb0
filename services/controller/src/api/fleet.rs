//! Fleet status and scaling endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use crate::controller::{FleetStatus, ScaleDirection};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/scale-up", post(scale_up))
        .route("/scale-down", post(scale_down))
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub count: Option<i64>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct ScaleResponse {
    pub message: String,
    pub desired_replica_count: u32,
}

async fn status(State(state): State<AppState>) -> Result<Json<FleetStatus>, ApiError> {
    Ok(Json(state.controller().status().await?))
}

async fn scale_up(
    State(state): State<AppState>,
    body: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ScaleResponse>, ApiError> {
    scale(&state, ScaleDirection::Up, body).await
}

async fn scale_down(
    State(state): State<AppState>,
    body: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ScaleResponse>, ApiError> {
    scale(&state, ScaleDirection::Down, body).await
}

async fn scale(
    state: &AppState,
    direction: ScaleDirection,
    body: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ScaleResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request("invalid_body", e.body_text()))?;
    let count = validate_count(request.count)?;

    let desired = match direction {
        ScaleDirection::Up => state.controller().scale_up(count).await?,
        ScaleDirection::Down => state.controller().scale_down(count).await?,
    };

    let verb = match direction {
        ScaleDirection::Up => "up",
        ScaleDirection::Down => "down",
    };
    info!(direction = verb, count, desired = desired.get(), "Scale request applied");

    Ok(Json(ScaleResponse {
        message: format!("Scaled {verb} by {count}"),
        desired_replica_count: desired.get(),
    }))
}

fn validate_count(count: Option<i64>) -> Result<u32, ApiError> {
    let count = count.ok_or_else(|| ApiError::bad_request("invalid_count", "count is required"))?;
    if count < 0 {
        return Err(ApiError::bad_request(
            "invalid_count",
            "count must not be negative",
        ));
    }
    u32::try_from(count).map_err(|_| ApiError::bad_request("invalid_count", "count is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0), Some(0))]
    #[case(Some(2), Some(2))]
    #[case(None, None)]
    #[case(Some(-1), None)]
    #[case(Some(i64::from(u32::MAX) + 1), None)]
    fn test_validate_count(#[case] input: Option<i64>, #[case] expected: Option<u32>) {
        assert_eq!(validate_count(input).ok(), expected);
    }
}
