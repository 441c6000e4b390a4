//! Health check endpoint.
//!
//! Liveness only: the gates fail open or closed on their own, so the
//! process answering is the signal.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    schemas: usize,
    buckets: Vec<String>,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        schemas: state.schemas().len(),
        buckets: state
            .rate_limiter()
            .config()
            .buckets()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
