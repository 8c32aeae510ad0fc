//! Health check endpoints.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    store: bool,
}

/// Readiness check: verifies the schedule store answers.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<ReadinessResponse> {
    let store_ok = state.cron.store().load().await.is_ok();
    Json(ReadinessResponse {
        status: if store_ok { "ready" } else { "degraded" },
        store: store_ok,
    })
}
