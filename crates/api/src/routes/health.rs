//! Liveness endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use read_model::Projection;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub projection: &'static str,
    /// Events the read model has seen since start-up.
    pub events_seen: u64,
}

/// GET /health
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let position = state.read_model.position().await;
    Json(HealthResponse {
        status: "ok",
        projection: state.read_model.name(),
        events_seen: position.events_seen,
    })
}
