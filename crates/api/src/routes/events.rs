//! Event ingestion endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use events::EventEnvelope;

use super::AppState;

/// POST /events hands a domain event to the registered projections.
///
/// Application failures are the read model's to log, so a decoded event is
/// always accepted.
#[tracing::instrument(skip(state, event), fields(event_type = %event.event_type))]
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(event): Json<EventEnvelope>,
) -> StatusCode {
    metrics::counter!("api_events_ingested_total").increment(1);
    if let Err(err) = state.processor.process_event(&event).await {
        tracing::error!(error = %err, "projection rejected event");
    }
    StatusCode::ACCEPTED
}
