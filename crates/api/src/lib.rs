//! HTTP API over the blog read model.
//!
//! Serves paged blog, post, author and category queries, accepts domain
//! events for projection, and exposes health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use read_model::{BlogReadModel, ProjectionProcessor, SqlBlogReadModel};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/blogs", get(routes::blogs::find))
        .route("/blogs/{id}", get(routes::blogs::get))
        .route("/posts", get(routes::posts::list))
        .route("/authors", get(routes::authors::list))
        .route("/categories", get(routes::categories::list))
        .route("/events", post(routes::events::ingest))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the read model into a processor and wraps both as handler state.
pub fn create_state(read_model: Arc<SqlBlogReadModel>) -> Arc<AppState> {
    let mut processor = ProjectionProcessor::new();
    processor.register(read_model.clone());

    Arc::new(AppState {
        read_model,
        processor: Arc::new(processor),
    })
}

/// Opens the configured database and brings its schema up to date.
pub async fn connect(config: &Config) -> read_model::Result<Arc<SqlBlogReadModel>> {
    let pool = read_model::open(&config.database_url, config.max_connections).await?;
    let read_model = SqlBlogReadModel::new(pool);
    read_model.migrate().await?;
    Ok(Arc::new(read_model))
}
