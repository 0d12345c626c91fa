//! HTTP route handlers.

pub mod authors;
pub mod blogs;
pub mod categories;
pub mod events;
pub mod health;
pub mod metrics;
pub mod posts;

use std::sync::Arc;

use read_model::{BlogReadModel, ProjectionProcessor, SortOptions};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub read_model: Arc<dyn BlogReadModel>,
    pub processor: Arc<ProjectionProcessor>,
}

/// Reads a numeric query parameter. Missing or unparsable values count as 0,
/// which the read model treats as the first page or no row cap.
pub(crate) fn number(value: Option<&str>) -> u32 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Builds sort options from the `views` and `publishDate` directions.
pub(crate) fn sort_options(views: Option<&str>, publish_date: Option<&str>) -> SortOptions {
    let pairs = [("views", views), ("publishDate", publish_date)];
    SortOptions::from_pairs(
        pairs
            .into_iter()
            .filter_map(|(key, direction)| direction.map(|d| (key, d))),
    )
}
