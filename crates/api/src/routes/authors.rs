//! Author listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use read_model::{Author, FilterOptions, Page, SortOptions};
use serde::Deserialize;

use super::{AppState, number};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AuthorsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub blog_id: Option<String>,
}

/// GET /authors
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorsQuery>,
) -> Result<Json<Page<Author>>, ApiError> {
    let mut filters = FilterOptions::new();
    if let Some(blog_id) = query.blog_id.filter(|id| !id.is_empty()) {
        filters = filters.with_eq("blog_id", blog_id);
    }

    let page = state
        .read_model
        .get_authors(
            number(query.page.as_deref()),
            number(query.limit.as_deref()),
            &SortOptions::new(),
            &filters,
        )
        .await?;
    Ok(Json(page))
}
