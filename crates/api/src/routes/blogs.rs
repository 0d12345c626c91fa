//! Blog lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use read_model::Blog;
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct BlogQuery {
    pub url: Option<String>,
}

/// GET /blogs/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Blog>, ApiError> {
    Ok(Json(state.read_model.get_blog_by_id(&id).await?))
}

/// GET /blogs?url=... matches the site URL or the feed URL.
#[tracing::instrument(skip(state))]
pub async fn find(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BlogQuery>,
) -> Result<Json<Blog>, ApiError> {
    let url = query
        .url
        .ok_or_else(|| ApiError::BadRequest("missing url query parameter".to_string()))?;
    Ok(Json(state.read_model.get_blog_by_url(&url).await?))
}
