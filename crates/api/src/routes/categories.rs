//! Category listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use read_model::{Category, FilterOptions, Page};
use serde::Deserialize;

use super::{AppState, number, sort_options};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CategoriesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub views: Option<String>,
    #[serde(rename = "publishDate")]
    pub publish_date: Option<String>,
}

/// GET /categories
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoriesQuery>,
) -> Result<Json<Page<Category>>, ApiError> {
    let page = state
        .read_model
        .get_categories(
            number(query.page.as_deref()),
            number(query.limit.as_deref()),
            &sort_options(query.views.as_deref(), query.publish_date.as_deref()),
            &FilterOptions::new(),
        )
        .await?;
    Ok(Json(page))
}
