//! Post listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use read_model::{FilterOptions, Page, Post, SortOptions};
use serde::Deserialize;

use super::{AppState, number, sort_options};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct PostsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub blog_id: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub views: Option<String>,
    #[serde(rename = "publishDate")]
    pub publish_date: Option<String>,
    pub sort_views: Option<String>,
    pub sort_publish_date: Option<String>,
}

impl PostsQuery {
    fn filters(&self) -> FilterOptions {
        let mut filters = FilterOptions::new();
        if let Some(blog_id) = non_empty(&self.blog_id) {
            filters = filters.with_eq("blog_id", blog_id);
        }
        if let Some(category) = non_empty(&self.category) {
            filters = filters.with_category(category);
        }
        if let (Some(start), Some(end)) = (non_empty(&self.start_date), non_empty(&self.end_date)) {
            filters = filters.with_dates(start, end);
        }
        filters
    }

    /// `sort_views` takes precedence over the bare `views` key.
    fn sorts(&self) -> SortOptions {
        sort_options(
            self.sort_views.as_deref().or(self.views.as_deref()),
            self.sort_publish_date
                .as_deref()
                .or(self.publish_date.as_deref()),
        )
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// GET /posts
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<Page<Post>>, ApiError> {
    let page = state
        .read_model
        .get_posts(
            number(query.page.as_deref()),
            number(query.limit.as_deref()),
            &query.sorts(),
            &query.filters(),
        )
        .await?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_pair_is_forwarded_only_when_complete() {
        let query = PostsQuery {
            start_date: Some("06/10/21".to_string()),
            ..Default::default()
        };
        assert!(query.filters().start_date().is_none());

        let query = PostsQuery {
            start_date: Some("06/10/21".to_string()),
            end_date: Some("07/10/21".to_string()),
            blog_id: Some(String::new()),
            ..Default::default()
        };
        let filters = query.filters();
        assert_eq!(filters.end_date(), Some("07/10/21"));
        assert!(filters.equals().is_empty());
    }

    #[test]
    fn bad_sort_directions_are_dropped() {
        let query = PostsQuery {
            sort_views: Some("desc".to_string()),
            sort_publish_date: Some("sideways".to_string()),
            ..Default::default()
        };
        assert_eq!(query.sorts().iter().count(), 1);
    }

    #[test]
    fn bare_sort_keys_are_accepted() {
        let query = PostsQuery {
            views: Some("desc".to_string()),
            publish_date: Some("asc".to_string()),
            ..Default::default()
        };
        assert_eq!(query.sorts().iter().count(), 2);

        let query = PostsQuery {
            views: Some("sideways".to_string()),
            sort_views: Some("asc".to_string()),
            ..Default::default()
        };
        assert_eq!(query.sorts().iter().count(), 1);
    }
}
