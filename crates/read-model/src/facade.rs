//! Query operations exposed to the HTTP layer.

use serde::Serialize;

use crate::model::{Author, Blog, Category, Entity, Post};
use crate::scope::{FilterOptions, Pagination, SortOptions, pipeline};
use crate::store::{BlogLookup, EntityStore};
use crate::{QueryError, ReadModelError};

/// One page of a scoped query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    /// Matching rows before pagination.
    pub total: i64,
    pub items: Vec<T>,
}

/// Read-only access to the entity store.
///
/// Lookup misses come back as [`QueryError::NotFound`]; every other store
/// failure is logged here and surfaced as [`QueryError::Unavailable`].
#[derive(Clone)]
pub struct QueryFacade {
    store: EntityStore,
}

impl QueryFacade {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Exact id lookup, with authors and posts loaded.
    #[tracing::instrument(skip(self))]
    pub async fn get_blog_by_id(&self, id: &str) -> Result<Blog, QueryError> {
        record("get_blog_by_id");
        self.find_blog(BlogLookup::Id(id), id).await
    }

    /// Looks a blog up by its site URL or its feed URL.
    #[tracing::instrument(skip(self))]
    pub async fn get_blog_by_url(&self, url: &str) -> Result<Blog, QueryError> {
        record("get_blog_by_url");
        self.find_blog(BlogLookup::Url(url), url).await
    }

    /// Runs the full scope pipeline over posts and loads their categories.
    #[tracing::instrument(skip(self, sorts, filters))]
    pub async fn get_posts(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> Result<Page<Post>, QueryError> {
        record("get_posts");
        let mut result = self.page::<Post>(page, limit, sorts, filters).await?;
        self.store
            .load_post_categories(&mut result.items)
            .await
            .map_err(unavailable)?;
        Ok(result)
    }

    #[tracing::instrument(skip(self, sorts, filters))]
    pub async fn get_authors(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> Result<Page<Author>, QueryError> {
        record("get_authors");
        self.page(page, limit, sorts, filters).await
    }

    #[tracing::instrument(skip(self, sorts, filters))]
    pub async fn get_categories(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> Result<Page<Category>, QueryError> {
        record("get_categories");
        self.page(page, limit, sorts, filters).await
    }

    async fn find_blog(&self, lookup: BlogLookup<'_>, key: &str) -> Result<Blog, QueryError> {
        let not_found = || QueryError::NotFound {
            entity: Blog::NAME,
            key: key.to_string(),
        };
        if key.is_empty() {
            return Err(not_found());
        }

        self.store
            .find_blog(lookup)
            .await
            .map_err(unavailable)?
            .ok_or_else(not_found)
    }

    async fn page<T: Entity>(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> Result<Page<T>, QueryError> {
        let window = Pagination::new(page, limit);
        let (items, total) = self
            .store
            .find_scoped::<T>(pipeline(filters, window.page(), window.limit(), sorts))
            .await
            .map_err(unavailable)?;

        Ok(Page {
            page: window.page(),
            limit: window.limit(),
            total,
            items,
        })
    }
}

fn record(operation: &'static str) {
    metrics::counter!("read_model_queries_total", "operation" => operation).increment(1);
}

fn unavailable(err: ReadModelError) -> QueryError {
    let err = QueryError::from(err);
    if let QueryError::Unavailable(source) = &err {
        tracing::error!(error = %source, "read model query failed");
        metrics::counter!("read_model_query_failures_total").increment(1);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open;
    use common::EntityId;

    async fn facade() -> QueryFacade {
        let store = EntityStore::new(open("sqlite::memory:", 1).await.unwrap());
        store.migrate().await.unwrap();
        store
            .create(&Blog {
                id: EntityId::new("b1"),
                url: "https://a.example".to_string(),
                feed_url: "https://a.example/feed".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        QueryFacade::new(store)
    }

    #[tokio::test]
    async fn test_missing_blog_is_typed_not_found() {
        let facade = facade().await;
        let err = facade.get_blog_by_id("nope").await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound { entity: "blog", ref key } if key == "nope"));
    }

    #[tokio::test]
    async fn test_empty_url_is_not_found() {
        let facade = facade().await;
        let err = facade.get_blog_by_url("").await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let facade = facade().await;
        facade.store.pool().close().await;

        let err = facade.get_blog_by_id("b1").await.unwrap_err();
        assert!(matches!(err, QueryError::Unavailable(_)));
        assert_eq!(err.to_string(), "read model unavailable");
    }

    #[tokio::test]
    async fn test_page_echoes_normalized_window() {
        let facade = facade().await;
        let page = facade
            .get_authors(0, 10, &SortOptions::new(), &FilterOptions::new())
            .await
            .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }
}
