//! The read model as seen by the rest of the application.

use async_trait::async_trait;
use events::EventEnvelope;
use sqlx::SqlitePool;

use crate::applier::EventApplier;
use crate::facade::{Page, QueryFacade};
use crate::model::{Author, Blog, Category, Post};
use crate::projection::{Projection, ProjectionPosition};
use crate::scope::{FilterOptions, SortOptions};
use crate::store::EntityStore;
use crate::{QueryError, Result};

/// Query and lifecycle operations of the blog read model.
///
/// Callers depend on this trait rather than on the storage engine behind it.
#[async_trait]
pub trait BlogReadModel: Projection {
    /// Creates or upgrades the schema. Safe to call repeatedly.
    async fn migrate(&self) -> Result<()>;

    async fn get_blog_by_id(&self, id: &str) -> std::result::Result<Blog, QueryError>;

    async fn get_blog_by_url(&self, url: &str) -> std::result::Result<Blog, QueryError>;

    async fn get_posts(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> std::result::Result<Page<Post>, QueryError>;

    async fn get_authors(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> std::result::Result<Page<Author>, QueryError>;

    async fn get_categories(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> std::result::Result<Page<Category>, QueryError>;
}

/// SQL-backed [`BlogReadModel`].
#[derive(Clone)]
pub struct SqlBlogReadModel {
    store: EntityStore,
    applier: EventApplier,
    queries: QueryFacade,
}

impl SqlBlogReadModel {
    pub fn new(pool: SqlitePool) -> Self {
        let store = EntityStore::new(pool);
        Self {
            applier: EventApplier::new(store.clone()),
            queries: QueryFacade::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }
}

#[async_trait]
impl Projection for SqlBlogReadModel {
    fn name(&self) -> &'static str {
        self.applier.name()
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        self.applier.handle(event).await
    }

    async fn position(&self) -> ProjectionPosition {
        self.applier.position().await
    }

    async fn reset(&self) -> Result<()> {
        self.applier.reset().await
    }
}

#[async_trait]
impl BlogReadModel for SqlBlogReadModel {
    async fn migrate(&self) -> Result<()> {
        self.store.migrate().await
    }

    async fn get_blog_by_id(&self, id: &str) -> std::result::Result<Blog, QueryError> {
        self.queries.get_blog_by_id(id).await
    }

    async fn get_blog_by_url(&self, url: &str) -> std::result::Result<Blog, QueryError> {
        self.queries.get_blog_by_url(url).await
    }

    async fn get_posts(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> std::result::Result<Page<Post>, QueryError> {
        self.queries.get_posts(page, limit, sorts, filters).await
    }

    async fn get_authors(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> std::result::Result<Page<Author>, QueryError> {
        self.queries.get_authors(page, limit, sorts, filters).await
    }

    async fn get_categories(
        &self,
        page: u32,
        limit: u32,
        sorts: &SortOptions,
        filters: &FilterOptions,
    ) -> std::result::Result<Page<Category>, QueryError> {
        self.queries.get_categories(page, limit, sorts, filters).await
    }
}
