//! SQLite-backed entity store.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use common::EntityId;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::model::{Author, Blog, Category, Entity, Post, format_timestamp, parse_timestamp};
use crate::scope::{FilterValue, Join, Predicate, Query, Scope};
use crate::{ReadModelError, Result};

/// Opens a connection pool. In-memory databases are pinned to a single
/// connection that never expires, since the data lives only as long as it.
pub async fn open(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    Ok(pool_options.connect_with(options).await?)
}

/// How to find a single blog.
#[derive(Debug, Clone, Copy)]
pub enum BlogLookup<'a> {
    Id(&'a str),
    /// Matches either the site URL or the feed URL.
    Url(&'a str),
}

/// An entity the store knows how to write.
#[async_trait]
pub trait Record: Entity + Sync {
    /// Inserts the entity (and whatever it owns) using `now` as its timestamps.
    async fn insert(&self, conn: &mut SqliteConnection, now: &str) -> Result<()>;
}

/// Persistent, queryable representation of blogs, authors, posts and categories.
///
/// Cloning is cheap; every clone shares the same pool.
#[derive(Clone)]
pub struct EntityStore {
    pool: SqlitePool,
}

impl EntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates or upgrades the schema. Safe to run any number of times.
    #[tracing::instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("read model schema up to date");
        Ok(())
    }

    #[tracing::instrument(skip(self, entity), fields(entity = T::NAME, id = %entity.id()))]
    pub async fn create<T: Record>(&self, entity: &T) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        entity.insert(&mut *tx, &now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts all entities in one transaction.
    #[tracing::instrument(skip(self, entities), fields(entity = T::NAME, count = entities.len()))]
    pub async fn create_many<T: Record>(&self, entities: &[T]) -> Result<()> {
        let now = now();
        let mut tx = self.pool.begin().await?;
        for entity in entities {
            entity.insert(&mut *tx, &now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes every projected row, leaving the schema in place.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["post_categories", "posts", "authors", "categories", "blogs"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Merges the non-empty scalar fields of `blog` into the stored row.
    #[tracing::instrument(skip(self, blog), fields(id = %blog.id))]
    pub async fn update_blog(&self, blog: &Blog) -> Result<()> {
        require_id::<Blog>(&blog.id)?;

        let mut update = QueryBuilder::<Sqlite>::new("UPDATE blogs SET updated_at = ");
        update.push_bind(now());
        for (column, value) in [
            ("title", &blog.title),
            ("description", &blog.description),
            ("url", &blog.url),
            ("feed_url", &blog.feed_url),
        ] {
            if !value.is_empty() {
                update.push(", ").push(column).push(" = ").push_bind(value.clone());
            }
        }
        update
            .push(" WHERE id = ")
            .push_bind(blog.id.as_str().to_owned());

        let result = update.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(ReadModelError::NotFound {
                entity: Blog::NAME,
                key: blog.id.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the category with the same title, creating it if there is none.
    pub async fn first_or_create_category(&self, category: &Category) -> Result<Category> {
        let mut conn = self.pool.acquire().await?;
        fetch_or_insert_category(&mut conn, category, &now()).await
    }

    /// Runs scopes against `T`'s table and returns the page plus the number
    /// of distinct matching rows before pagination.
    #[tracing::instrument(skip(self, scopes), fields(table = T::SCHEMA.table))]
    pub async fn find_scoped<T: Entity>(&self, scopes: Vec<Scope>) -> Result<(Vec<T>, i64)> {
        let query = Query::new(T::SCHEMA).scopes(scopes);
        let root = query.root();

        let mut select = QueryBuilder::<Sqlite>::new("SELECT ");
        select.push(root).push(".*");
        push_source(&mut select, &query);
        if !query.joins().is_empty() {
            select.push(" GROUP BY ").push(root).push(".id");
        }
        select.push(" ORDER BY ");
        for (column, direction) in query.order() {
            select.push(column).push(direction.as_sql()).push(", ");
        }
        select.push(root).push(".rowid LIMIT ");
        match query.limit() {
            Some(limit) => {
                select.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
            }
            None => {
                select.push("-1");
            }
        }
        select
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(T::from_row).collect::<Result<Vec<_>>>()?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT ");
        count.push(root).push(".id)");
        push_source(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        tracing::debug!(returned = items.len(), total, "scoped query complete");
        Ok((items, total))
    }

    /// Finds one blog and loads its authors and posts.
    #[tracing::instrument(skip(self))]
    pub async fn find_blog(&self, lookup: BlogLookup<'_>) -> Result<Option<Blog>> {
        let row = match lookup {
            BlogLookup::Id(id) => {
                sqlx::query("SELECT * FROM blogs WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            BlogLookup::Url(url) => {
                sqlx::query(
                    "SELECT * FROM blogs WHERE url = ? OR feed_url = ? ORDER BY rowid LIMIT 1",
                )
                .bind(url)
                .bind(url)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let Some(row) = row else {
            return Ok(None);
        };
        let mut blog = Blog::from_row(&row)?;
        self.load_blog_associations(&mut blog).await?;
        Ok(Some(blog))
    }

    pub async fn load_blog_associations(&self, blog: &mut Blog) -> Result<()> {
        let authors = sqlx::query("SELECT * FROM authors WHERE blog_id = ? ORDER BY rowid")
            .bind(blog.id.as_str())
            .fetch_all(&self.pool)
            .await?;
        blog.authors = authors
            .iter()
            .map(Author::from_row)
            .collect::<Result<_>>()?;

        let posts = sqlx::query("SELECT * FROM posts WHERE blog_id = ? ORDER BY rowid")
            .bind(blog.id.as_str())
            .fetch_all(&self.pool)
            .await?;
        blog.posts = posts.iter().map(Post::from_row).collect::<Result<_>>()?;
        Ok(())
    }

    /// Fills in each post's categories with a single query.
    pub async fn load_post_categories(&self, posts: &mut [Post]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT post_categories.post_id AS link_post_id, categories.* \
             FROM post_categories \
             JOIN categories ON categories.id = post_categories.category_id \
             WHERE post_categories.post_id IN (",
        );
        let mut ids = select.separated(", ");
        for post in posts.iter() {
            ids.push_bind(post.id.as_str().to_owned());
        }
        ids.push_unseparated(") ORDER BY post_categories.rowid");

        let rows = select.build().fetch_all(&self.pool).await?;
        let mut by_post: HashMap<String, Vec<Category>> = HashMap::new();
        for row in &rows {
            let post_id: String = row.try_get("link_post_id")?;
            by_post
                .entry(post_id)
                .or_default()
                .push(Category::from_row(row)?);
        }

        for post in posts.iter_mut() {
            post.categories = by_post.remove(post.id.as_str()).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl Record for Blog {
    async fn insert(&self, conn: &mut SqliteConnection, now: &str) -> Result<()> {
        require_id::<Self>(&self.id)?;

        sqlx::query(
            "INSERT INTO blogs (id, title, description, url, feed_url, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(&self.title)
        .bind(&self.description)
        .bind(&self.url)
        .bind(&self.feed_url)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        for author in &self.authors {
            let author = Author {
                blog_id: self.id.clone(),
                ..author.clone()
            };
            author.insert(&mut *conn, now).await?;
        }
        for post in &self.posts {
            let post = Post {
                blog_id: self.id.clone(),
                ..post.clone()
            };
            post.insert(&mut *conn, now).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Record for Author {
    async fn insert(&self, conn: &mut SqliteConnection, now: &str) -> Result<()> {
        require_id::<Self>(&self.id)?;

        sqlx::query(
            "INSERT INTO authors (id, name, email, blog_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(&self.name)
        .bind(&self.email)
        .bind(self.blog_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Record for Post {
    async fn insert(&self, conn: &mut SqliteConnection, now: &str) -> Result<()> {
        require_id::<Self>(&self.id)?;

        sqlx::query(
            "INSERT INTO posts \
             (id, title, description, content, blog_id, publish_date, views, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(&self.title)
        .bind(&self.description)
        .bind(&self.content)
        .bind(self.blog_id.as_str())
        .bind(self.publish_date.as_ref().map(format_timestamp))
        .bind(self.views)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        for category in &self.categories {
            let stored = fetch_or_insert_category(&mut *conn, category, now).await?;
            sqlx::query("INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?, ?)")
                .bind(self.id.as_str())
                .bind(stored.id.as_str())
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

/// Categories are unique by title, so creating one that exists is a no-op.
#[async_trait]
impl Record for Category {
    async fn insert(&self, conn: &mut SqliteConnection, now: &str) -> Result<()> {
        fetch_or_insert_category(conn, self, now).await?;
        Ok(())
    }
}

async fn fetch_or_insert_category(
    conn: &mut SqliteConnection,
    category: &Category,
    now: &str,
) -> Result<Category> {
    let existing = sqlx::query("SELECT * FROM categories WHERE title = ? LIMIT 1")
        .bind(&category.title)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(row) = existing {
        return Category::from_row(&row);
    }

    require_id::<Category>(&category.id)?;
    sqlx::query(
        "INSERT INTO categories (id, title, description, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(category.id.as_str())
    .bind(&category.title)
    .bind(&category.description)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let stamp = parse_timestamp(now)?;
    Ok(Category {
        posts: Vec::new(),
        created_at: Some(stamp),
        updated_at: Some(stamp),
        ..category.clone()
    })
}

/// Appends FROM, joins and WHERE for a scoped query.
fn push_source(builder: &mut QueryBuilder<'_, Sqlite>, query: &Query) {
    let root = query.root();
    builder.push(" FROM ").push(root);

    for join in query.joins() {
        match join {
            Join::Categories { link_column } => {
                builder
                    .push(" LEFT JOIN post_categories ON post_categories.")
                    .push(link_column)
                    .push(" = ")
                    .push(root)
                    .push(".id LEFT JOIN categories ON categories.id = post_categories.category_id");
            }
        }
    }

    for (index, predicate) in query.predicates().iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        match predicate {
            Predicate::Eq { column, value } => {
                builder.push(column).push(" = ");
                push_value(builder, value);
            }
            Predicate::Between { column, range } => {
                builder
                    .push(column)
                    .push(" BETWEEN ")
                    .push_bind(format_timestamp(&range.start))
                    .push(" AND ")
                    .push_bind(format_timestamp(&range.end));
            }
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &FilterValue) {
    match value {
        FilterValue::Text(text) => builder.push_bind(text.clone()),
        FilterValue::Integer(number) => builder.push_bind(*number),
        FilterValue::Float(number) => builder.push_bind(*number),
        FilterValue::Bool(flag) => builder.push_bind(*flag),
    };
}

fn require_id<T: Entity>(id: &EntityId) -> Result<()> {
    if id.is_empty() {
        return Err(ReadModelError::MissingId { entity: T::NAME });
    }
    Ok(())
}

fn now() -> String {
    format_timestamp(&Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{FilterOptions, SortOptions, pipeline};

    async fn test_store() -> EntityStore {
        let pool = open("sqlite::memory:", 1).await.unwrap();
        let store = EntityStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn blog(id: &str, url: &str, feed_url: &str) -> Blog {
        Blog {
            id: EntityId::new(id),
            title: format!("Blog {id}"),
            url: url.to_string(),
            feed_url: feed_url.to_string(),
            ..Default::default()
        }
    }

    fn category(id: &str, title: &str) -> Category {
        Category {
            id: EntityId::new(id),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = test_store().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'posts'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_blog_found_by_url_and_feed_url() {
        let store = test_store().await;
        store
            .create(&blog("b1", "https://ak33m.com", "https://ak33m.com/feed"))
            .await
            .unwrap();

        let by_url = store
            .find_blog(BlogLookup::Url("https://ak33m.com"))
            .await
            .unwrap()
            .unwrap();
        let by_feed = store
            .find_blog(BlogLookup::Url("https://ak33m.com/feed"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_url.id, by_feed.id);

        let miss = store
            .find_blog(BlogLookup::Url("https://AK33M.com"))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_blog_create_includes_owned_authors_and_posts() {
        let store = test_store().await;
        let mut new_blog = blog("b1", "https://a.example", "");
        new_blog.authors.push(Author {
            id: EntityId::new("a1"),
            name: "Ada".to_string(),
            ..Default::default()
        });
        new_blog.posts.push(Post {
            id: EntityId::new("p1"),
            title: "Hello".to_string(),
            blog_id: EntityId::new("elsewhere"),
            ..Default::default()
        });
        store.create(&new_blog).await.unwrap();

        let stored = store.find_blog(BlogLookup::Id("b1")).await.unwrap().unwrap();
        assert_eq!(stored.authors.len(), 1);
        assert_eq!(stored.authors[0].blog_id.as_str(), "b1");
        assert_eq!(stored.posts.len(), 1);
        assert_eq!(stored.posts[0].blog_id.as_str(), "b1");
    }

    #[tokio::test]
    async fn test_update_merges_non_empty_fields() {
        let store = test_store().await;
        let mut original = blog("b1", "https://a.example", "https://a.example/rss");
        original.description = "first".to_string();
        store.create(&original).await.unwrap();

        let patch = Blog {
            id: EntityId::new("b1"),
            title: "Renamed".to_string(),
            ..Default::default()
        };
        store.update_blog(&patch).await.unwrap();

        let stored = store.find_blog(BlogLookup::Id("b1")).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.description, "first");
        assert_eq!(stored.feed_url, "https://a.example/rss");
    }

    #[tokio::test]
    async fn test_update_of_missing_blog_is_not_found() {
        let store = test_store().await;
        let err = store.update_blog(&blog("nope", "", "")).await.unwrap_err();
        assert!(matches!(err, ReadModelError::NotFound { entity: "blog", .. }));
    }

    #[tokio::test]
    async fn test_create_requires_an_identifier() {
        let store = test_store().await;
        let err = store.create(&blog("", "https://x", "")).await.unwrap_err();
        assert!(matches!(err, ReadModelError::MissingId { entity: "blog" }));
    }

    #[tokio::test]
    async fn test_categories_resolve_by_title() {
        let store = test_store().await;
        let first = store
            .first_or_create_category(&category("c1", "rust"))
            .await
            .unwrap();
        let second = store
            .first_or_create_category(&category("c2", "rust"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        store
            .create_many(&[category("c3", "rust"), category("c4", "go")])
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_post_categories_are_linked_and_preloaded() {
        let store = test_store().await;
        let post = Post {
            id: EntityId::new("p1"),
            blog_id: EntityId::new("b1"),
            categories: vec![category("c1", "ar"), category("c2", "vue")],
            ..Default::default()
        };
        store.create(&post).await.unwrap();

        let (mut posts, total) = store
            .find_scoped::<Post>(pipeline(&FilterOptions::new(), 1, 0, &SortOptions::new()))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(posts[0].categories.is_empty());

        store.load_post_categories(&mut posts).await.unwrap();
        let titles: Vec<_> = posts[0].categories.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["ar", "vue"]);
    }

    #[tokio::test]
    async fn test_duplicate_creation_is_rejected_by_primary_key() {
        let store = test_store().await;
        store.create(&blog("b1", "https://a", "")).await.unwrap();
        let err = store.create(&blog("b1", "https://a", "")).await.unwrap_err();
        assert!(matches!(err, ReadModelError::Database(_)));
    }
}
