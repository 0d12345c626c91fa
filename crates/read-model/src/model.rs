//! Materialized entities of the blog read model.

use chrono::{DateTime, SecondsFormat, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::Result;
use crate::scope::SortKey;

/// A blog tracked by the aggregator.
///
/// Payload field names are matched in camelCase, with the PascalCase
/// spelling accepted as an alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Blog {
    #[serde(alias = "ID")]
    pub id: EntityId,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "Description")]
    pub description: String,
    #[serde(alias = "URL", alias = "Url")]
    pub url: String,
    #[serde(alias = "FeedURL", alias = "FeedUrl")]
    pub feed_url: String,
    #[serde(alias = "Authors", skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(alias = "Posts", skip_serializing_if = "Vec::is_empty")]
    pub posts: Vec<Post>,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "UpdatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// An author writing for a blog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Author {
    #[serde(alias = "ID")]
    pub id: EntityId,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Email")]
    pub email: String,
    #[serde(alias = "BlogID", alias = "BlogId")]
    pub blog_id: EntityId,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "UpdatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A post imported from a blog feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    #[serde(alias = "ID")]
    pub id: EntityId,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "Description")]
    pub description: String,
    #[serde(alias = "Content")]
    pub content: String,
    #[serde(alias = "BlogID", alias = "BlogId")]
    pub blog_id: EntityId,
    #[serde(alias = "PublishDate")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(alias = "Views")]
    pub views: i64,
    #[serde(alias = "Categories", skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "UpdatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A post category, unique by title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
    #[serde(alias = "ID")]
    pub id: EntityId,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "Description")]
    pub description: String,
    #[serde(alias = "Posts", skip_serializing_if = "Vec::is_empty")]
    pub posts: Vec<Post>,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "UpdatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Static description of an entity's table.
///
/// Every SQL identifier the scope builder emits comes from one of these
/// tables, never from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub table: &'static str,
    /// Columns usable in equality filters.
    pub columns: &'static [&'static str],
    /// Column in `post_categories` referencing this table, if categorized.
    pub category_link: Option<&'static str>,
    pub published_column: Option<&'static str>,
    pub views_column: Option<&'static str>,
}

impl Schema {
    /// Resolves a caller-supplied key to the allow-listed column name.
    pub fn column(&self, key: &str) -> Option<&'static str> {
        self.columns.iter().copied().find(|column| *column == key)
    }

    /// The column a sort key orders by on this table, if any.
    pub fn sort_column(&self, key: SortKey) -> Option<&'static str> {
        match key {
            SortKey::Views => self.views_column,
            SortKey::PublishDate => self.published_column,
        }
    }
}

/// A row type of the read model.
pub trait Entity: Sized + Send + Unpin {
    /// Name used in logs and not-found errors.
    const NAME: &'static str;
    const SCHEMA: Schema;

    fn id(&self) -> &EntityId;

    fn from_row(row: &SqliteRow) -> Result<Self>;
}

impl Entity for Blog {
    const NAME: &'static str = "blog";
    const SCHEMA: Schema = Schema {
        table: "blogs",
        columns: &["id", "title", "description", "url", "feed_url"],
        category_link: None,
        published_column: None,
        views_column: None,
    };

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: EntityId::new(row.try_get::<String, _>("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            url: row.try_get("url")?,
            feed_url: row.try_get("feed_url")?,
            authors: Vec::new(),
            posts: Vec::new(),
            created_at: Some(parse_timestamp(&row.try_get::<String, _>("created_at")?)?),
            updated_at: Some(parse_timestamp(&row.try_get::<String, _>("updated_at")?)?),
        })
    }
}

impl Entity for Author {
    const NAME: &'static str = "author";
    const SCHEMA: Schema = Schema {
        table: "authors",
        columns: &["id", "name", "email", "blog_id"],
        category_link: None,
        published_column: None,
        views_column: None,
    };

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: EntityId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            blog_id: EntityId::new(row.try_get::<String, _>("blog_id")?),
            created_at: Some(parse_timestamp(&row.try_get::<String, _>("created_at")?)?),
            updated_at: Some(parse_timestamp(&row.try_get::<String, _>("updated_at")?)?),
        })
    }
}

impl Entity for Post {
    const NAME: &'static str = "post";
    const SCHEMA: Schema = Schema {
        table: "posts",
        columns: &[
            "id",
            "title",
            "description",
            "content",
            "blog_id",
            "publish_date",
            "views",
        ],
        category_link: Some("post_id"),
        published_column: Some("publish_date"),
        views_column: Some("views"),
    };

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let publish_date = row
            .try_get::<Option<String>, _>("publish_date")?
            .map(|raw| parse_timestamp(&raw))
            .transpose()?;

        Ok(Self {
            id: EntityId::new(row.try_get::<String, _>("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            content: row.try_get("content")?,
            blog_id: EntityId::new(row.try_get::<String, _>("blog_id")?),
            publish_date,
            views: row.try_get("views")?,
            categories: Vec::new(),
            created_at: Some(parse_timestamp(&row.try_get::<String, _>("created_at")?)?),
            updated_at: Some(parse_timestamp(&row.try_get::<String, _>("updated_at")?)?),
        })
    }
}

impl Entity for Category {
    const NAME: &'static str = "category";
    const SCHEMA: Schema = Schema {
        table: "categories",
        columns: &["id", "title", "description"],
        category_link: None,
        published_column: None,
        views_column: None,
    };

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: EntityId::new(row.try_get::<String, _>("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            posts: Vec::new(),
            created_at: Some(parse_timestamp(&row.try_get::<String, _>("created_at")?)?),
            updated_at: Some(parse_timestamp(&row.try_get::<String, _>("updated_at")?)?),
        })
    }
}

/// Formats an instant the way it is stored: fixed-width UTC with microseconds,
/// so text comparison matches chronological order.
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
