//! Integration tests: events and fixtures → entity store → query façade.

use chrono::{DateTime, TimeZone, Utc};
use common::EntityId;
use events::{EventEnvelope, kinds};
use read_model::{
    BlogReadModel, Blog, Category, Direction, EntityStore, FilterOptions, Post, Projection,
    ProjectionProcessor, QueryError, SortKey, SortOptions, SqlBlogReadModel, open,
};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 7, 10, 12, 0, 0).unwrap()
}

fn two_months_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 5, 10, 12, 0, 0).unwrap()
}

fn category(id: &str, title: &str) -> Category {
    Category {
        id: EntityId::new(id),
        title: title.to_string(),
        ..Default::default()
    }
}

fn post(
    id: &str,
    blog_id: &str,
    views: i64,
    publish_date: Option<DateTime<Utc>>,
    categories: Vec<Category>,
) -> Post {
    Post {
        id: EntityId::new(id),
        title: format!("Post {id}"),
        blog_id: EntityId::new(blog_id),
        views,
        publish_date,
        categories,
        ..Default::default()
    }
}

async fn empty_model() -> SqlBlogReadModel {
    let model = SqlBlogReadModel::new(open("sqlite::memory:", 1).await.unwrap());
    model.migrate().await.unwrap();
    model
}

/// Two blogs, two categories and eight posts; seven posts belong to blog 123.
async fn seeded_model() -> SqlBlogReadModel {
    let model = empty_model().await;
    let store: &EntityStore = model.store();

    store
        .create_many(&[
            Blog {
                id: EntityId::new("123"),
                title: "Some Blog 1".to_string(),
                url: "https://ak33m.com".to_string(),
                feed_url: "https://ak33m.com/feed".to_string(),
                ..Default::default()
            },
            Blog {
                id: EntityId::new("456"),
                title: "Some Blog 2".to_string(),
                ..Default::default()
            },
        ])
        .await
        .unwrap();

    let ar = category("c-ar", "ar");
    let vue = category("c-vue", "vue");
    store.create_many(&[ar.clone(), vue.clone()]).await.unwrap();

    store
        .create_many(&[
            post("1", "123", 1, Some(now()), vec![ar.clone(), vue]),
            post("2", "123", 10, Some(now()), vec![ar]),
            post("3", "456", 8, Some(now()), vec![]),
            post("4", "123", 2, Some(two_months_ago()), vec![]),
            post("5", "123", 0, None, vec![]),
            post("6", "123", 4, Some(two_months_ago()), vec![]),
            post("7", "123", 7, Some(two_months_ago()), vec![]),
            post("8", "123", 3, Some(two_months_ago()), vec![]),
        ])
        .await
        .unwrap();

    model
}

fn ids(posts: &[Post]) -> Vec<&str> {
    posts.iter().map(|post| post.id.as_str()).collect()
}

#[tokio::test]
async fn test_posts_by_blog_are_paged_in_insertion_order() {
    let model = seeded_model().await;
    let filters = FilterOptions::new().with_eq("blog_id", "123");

    let page = model
        .get_posts(2, 2, &SortOptions::new(), &filters)
        .await
        .unwrap();

    assert_eq!(page.total, 7);
    assert_eq!(page.page, 2);
    assert_eq!(ids(&page.items), vec!["4", "5"]);
}

#[tokio::test]
async fn test_posts_by_category_count_each_post_once() {
    let model = seeded_model().await;
    let filters = FilterOptions::new().with_category("ar");

    let page = model
        .get_posts(1, 5, &SortOptions::new(), &filters)
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(ids(&page.items), vec!["1", "2"]);
    let titles: Vec<_> = page.items[0]
        .categories
        .iter()
        .map(|category| category.title.as_str())
        .collect();
    assert_eq!(titles, vec!["ar", "vue"]);
}

#[tokio::test]
async fn test_blog_filter_with_category_join_has_no_fan_out() {
    let model = seeded_model().await;
    let filters = FilterOptions::new()
        .with_eq("blog_id", "123")
        .with_category("ar");

    let page = model
        .get_posts(1, 0, &SortOptions::new(), &filters)
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 2);
}

#[tokio::test]
async fn test_posts_between_dates() {
    let model = seeded_model().await;
    let filters = FilterOptions::new().with_dates("06/10/21", "07/10/21");

    let page = model
        .get_posts(1, 2, &SortOptions::new(), &filters)
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(ids(&page.items), vec!["1", "2"]);
}

#[tokio::test]
async fn test_date_range_is_inclusive_of_the_whole_end_day() {
    let model = empty_model().await;
    let last_second = Utc.with_ymd_and_hms(2021, 7, 10, 23, 59, 59).unwrap();
    let next_day = Utc.with_ymd_and_hms(2021, 7, 11, 0, 0, 0).unwrap();
    let first_second = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
    model
        .store()
        .create_many(&[
            post("a", "b", 0, Some(first_second), vec![]),
            post("b", "b", 0, Some(last_second), vec![]),
            post("c", "b", 0, Some(next_day), vec![]),
        ])
        .await
        .unwrap();

    let filters = FilterOptions::new().with_dates("07/01/21", "07/10/21");
    let page = model
        .get_posts(1, 0, &SortOptions::new(), &filters)
        .await
        .unwrap();

    assert_eq!(ids(&page.items), vec!["a", "b"]);
}

#[tokio::test]
async fn test_malformed_dates_disable_only_the_date_scope() {
    let model = seeded_model().await;
    let filters = FilterOptions::new()
        .with_eq("blog_id", "456")
        .with_dates("2021-06-10", "07/10/21");

    let page = model
        .get_posts(1, 0, &SortOptions::new(), &filters)
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(ids(&page.items), vec!["3"]);
}

#[tokio::test]
async fn test_sort_by_views_descending() {
    let model = seeded_model().await;
    let sorts = SortOptions::new().by(SortKey::Views, Direction::Desc);

    let page = model
        .get_posts(1, 3, &sorts, &FilterOptions::new())
        .await
        .unwrap();

    assert_eq!(page.total, 8);
    assert_eq!(ids(&page.items), vec!["2", "3", "7"]);
}

#[tokio::test]
async fn test_unknown_sort_key_is_ignored_and_zero_limit_returns_everything() {
    let model = seeded_model().await;
    let sorts = SortOptions::from_pairs([("title", "asc"), ("views", "sideways")]);
    assert!(sorts.is_empty());

    let page = model
        .get_posts(1, 0, &sorts, &FilterOptions::new())
        .await
        .unwrap();

    assert_eq!(page.total, 8);
    assert_eq!(ids(&page.items), vec!["1", "2", "3", "4", "5", "6", "7", "8"]);
}

#[tokio::test]
async fn test_blog_lookup_by_url_or_feed_url() {
    let model = seeded_model().await;

    let by_url = model.get_blog_by_url("https://ak33m.com").await.unwrap();
    let by_feed = model
        .get_blog_by_url("https://ak33m.com/feed")
        .await
        .unwrap();
    let by_id = model.get_blog_by_id("123").await.unwrap();

    assert_eq!(by_url.id, by_feed.id);
    assert_eq!(by_url.id, by_id.id);
    assert_eq!(by_id.posts.len(), 7);

    let err = model
        .get_blog_by_url("https://nowhere.example")
        .await
        .unwrap_err();
    assert!(
        matches!(err, QueryError::NotFound { ref key, .. } if key == "https://nowhere.example")
    );
}

#[tokio::test]
async fn test_authors_and_categories_are_paged() {
    let model = seeded_model().await;

    let categories = model
        .get_categories(1, 1, &SortOptions::new(), &FilterOptions::new())
        .await
        .unwrap();
    assert_eq!(categories.total, 2);
    assert_eq!(categories.items[0].title, "ar");

    let authors = model
        .get_authors(1, 10, &SortOptions::new(), &FilterOptions::new().with_eq("blog_id", "123"))
        .await
        .unwrap();
    assert_eq!(authors.total, 0);
}

#[tokio::test]
async fn test_events_flow_through_the_processor() {
    let model = Arc::new(empty_model().await);
    let mut processor = ProjectionProcessor::new();
    processor.register(model.clone());

    let history = vec![
        EventEnvelope::builder()
            .event_type(kinds::BLOG_ADDED)
            .entity_id("123")
            .payload_raw(serde_json::json!({
                "id": "123",
                "title": "Old",
                "url": "https://ak33m.com",
                "feedUrl": "https://ak33m.com/feed"
            }))
            .build()
            .unwrap(),
        EventEnvelope::builder()
            .event_type(kinds::BLOG_UPDATED)
            .entity_id("123")
            .payload_raw(serde_json::json!({"title": "New"}))
            .build()
            .unwrap(),
        EventEnvelope::builder()
            .event_type(kinds::AUTHOR_CREATED)
            .entity_id("a1")
            .payload_raw(serde_json::json!({"id": "a1", "name": "Ada", "blogId": "123"}))
            .build()
            .unwrap(),
        EventEnvelope::builder()
            .event_type(kinds::POST_CREATED)
            .entity_id("p1")
            .payload_raw(serde_json::json!({
                "id": "p1",
                "blogId": "123",
                "publishDate": "2021-07-10T12:00:00Z",
                "categories": [{"id": "c1", "title": "rust"}]
            }))
            .build()
            .unwrap(),
        EventEnvelope::builder()
            .event_type("BLOG_DELETED")
            .entity_id("123")
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap(),
    ];

    assert_eq!(processor.replay(history).await.unwrap(), 5);
    assert_eq!(model.position().await.events_seen, 5);

    let blog = model.get_blog_by_url("https://ak33m.com/feed").await.unwrap();
    assert_eq!(blog.title, "New");
    assert_eq!(blog.authors.len(), 1);
    assert_eq!(blog.posts.len(), 1);

    let blogs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blogs")
        .fetch_one(model.store().pool())
        .await
        .unwrap();
    assert_eq!(blogs, 1);

    let posts = model
        .get_posts(1, 10, &SortOptions::new(), &FilterOptions::new().with_category("rust"))
        .await
        .unwrap();
    assert_eq!(posts.total, 1);
}

#[tokio::test]
async fn test_migrate_is_repeatable_and_categories_dedupe_by_title() {
    let model = seeded_model().await;
    model.migrate().await.unwrap();

    let existing = model
        .store()
        .first_or_create_category(&category("another-id", "ar"))
        .await
        .unwrap();
    assert_eq!(existing.id.as_str(), "c-ar");

    let categories = model
        .get_categories(1, 0, &SortOptions::new(), &FilterOptions::new())
        .await
        .unwrap();
    assert_eq!(categories.total, 2);
}
