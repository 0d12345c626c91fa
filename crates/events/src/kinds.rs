//! Event type tags published by the aggregator module.
//!
//! The write side owns these strings; the read model only matches on them.

/// A blog was registered with the aggregator.
pub const BLOG_ADDED: &str = "BLOG_ADDED";

/// Blog details changed. The payload omits the id; it travels in the metadata.
pub const BLOG_UPDATED: &str = "BLOG_UPDATED";

/// An author was discovered on a blog.
pub const AUTHOR_CREATED: &str = "AUTHOR_CREATED";

/// A post was imported from a blog feed.
pub const POST_CREATED: &str = "POST_CREATED";

/// Every event type the read model applies.
pub const CONSUMED: &[&str] = &[BLOG_ADDED, BLOG_UPDATED, AUTHOR_CREATED, POST_CREATED];
