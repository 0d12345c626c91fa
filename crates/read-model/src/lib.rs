//! Event-driven relational read model for the blog aggregator.
//!
//! - [`EntityStore`] persists blogs, authors, posts and categories in SQLite
//! - [`scope`] turns caller-supplied filters and sorts into safe, composable queries
//! - [`EventApplier`] folds domain events into the store, logging failures
//! - [`QueryFacade`] answers paged queries with typed not-found errors
//! - [`BlogReadModel`] bundles all of the above behind one trait

pub mod applier;
pub mod error;
pub mod facade;
pub mod model;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod scope;
pub mod store;

pub use applier::{EventApplier, Handler};
pub use error::{QueryError, ReadModelError, Result, ScopeError};
pub use facade::{Page, QueryFacade};
pub use model::{Author, Blog, Category, Entity, Post};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::{BlogReadModel, SqlBlogReadModel};
pub use scope::{Direction, FilterOptions, FilterValue, SortKey, SortOptions};
pub use store::{BlogLookup, EntityStore, Record, open};
