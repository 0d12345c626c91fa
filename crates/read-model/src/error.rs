//! Read model error types.

use thiserror::Error;

/// Errors raised by the entity store and the event applier.
#[derive(Debug, Error)]
pub enum ReadModelError {
    /// A lookup or update matched no row.
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// An entity arrived without the identifier the write side must assign.
    #[error("{entity} has no identifier")]
    MissingId { entity: &'static str },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An event could not be decoded.
    #[error("Event error: {0}")]
    Event(#[from] events::EventError),

    /// A stored timestamp could not be parsed.
    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Result type for read model operations.
pub type Result<T> = std::result::Result<T, ReadModelError>;

/// Reasons a caller-supplied scope input is discarded.
///
/// These never fail a query; the offending scope is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("unsupported sort key '{0}'")]
    UnknownSortKey(String),

    #[error("unsupported sort direction '{0}'")]
    UnknownDirection(String),

    #[error("malformed date '{0}', expected MM/DD/YY")]
    MalformedDate(String),
}

/// Errors surfaced to callers of the query façade.
///
/// Infrastructure failures are opaque: the display text never includes the
/// underlying storage error, which stays reachable through `source()` for logs.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The lookup key matched nothing.
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// The store failed to answer.
    #[error("read model unavailable")]
    Unavailable(#[source] ReadModelError),
}

impl From<ReadModelError> for QueryError {
    fn from(err: ReadModelError) -> Self {
        match err {
            ReadModelError::NotFound { entity, key } => QueryError::NotFound { entity, key },
            other => QueryError::Unavailable(other),
        }
    }
}
