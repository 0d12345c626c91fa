use thiserror::Error;

/// Errors raised while building or decoding domain events.
#[derive(Debug, Error)]
pub enum EventError {
    /// The envelope is missing a required field.
    #[error("Missing event field: {0}")]
    MissingField(&'static str),

    /// The payload could not be encoded or decoded.
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Result type for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
