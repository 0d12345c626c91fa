pub mod error;
pub mod event;
pub mod kinds;

pub use common::EntityId;
pub use error::{EventError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, EventMeta};
