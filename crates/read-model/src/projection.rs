//! Projection trait and position tracking.

use async_trait::async_trait;
use events::EventEnvelope;

use crate::Result;

/// Counts the events a projection has seen, applied or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_seen: u64,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self { events_seen: 0 }
    }

    pub fn advance(&self) -> Self {
        Self {
            events_seen: self.events_seen + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_seen)
    }
}

/// Something that folds domain events into a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies one event.
    ///
    /// An `Err` means the projection cannot make progress at all. Failures to
    /// apply an individual event are the projection's own business.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Discards everything projected so far.
    async fn reset(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_advances_from_zero() {
        let pos = ProjectionPosition::zero().advance().advance();
        assert_eq!(pos.events_seen, 2);
        assert_eq!(pos.to_string(), "position(2)");
    }
}
