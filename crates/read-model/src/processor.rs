//! Delivers events to registered projections.

use std::sync::Arc;

use events::EventEnvelope;

use crate::Result;
use crate::projection::Projection;

/// Fans events out to every registered projection.
///
/// This is the seam the surrounding application subscribes the read model
/// through: live events go to [`process_event`](Self::process_event), and a
/// recorded history can be fed through [`replay`](Self::replay).
#[derive(Default)]
pub struct ProjectionProcessor {
    projections: Vec<Arc<dyn Projection>>,
}

impl ProjectionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        tracing::info!(projection = projection.name(), "projection registered");
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Delivers a single event to all registered projections.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        metrics::counter!("read_model_events_received_total").increment(1);
        Ok(())
    }

    /// Feeds a history of events in order. A projection that has already seen
    /// the first `n` events skips them. Returns the number of events read.
    #[tracing::instrument(skip(self, history))]
    pub async fn replay<I>(&self, history: I) -> Result<u64>
    where
        I: IntoIterator<Item = EventEnvelope>,
    {
        let mut event_index: u64 = 0;

        for event in history {
            event_index += 1;
            for projection in &self.projections {
                if projection.position().await.events_seen < event_index {
                    projection.handle(&event).await?;
                }
            }
        }

        tracing::info!(events = event_index, "replay complete");
        Ok(event_index)
    }

    /// Resets every projection and replays the history from scratch.
    #[tracing::instrument(skip(self, history))]
    pub async fn rebuild<I>(&self, history: I) -> Result<u64>
    where
        I: IntoIterator<Item = EventEnvelope>,
    {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.replay(history).await
    }
}
