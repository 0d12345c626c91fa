//! Applies domain events to the entity store.
//!
//! The applier degrades silently: an event that cannot be decoded or written
//! is logged and counted, and processing moves on. Event types without a
//! registered handler are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::EntityId;
use events::{EventEnvelope, kinds};
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use crate::model::{Author, Blog, Post};
use crate::projection::{Projection, ProjectionPosition};
use crate::store::EntityStore;
use crate::{ReadModelError, Result};

/// Writes one event into the store.
pub type Handler = for<'a> fn(&'a EntityStore, &'a EventEnvelope) -> BoxFuture<'a, Result<()>>;

/// Dispatches events to handlers by type tag.
#[derive(Clone)]
pub struct EventApplier {
    store: EntityStore,
    handlers: HashMap<&'static str, Handler>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl EventApplier {
    /// Creates an applier subscribed to the blog lifecycle events.
    pub fn new(store: EntityStore) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
        }
        .on(kinds::BLOG_ADDED, blog_added)
        .on(kinds::BLOG_UPDATED, blog_updated)
        .on(kinds::AUTHOR_CREATED, author_created)
        .on(kinds::POST_CREATED, post_created)
    }

    /// Registers (or replaces) the handler for an event type.
    pub fn on(mut self, event_type: &'static str, handler: Handler) -> Self {
        self.handlers.insert(event_type, handler);
        self
    }

    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Applies one event. Never fails; failures end up in the log.
    #[tracing::instrument(
        skip(self, event),
        fields(event_type = %event.event_type, entity_id = %event.entity_id())
    )]
    pub async fn apply(&self, event: &EventEnvelope) {
        match self.handlers.get_key_value(event.event_type.as_str()) {
            None => tracing::trace!("no handler for event type"),
            Some((kind, handler)) => match handler(&self.store, event).await {
                Ok(()) => {
                    metrics::counter!("read_model_events_applied_total", "event_type" => *kind)
                        .increment(1);
                    tracing::debug!("event applied");
                }
                Err(err) => {
                    metrics::counter!("read_model_event_failures_total", "event_type" => *kind)
                        .increment(1);
                    match &err {
                        ReadModelError::NotFound { .. } => {
                            tracing::warn!(error = %err, "event refers to a missing entity")
                        }
                        _ => tracing::error!(error = %err, "failed to apply event"),
                    }
                }
            },
        }

        let mut pos = self.position.write().await;
        *pos = pos.advance();
    }
}

#[async_trait]
impl Projection for EventApplier {
    fn name(&self) -> &'static str {
        "BlogReadModel"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        self.apply(event).await;
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.store.clear().await?;
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

fn blog_added<'a>(store: &'a EntityStore, event: &'a EventEnvelope) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut blog: Blog = event.decode()?;
        fill_id(&mut blog.id, event);
        store.create(&blog).await
    })
}

/// The payload carries only the changed fields; the target comes from the
/// event metadata.
fn blog_updated<'a>(
    store: &'a EntityStore,
    event: &'a EventEnvelope,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut blog: Blog = event.decode()?;
        blog.id = event.entity_id().clone();
        store.update_blog(&blog).await
    })
}

fn author_created<'a>(
    store: &'a EntityStore,
    event: &'a EventEnvelope,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut author: Author = event.decode()?;
        fill_id(&mut author.id, event);
        store.create(&author).await
    })
}

fn post_created<'a>(store: &'a EntityStore, event: &'a EventEnvelope) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut post: Post = event.decode()?;
        fill_id(&mut post.id, event);
        store.create(&post).await
    })
}

/// Creation payloads may omit the id; the event metadata names the entity.
fn fill_id(id: &mut EntityId, event: &EventEnvelope) {
    if id.is_empty() {
        *id = event.entity_id().clone();
    }
}
