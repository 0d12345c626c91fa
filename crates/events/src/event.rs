use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EventError, Result};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Metadata attached to every domain event by the write side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// The entity the event is about.
    #[serde(default)]
    pub entity_id: EntityId,

    /// The kind of entity (e.g. "Blog").
    #[serde(default)]
    pub entity_type: String,

    /// Position of the event in the entity's stream.
    #[serde(default)]
    pub sequence_no: i64,

    /// Anything else the write side chose to attach.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A domain event as delivered by the aggregator module.
///
/// The payload is the JSON encoding of the entity the event describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    #[serde(default)]
    pub event_id: EventId,

    /// The event type tag, one of the constants in [`crate::kinds`].
    #[serde(rename = "type")]
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Metadata about the event.
    #[serde(default)]
    pub meta: EventMeta,

    /// When the event was raised.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Decodes the payload into an entity.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }

    /// The entity identifier carried in the metadata.
    pub fn entity_id(&self) -> &EntityId {
        &self.meta.entity_id
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    meta: EventMeta,
    timestamp: Option<DateTime<Utc>>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from JSON-encoded bytes.
    pub fn payload_bytes(mut self, bytes: &[u8]) -> Result<Self> {
        self.payload = Some(serde_json::from_slice(bytes)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the entity identifier in the metadata.
    pub fn entity_id(mut self, id: impl Into<EntityId>) -> Self {
        self.meta.entity_id = id.into();
        self
    }

    /// Sets the entity type in the metadata.
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.meta.entity_type = entity_type.into();
        self
    }

    /// Sets the stream position in the metadata.
    pub fn sequence_no(mut self, sequence_no: i64) -> Self {
        self.meta.sequence_no = sequence_no;
        self
    }

    /// Adds an extra metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.extra.insert(key.into(), value);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builds the event envelope, failing if the type or payload is missing.
    pub fn build(self) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self
                .event_type
                .ok_or(EventError::MissingField("event_type"))?,
            payload: self.payload.ok_or(EventError::MissingField("payload"))?,
            meta: self.meta,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}
