use serde::{Deserialize, Serialize};

use common::{DomainEvent, Envelope, EventData, GlobalPosition, StreamId, StreamVersion};

/// An event as it travels to and from the store: the causality-carrying
/// envelope around an opaque payload with its type discriminator.
pub type EventEnvelope = Envelope<EventData>;

/// An event as the store hands it back: the envelope plus where it landed,
/// both in its own stream and in the global log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub event: EventEnvelope,
    pub stream_id: StreamId,
    pub version: StreamVersion,
    pub position: GlobalPosition,
}

impl PersistedEvent {
    /// Deserializes the payload back into a typed event.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, serde_json::Error> {
        self.event.payload.decode()
    }

    /// The payload's type discriminator.
    pub fn event_type(&self) -> &str {
        &self.event.payload.event_type
    }
}
