//! Message traits and the opaque serialized forms they travel in.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trait for domain events.
///
/// Events are business-level facts that happened in the past. They must not
/// be changed after publication and are always read back in the order they
/// happened. Event enums use `#[serde(tag = "type", content = "data")]` so
/// the serialized payload carries the same discriminator `event_type`
/// returns.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name used as the storage discriminator.
    fn event_type(&self) -> &'static str;
}

/// Trait for commands.
///
/// Commands are requests to perform a business-level operation and may be
/// rejected by the aggregate they target.
pub trait CommandMessage: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// The type tag this command is registered and routed under.
    const TYPE: &'static str;

    fn command_type(&self) -> &'static str {
        Self::TYPE
    }
}

/// Trait for queries. Queries must not modify state.
pub trait QueryMessage: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// The type tag this query is registered and routed under.
    const TYPE: &'static str;

    fn query_type(&self) -> &'static str {
        Self::TYPE
    }
}

/// Correlation topics of an event.
///
/// Process-manager instances subscribe to topics; an event is routed to every
/// instance subscribed to any of the event's topics. Each event type declares
/// its identity-carrying fields explicitly here instead of having them
/// discovered through runtime type inspection.
pub trait EventTopics {
    /// The topics this event correlates to, e.g. the entity IDs it mentions.
    fn topics(&self) -> Vec<Uuid>;
}

/// The opaque, stored form of an event: a type discriminator plus the payload
/// serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl EventData {
    /// Serializes a typed event into its stored form.
    pub fn encode<E: DomainEvent>(event: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// Deserializes the payload back into a typed event.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// The opaque, forwarded form of a command, mirroring [`EventData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    pub command_type: String,
    pub payload: serde_json::Value,
}

impl CommandData {
    /// Serializes a typed command into its forwarded form.
    pub fn encode<C: CommandMessage>(command: &C) -> Result<Self, serde_json::Error> {
        Ok(Self {
            command_type: command.command_type().to_string(),
            payload: serde_json::to_value(command)?,
        })
    }

    /// Deserializes the payload back into a typed command.
    pub fn decode<C: CommandMessage>(&self) -> Result<C, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum TestEvent {
        ValueChanged { value: String },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::ValueChanged { .. } => "ValueChanged",
            }
        }
    }

    #[test]
    fn event_data_roundtrip() {
        let event = TestEvent::ValueChanged {
            value: "foo".to_string(),
        };
        let data = EventData::encode(&event).unwrap();
        assert_eq!(data.event_type, "ValueChanged");
        assert_eq!(data.decode::<TestEvent>().unwrap(), event);
    }

    #[test]
    fn event_data_payload_carries_the_type_tag() {
        let event = TestEvent::ValueChanged {
            value: "foo".to_string(),
        };
        let data = EventData::encode(&event).unwrap();
        assert_eq!(data.payload["type"], "ValueChanged");
    }
}
