//! Shared message model for the event-sourcing runtime.
//!
//! Everything that flows through the system is a message: commands ask for a
//! business operation, events record one that happened, queries read derived
//! state. This crate defines their identities, the envelope that carries
//! correlation/causation metadata, the request-scoped context that replaces
//! ambient thread-local state, and the type-tag-keyed dispatch registries.

pub mod dispatch;
pub mod envelope;
pub mod gateway;
pub mod ids;
pub mod message;
pub mod position;
pub mod scope;

pub use dispatch::{
    send_command, CommandDispatcher, CommandRouter, Commit, DispatchError, HandlesCommand,
    HandlesQuery, QueryRouter,
};
pub use envelope::Envelope;
pub use gateway::{MessageGateway, RecordingGateway};
pub use ids::{MessageId, StreamId};
pub use message::{CommandData, CommandMessage, DomainEvent, EventData, EventTopics, QueryMessage};
pub use position::{GlobalPosition, StreamVersion};
pub use scope::{MessageContext, ObservedPosition, RequestScope, OBSERVED_POSITION_HEADER};
