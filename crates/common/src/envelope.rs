use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::MessageId;
use crate::scope::MessageContext;

/// Wraps a message payload with the identities that make causality traceable.
///
/// Every message descended from the same logical operation shares one
/// correlation ID; the causation ID names the message that directly caused
/// this one and is absent for an origin message. The causation ID is never
/// the envelope's own message ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub message_id: MessageId,
    pub correlation_id: Uuid,
    pub causation_id: Option<MessageId>,
    pub payload: M,
}

impl<M> Envelope<M> {
    /// Creates an envelope within the given context.
    ///
    /// If the context carries a cause, the new envelope inherits its
    /// correlation ID and records its message ID as the causation ID.
    /// Otherwise this is an origin message starting a fresh correlation
    /// chain.
    pub fn new(payload: M, context: &MessageContext) -> Self {
        let message_id = MessageId::new();
        match context.cause() {
            Some(cause) => Self {
                message_id,
                correlation_id: cause.correlation_id,
                causation_id: Some(cause.message_id),
                payload,
            },
            None => Self {
                message_id,
                correlation_id: Uuid::now_v7(),
                causation_id: None,
                payload,
            },
        }
    }

    /// Creates an envelope directly caused by another message.
    pub fn caused_by<C>(payload: M, cause: &Envelope<C>) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id: cause.correlation_id,
            causation_id: Some(cause.message_id),
            payload,
        }
    }

    /// Replaces the correlation ID, e.g. to correlate a command to the
    /// process-manager instance that published it.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}
