use std::sync::Mutex;

use crate::envelope::Envelope;
use crate::message::CommandData;

/// Outbound side of the messaging infrastructure: process managers hand the
/// commands they publish to a gateway, which forwards them to the command
/// dispatch layer.
pub trait MessageGateway: Send + Sync {
    fn send(&self, command: Envelope<CommandData>);
}

impl<G: MessageGateway + ?Sized> MessageGateway for std::sync::Arc<G> {
    fn send(&self, command: Envelope<CommandData>) {
        (**self).send(command);
    }
}

/// A gateway that records everything sent through it. Useful as a test spy
/// and for inspecting saga output without wiring the full dispatch loop.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Envelope<CommandData>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages sent so far, in order.
    pub fn sent(&self) -> Vec<Envelope<CommandData>> {
        self.sent.lock().unwrap().clone()
    }

    /// The most recently sent message.
    pub fn latest(&self) -> Option<Envelope<CommandData>> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl MessageGateway for RecordingGateway {
    fn send(&self, command: Envelope<CommandData>) {
        self.sent.lock().unwrap().push(command);
    }
}
