use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{CommandData, CommandMessage};
use event_store::EventEnvelope;

use crate::error::Result;

/// Identity of a process-manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Creates a new time-ordered process ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a process ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collects the commands a process publishes while handling one event.
///
/// During replay the buffer is cleared after every historical event, so side
/// effects are only ever forwarded for the genuinely new event.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<CommandData>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a command to be forwarded after the event is handled.
    pub fn publish<C: CommandMessage>(&mut self, command: &C) -> Result<()> {
        self.commands.push(CommandData::encode(command)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discards everything published so far.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Takes the published commands, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<CommandData> {
        std::mem::take(&mut self.commands)
    }
}

/// State of one process-manager type.
///
/// `apply` is called for every event routed to an instance, both during
/// replay and for new events; implementations dispatch on the envelope's
/// `event_type` tag and must be deterministic, since the instance state is
/// rebuilt from history on every load.
pub trait Process: Send + Sync {
    fn apply(&mut self, event: &EventEnvelope, commands: &mut CommandBuffer) -> Result<()>;
}
