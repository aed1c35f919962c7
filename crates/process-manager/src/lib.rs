//! Process managers (sagas): stateful reactors over the event stream.
//!
//! A process instance is reconstructed by replaying its own private history;
//! incoming events are routed to instances by correlation topics; handling an
//! event may publish follow-up commands, forwarded to a message gateway with
//! the instance's ID as their correlation ID.

pub mod engine;
pub mod error;
pub mod process;
pub mod repo;

pub use engine::{ProcessDescriptor, ProcessManagers, ProcessManagersProjection};
pub use error::{ProcessError, Result};
pub use process::{CommandBuffer, Process, ProcessId};
pub use repo::{
    InMemoryProcessRepo, PersistedProcess, ProcessHistoryEntry, ProcessManager, ProcessRepo,
};
