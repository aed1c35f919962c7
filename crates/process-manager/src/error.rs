use thiserror::Error;

use crate::process::ProcessId;

/// Errors raised by the process-manager engine and repository.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process instance was concurrently modified. A losing writer is
    /// reported, never silently dropped.
    #[error("expected version {expected} but was {actual} for process {process_id}")]
    ConcurrencyConflict {
        process_id: ProcessId,
        expected: i64,
        actual: i64,
    },

    /// No process instance with the given ID exists.
    #[error("process not found: {0}")]
    ProcessNotFound(ProcessId),

    /// A process type was registered twice.
    #[error("process already registered: {0}")]
    AlreadyRegistered(&'static str),

    /// A stored instance names a process type no longer registered.
    #[error("no process type registered for {0}")]
    UnknownProcessType(String),

    /// A payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for process-manager operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
