use thiserror::Error;

use common::StreamId;
use event_store::EventStoreError;

/// Errors raised when loading or saving aggregates.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested entity has no events, i.e. it was never created.
    #[error("entity not found: {0}")]
    EntityNotFound(StreamId),

    /// An event store error, including optimistic-concurrency conflicts,
    /// which propagate to the caller verbatim.
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    /// An event payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
