use thiserror::Error;

use common::{StreamId, StreamVersion};

/// Errors that can occur when interacting with the event store.
///
/// Backend-specific failures are translated into this taxonomy at the store
/// boundary; callers never see a raw database error type in a variant other
/// than `Database`.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream was concurrently modified: the expected version did not
    /// match the actual version. The caller is expected to reload and retry;
    /// the store never retries on its own.
    #[error("expected version {expected} but was {actual} for stream {stream_id}")]
    ConcurrencyConflict {
        stream_id: StreamId,
        expected: StreamVersion,
        actual: StreamVersion,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
