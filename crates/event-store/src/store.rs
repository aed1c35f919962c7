use async_trait::async_trait;

use common::{GlobalPosition, StreamId, StreamVersion};

use crate::Result;
use crate::event::{EventEnvelope, PersistedEvent};

/// Core contract of the event store.
///
/// All implementations must be thread-safe. Within one stream the append
/// order is strict; across streams the global order is a valid interleaving
/// of every stream's order, so if event A precedes event B in a stream, A's
/// global position is less than B's.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to the stream if its current version equals
    /// `expected_version`, and returns the global position after the last
    /// appended event.
    ///
    /// The append is atomic: either all events are stored, in order, with
    /// consecutive stream versions and consecutive global positions, or none
    /// are. A version mismatch fails with
    /// [`EventStoreError::ConcurrencyConflict`](crate::EventStoreError::ConcurrencyConflict)
    /// reporting both the expected and the actual version.
    async fn save_events(
        &self,
        stream_id: StreamId,
        new_events: Vec<EventEnvelope>,
        expected_version: StreamVersion,
    ) -> Result<GlobalPosition>;

    /// Returns the events of the stream with version strictly greater than
    /// `since_version`, in version order.
    ///
    /// A stream that does not exist is reported as empty, not as an error.
    async fn events_for_stream(
        &self,
        stream_id: StreamId,
        since_version: StreamVersion,
    ) -> Result<Vec<PersistedEvent>>;

    /// Returns all events across all streams with position strictly greater
    /// than `since_position`, in position order.
    async fn all_events(&self, since_position: GlobalPosition) -> Result<Vec<PersistedEvent>>;

    /// Returns the current version of the stream; `StreamVersion::BEGINNING`
    /// for a stream that does not exist.
    async fn current_version(&self, stream_id: StreamId) -> Result<StreamVersion>;

    /// Returns the global position of the latest stored event.
    async fn current_position(&self) -> Result<GlobalPosition>;
}
