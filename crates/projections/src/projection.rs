use async_trait::async_trait;

use event_store::PersistedEvent;

use crate::Result;

/// A read model derived from the event stream.
///
/// Projections are called for every event in the system, in global log
/// order, exactly once each. Implementations dispatch on the envelope's
/// `event_type` tag and deserialize the payloads they know; events of other
/// types are skipped. State is owned exclusively by the single updater
/// driving the projection; readers only call side-effect-free query
/// methods.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name of the projection, used for logging and the status snapshot.
    fn name(&self) -> &'static str;

    /// Applies a single event to the projection's state.
    async fn apply(&mut self, event: &PersistedEvent) -> Result<()>;
}
