use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use common::{GlobalPosition, StreamId, StreamVersion};

use crate::error::EventStoreError;
use crate::event::{EventEnvelope, PersistedEvent};
use crate::store::EventStore;
use crate::Result;

/// In-memory event store. Process-lifetime only; satisfies the same contract
/// as the PostgreSQL implementation.
///
/// Each stream has its own lock, so writers to unrelated streams only
/// contend on the global log where positions are assigned. The lock order is
/// always stream first, then log.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<StreamId, Arc<Mutex<Vec<PersistedEvent>>>>>>,
    log: Arc<Mutex<Vec<PersistedEvent>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn stream(&self, stream_id: StreamId) -> Arc<Mutex<Vec<PersistedEvent>>> {
        if let Some(stream) = self.streams.read().await.get(&stream_id) {
            return Arc::clone(stream);
        }
        let mut streams = self.streams.write().await;
        Arc::clone(streams.entry(stream_id).or_default())
    }
}

fn read_since(events: &[PersistedEvent], since: i64) -> Vec<PersistedEvent> {
    let since = since.max(0) as usize;
    events.get(since..).unwrap_or(&[]).to_vec()
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save_events(
        &self,
        stream_id: StreamId,
        new_events: Vec<EventEnvelope>,
        expected_version: StreamVersion,
    ) -> Result<GlobalPosition> {
        let stream = self.stream(stream_id).await;
        let mut events = stream.lock().await;

        let actual = StreamVersion::new(events.len() as i64);
        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        let mut log = self.log.lock().await;
        let appended = new_events.len() as u64;
        for event in new_events {
            let persisted = PersistedEvent {
                event,
                stream_id,
                version: StreamVersion::new(events.len() as i64 + 1),
                position: GlobalPosition::new(log.len() as i64 + 1),
            };
            tracing::trace!(
                stream_id = %stream_id,
                version = %persisted.version,
                position = %persisted.position,
                event_type = persisted.event_type(),
                "saved event"
            );
            events.push(persisted.clone());
            log.push(persisted);
        }
        metrics::counter!("event_store_events_saved").increment(appended);
        Ok(GlobalPosition::new(log.len() as i64))
    }

    async fn events_for_stream(
        &self,
        stream_id: StreamId,
        since_version: StreamVersion,
    ) -> Result<Vec<PersistedEvent>> {
        let stream = self.stream(stream_id).await;
        let events = stream.lock().await;
        Ok(read_since(&events, since_version.as_i64()))
    }

    async fn all_events(&self, since_position: GlobalPosition) -> Result<Vec<PersistedEvent>> {
        let log = self.log.lock().await;
        Ok(read_since(&log, since_position.as_i64()))
    }

    async fn current_version(&self, stream_id: StreamId) -> Result<StreamVersion> {
        let stream = match self.streams.read().await.get(&stream_id) {
            Some(stream) => Arc::clone(stream),
            None => return Ok(StreamVersion::BEGINNING),
        };
        let events = stream.lock().await;
        Ok(StreamVersion::new(events.len() as i64))
    }

    async fn current_position(&self) -> Result<GlobalPosition> {
        let log = self.log.lock().await;
        Ok(GlobalPosition::new(log.len() as i64))
    }
}
