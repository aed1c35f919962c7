use std::marker::PhantomData;
use std::sync::Arc;

use common::{Commit, Envelope, EventData, RequestScope, StreamId, StreamVersion};
use event_store::{EventEnvelope, EventStore};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::{RepositoryError, Result};

/// Loads and saves aggregates of one type as event streams.
pub struct Repository<A: Aggregate> {
    store: Arc<dyn EventStore>,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for Repository<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<A: Aggregate> Repository<A> {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Instantiates a new, empty aggregate with the given identity.
    pub fn create(&self, id: StreamId) -> AggregateRoot<A> {
        AggregateRoot::new(id)
    }

    /// Creates the aggregate and replays any existing stream history onto it.
    /// A no-op replay if the stream does not exist yet.
    pub async fn create_or_get(&self, id: StreamId) -> Result<AggregateRoot<A>> {
        let mut root = self.create(id);
        let history = self
            .store
            .events_for_stream(id, StreamVersion::BEGINNING)
            .await?;
        for persisted in history {
            let event: A::Event = persisted.decode()?;
            root.load_from_history([event]);
        }
        Ok(root)
    }

    /// Loads an existing aggregate, failing if it has no events.
    pub async fn get_by_id(&self, id: StreamId) -> Result<AggregateRoot<A>> {
        let root = self.create_or_get(id).await?;
        if root.version() == StreamVersion::BEGINNING {
            return Err(RepositoryError::EntityNotFound(id));
        }
        Ok(root)
    }

    /// Appends the aggregate's uncommitted changes to its stream.
    ///
    /// Each change is wrapped in an envelope inheriting the scope's
    /// correlation and causation, so the causality of aggregate changes stays
    /// traceable. On success the changes are marked committed and the commit
    /// carries the resulting global position. A concurrency conflict from the
    /// store propagates verbatim.
    #[tracing::instrument(skip_all, fields(stream_id = %root.id()))]
    pub async fn save(
        &self,
        root: &mut AggregateRoot<A>,
        expected_version: StreamVersion,
        scope: &RequestScope,
    ) -> Result<Commit> {
        let new_events = root
            .uncommitted_changes()
            .iter()
            .map(|event| {
                Ok(Envelope::new(EventData::encode(event)?, &scope.context))
            })
            .collect::<std::result::Result<Vec<EventEnvelope>, serde_json::Error>>()?;

        let committed_position = self
            .store
            .save_events(root.id(), new_events, expected_version)
            .await?;
        root.mark_changes_as_committed();

        Ok(Commit { committed_position })
    }
}
