use common::{DomainEvent, StreamId, StreamVersion};

/// State of an event-sourced aggregate.
///
/// Applying an event must be pure and deterministic: given the same state and
/// event it always produces the same new state, with no side effects and no
/// failures. Events are facts that have already happened.
pub trait Aggregate: Default + Send + Sync {
    /// The events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Applies an event to the state.
    fn apply(&mut self, event: &Self::Event);
}

/// An aggregate root: the identity, version and uncommitted changes around a
/// piece of aggregate state.
///
/// The identity is set exactly once, at construction. The version equals the
/// number of events applied so far. New events published by command methods
/// are applied immediately and collected as uncommitted changes until the
/// repository persists them.
#[derive(Debug)]
pub struct AggregateRoot<A: Aggregate> {
    id: StreamId,
    version: StreamVersion,
    changes: Vec<A::Event>,
    state: A,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Creates a new, empty aggregate with the given identity and version 0.
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            version: StreamVersion::BEGINNING,
            changes: Vec::new(),
            state: A::default(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn version(&self) -> StreamVersion {
        self.version
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    /// The events published since the last save, in publication order.
    pub fn uncommitted_changes(&self) -> &[A::Event] {
        &self.changes
    }

    /// Publishes a new event: applies it to the state and records it as an
    /// uncommitted change.
    pub fn publish(&mut self, event: A::Event) {
        self.state.apply(&event);
        self.version = self.version.next();
        self.changes.push(event);
    }

    /// Replays history onto the aggregate without recording changes.
    pub fn load_from_history(&mut self, history: impl IntoIterator<Item = A::Event>) {
        for event in history {
            self.state.apply(&event);
            self.version = self.version.next();
        }
    }

    /// Forgets the uncommitted changes once they have been persisted.
    pub fn mark_changes_as_committed(&mut self) {
        self.changes.clear();
    }
}
