use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, oneshot};

use common::GlobalPosition;
use event_store::EventStore;

use crate::Result;
use crate::projection::Projection;

/// The updatable face of a projection: how far it has read, how to advance
/// it, and how to wait for it.
#[async_trait]
pub trait UpdatableProjection: Send + Sync {
    fn name(&self) -> &'static str;

    /// The last-consumed global position. Never blocks.
    fn position(&self) -> GlobalPosition;

    /// Catches the projection up with the event store.
    async fn update(&self) -> Result<()>;

    /// Blocks until the projection has consumed events up to and including
    /// `expected`, or the timeout expires.
    ///
    /// Returns `true` if the projection has reached the expected position
    /// and `false` if the waiting time elapsed before that.
    async fn await_position(&self, expected: GlobalPosition, timeout: Duration) -> bool;
}

struct Waiter {
    id: u64,
    expected: GlobalPosition,
    reached: oneshot::Sender<()>,
}

/// Owns a projection and keeps it caught up with the event store.
///
/// The projection state sits behind a read-write lock: the updater is its
/// only writer, readers query it concurrently between event applications.
/// The position is atomic so reading it never contends with an update.
pub struct ProjectionUpdater<P: Projection> {
    name: &'static str,
    projection: RwLock<P>,
    store: Arc<dyn EventStore>,
    position: AtomicI64,
    update_lock: Mutex<()>,
    waiters: std::sync::Mutex<Vec<Waiter>>,
    waiter_seq: AtomicU64,
}

impl<P: Projection> ProjectionUpdater<P> {
    pub fn new(projection: P, store: Arc<dyn EventStore>) -> Self {
        Self {
            name: projection.name(),
            projection: RwLock::new(projection),
            store,
            position: AtomicI64::new(GlobalPosition::BEGINNING.as_i64()),
            update_lock: Mutex::new(()),
            waiters: std::sync::Mutex::new(Vec::new()),
            waiter_seq: AtomicU64::new(0),
        }
    }

    /// Read access to the projection state for serving queries.
    pub async fn read(&self) -> RwLockReadGuard<'_, P> {
        self.projection.read().await
    }

    fn notify_waiters(&self) {
        let position = GlobalPosition::new(self.position.load(Ordering::Acquire));
        let mut waiters = self.waiters.lock().unwrap();
        let mut i = 0;
        while i < waiters.len() {
            if waiters[i].expected <= position {
                let waiter = waiters.swap_remove(i);
                // the receiver may have timed out and gone away; that's fine
                let _ = waiter.reached.send(());
            } else {
                i += 1;
            }
        }
    }

    fn remove_waiter(&self, id: u64) {
        self.waiters.lock().unwrap().retain(|w| w.id != id);
    }
}

#[async_trait]
impl<P: Projection> UpdatableProjection for ProjectionUpdater<P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn position(&self) -> GlobalPosition {
        GlobalPosition::new(self.position.load(Ordering::Acquire))
    }

    #[tracing::instrument(skip(self), fields(projection = self.name))]
    async fn update(&self) -> Result<()> {
        // no two updates run concurrently on the same projection
        let _guard = self.update_lock.lock().await;

        let since = self.position();
        let events = self.store.all_events(since).await?;
        if let Some(last) = events.last() {
            tracing::debug!(
                count = events.len(),
                from = %since,
                to = %last.position,
                "updating projection"
            );
        }
        for event in &events {
            self.projection.write().await.apply(event).await?;
            // advance, then notify: awaiters do the opposite (register, then
            // re-check) so a wake-up cannot be missed
            self.position
                .store(event.position.as_i64(), Ordering::Release);
            self.notify_waiters();
            metrics::counter!("projection_events_applied", "projection" => self.name)
                .increment(1);
        }
        Ok(())
    }

    async fn await_position(&self, expected: GlobalPosition, timeout: Duration) -> bool {
        // quick path in case no waiting is needed
        if self.position() >= expected {
            return true;
        }

        // slow path, waiting probably needed
        let (reached, wait) = oneshot::channel();
        let id = self.waiter_seq.fetch_add(1, Ordering::Relaxed);
        self.waiters.lock().unwrap().push(Waiter {
            id,
            expected,
            reached,
        });

        // double check after registering our waiter, in case the position
        // was updated concurrently
        if self.position() >= expected {
            self.remove_waiter(id);
            return true;
        }

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                // we timed out; discard the waiter
                self.remove_waiter(id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{DomainEvent, Envelope, EventData, MessageContext, StreamId, StreamVersion};
    use event_store::{InMemoryEventStore, PersistedEvent};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum TestEvent {
        ValueChanged { value: String },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::ValueChanged { .. } => "ValueChanged",
            }
        }
    }

    #[derive(Debug, Default)]
    struct ValuesView {
        values: Vec<String>,
    }

    #[async_trait]
    impl Projection for ValuesView {
        fn name(&self) -> &'static str {
            "ValuesView"
        }

        async fn apply(&mut self, event: &PersistedEvent) -> Result<()> {
            match event.event_type() {
                "ValueChanged" => {
                    let TestEvent::ValueChanged { value } = event.decode()?;
                    self.values.push(value);
                }
                _ => {}
            }
            Ok(())
        }
    }

    async fn save_value(store: &InMemoryEventStore, value: &str) {
        let stream_id = StreamId::new();
        let event = TestEvent::ValueChanged {
            value: value.to_string(),
        };
        store
            .save_events(
                stream_id,
                vec![Envelope::new(
                    EventData::encode(&event).unwrap(),
                    &MessageContext::empty(),
                )],
                StreamVersion::BEGINNING,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_applies_all_new_events_in_order() {
        let store = Arc::new(InMemoryEventStore::new());
        save_value(&store, "one").await;
        save_value(&store, "two").await;
        let updater = ProjectionUpdater::new(ValuesView::default(), store.clone());

        updater.update().await.unwrap();

        assert_eq!(updater.read().await.values, vec!["one", "two"]);
        assert_eq!(updater.position(), GlobalPosition::new(2));
    }

    #[tokio::test]
    async fn update_is_incremental() {
        let store = Arc::new(InMemoryEventStore::new());
        save_value(&store, "one").await;
        let updater = ProjectionUpdater::new(ValuesView::default(), store.clone());
        updater.update().await.unwrap();

        save_value(&store, "two").await;
        updater.update().await.unwrap();
        updater.update().await.unwrap();

        assert_eq!(updater.read().await.values, vec!["one", "two"]);
        assert_eq!(updater.position(), GlobalPosition::new(2));
    }

    #[tokio::test]
    async fn rederiving_from_scratch_yields_identical_state() {
        let store = Arc::new(InMemoryEventStore::new());
        save_value(&store, "one").await;
        save_value(&store, "two").await;
        save_value(&store, "three").await;
        let updater = ProjectionUpdater::new(ValuesView::default(), store.clone());
        updater.update().await.unwrap();
        updater.update().await.unwrap();

        let rebuilt = ProjectionUpdater::new(ValuesView::default(), store.clone());
        rebuilt.update().await.unwrap();

        assert_eq!(updater.read().await.values, rebuilt.read().await.values);
        assert_eq!(updater.position(), rebuilt.position());
    }

    #[tokio::test]
    async fn await_position_returns_immediately_if_already_reached() {
        let store = Arc::new(InMemoryEventStore::new());
        save_value(&store, "one").await;
        let updater = ProjectionUpdater::new(ValuesView::default(), store.clone());
        updater.update().await.unwrap();

        let reached = updater
            .await_position(GlobalPosition::new(1), Duration::ZERO)
            .await;

        assert!(reached);
    }

    #[tokio::test]
    async fn await_position_returns_false_when_the_timeout_expires() {
        let store = Arc::new(InMemoryEventStore::new());
        let updater = ProjectionUpdater::new(ValuesView::default(), store.clone());

        let reached = updater
            .await_position(GlobalPosition::new(1), Duration::from_millis(10))
            .await;

        assert!(!reached);
    }

    #[tokio::test]
    async fn await_position_wakes_up_when_a_concurrent_update_reaches_it() {
        let store = Arc::new(InMemoryEventStore::new());
        save_value(&store, "one").await;
        let updater = Arc::new(ProjectionUpdater::new(ValuesView::default(), store.clone()));

        let waiting = {
            let updater = Arc::clone(&updater);
            tokio::spawn(async move {
                updater
                    .await_position(GlobalPosition::new(1), Duration::from_secs(5))
                    .await
            })
        };
        tokio::task::yield_now().await;
        updater.update().await.unwrap();

        assert!(waiting.await.unwrap());
    }

    #[tokio::test]
    async fn timed_out_waiters_are_discarded() {
        let store = Arc::new(InMemoryEventStore::new());
        let updater = ProjectionUpdater::new(ValuesView::default(), store.clone());

        updater
            .await_position(GlobalPosition::new(1), Duration::from_millis(1))
            .await;

        assert!(updater.waiters.lock().unwrap().is_empty());
    }
}
