use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::updater::UpdatableProjection;

/// A single-threaded, triggerable background worker around one projection
/// updater.
///
/// `trigger` never blocks. If the worker is idle the update runs in the
/// background; if it is busy, one re-run is owed and starts right after the
/// current run finishes. Triggers received while busy coalesce into that one
/// owed run: the trigger channel has capacity 1, so the queue cannot grow.
pub struct TriggerableWorker {
    trigger_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl TriggerableWorker {
    pub fn spawn(updater: Arc<dyn UpdatableProjection>) -> Self {
        let (trigger_tx, mut trigger_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            while trigger_rx.recv().await.is_some() {
                if let Err(error) = updater.update().await {
                    // the worker stays alive; the next trigger retries
                    tracing::warn!(
                        projection = updater.name(),
                        %error,
                        "projection update failed"
                    );
                    metrics::counter!("projection_update_failures", "projection" => updater.name())
                        .increment(1);
                }
            }
        });
        Self { trigger_tx, handle }
    }

    /// Schedules an update if none is owed yet.
    pub fn trigger(&self) {
        // a full slot means a run is already owed; a closed channel means
        // shutdown has begun - both make the trigger a no-op
        let _ = self.trigger_tx.try_send(());
    }

    /// Stops accepting triggers and returns the handle of the in-flight work.
    fn begin_shutdown(self) -> JoinHandle<()> {
        drop(self.trigger_tx);
        self.handle
    }
}

/// One triggerable worker per projection updater.
pub struct WorkerPool {
    workers: Vec<TriggerableWorker>,
}

impl WorkerPool {
    pub fn new(updaters: Vec<Arc<dyn UpdatableProjection>>) -> Self {
        let workers = updaters.into_iter().map(TriggerableWorker::spawn).collect();
        Self { workers }
    }

    /// Triggers every worker, scheduling a refresh of all projections.
    pub fn update_all(&self) {
        for worker in &self.workers {
            worker.trigger();
        }
    }

    /// Stops accepting new triggers and waits for in-flight work to finish.
    ///
    /// Returns `false` if the timeout expired before every worker finished.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let handles: Vec<_> = self
            .workers
            .into_iter()
            .map(TriggerableWorker::begin_shutdown)
            .collect();
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        true
    }
}
