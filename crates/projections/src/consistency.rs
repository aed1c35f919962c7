//! The observed-position protocol.
//!
//! Commands observe their commit position into the request scope; queries
//! wait for the projection they read to reach the observed position before
//! serving, and observe the projection's own position afterwards so later
//! reads in the same request are at least as fresh. The wait is bounded by a
//! timeout; expiry surfaces as [`ReadModelNotUpToDate`], never as a silent
//! stale read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use common::{
    CommandData, CommandDispatcher, Commit, Envelope, HandlesQuery, QueryMessage, RequestScope,
};

use crate::updater::UpdatableProjection;
use crate::worker::WorkerPool;

/// The projection did not reach the observed position within the query
/// timeout. Retriable by the caller; maps to a "try again" signal at a
/// transport boundary.
#[derive(Debug, Error)]
#[error("read model not up to date")]
pub struct ReadModelNotUpToDate;

/// Command dispatcher decorator: after a command commits, its global
/// position is published into the request's observed position.
pub struct UpdateObservedPositionAfterCommit<D> {
    inner: D,
}

impl<D> UpdateObservedPositionAfterCommit<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<D, E> CommandDispatcher<E> for UpdateObservedPositionAfterCommit<D>
where
    D: CommandDispatcher<E>,
    E: Send + 'static,
{
    async fn dispatch(
        &self,
        command: Envelope<CommandData>,
        scope: &RequestScope,
    ) -> Result<Commit, E> {
        let commit = self.inner.dispatch(command, scope).await?;
        scope.observed.observe(commit.committed_position);
        Ok(commit)
    }
}

/// Command dispatcher decorator: schedules a refresh of every projection
/// after the command has been handled.
pub struct UpdateProjectionsAfterHandling<D> {
    workers: Arc<WorkerPool>,
    inner: D,
}

impl<D> UpdateProjectionsAfterHandling<D> {
    pub fn new(workers: Arc<WorkerPool>, inner: D) -> Self {
        Self { workers, inner }
    }
}

#[async_trait]
impl<D, E> CommandDispatcher<E> for UpdateProjectionsAfterHandling<D>
where
    D: CommandDispatcher<E>,
    E: Send + 'static,
{
    async fn dispatch(
        &self,
        command: Envelope<CommandData>,
        scope: &RequestScope,
    ) -> Result<Commit, E> {
        let result = self.inner.dispatch(command, scope).await?;
        self.workers.update_all();
        Ok(result)
    }
}

/// Query handler decorator: waits for the projection to catch up with the
/// observed position before serving the query.
pub struct WaitForProjectionToUpdate<H> {
    projection: Arc<dyn UpdatableProjection>,
    timeout: Duration,
    inner: H,
}

impl<H> WaitForProjectionToUpdate<H> {
    pub fn new(projection: Arc<dyn UpdatableProjection>, timeout: Duration, inner: H) -> Self {
        Self {
            projection,
            timeout,
            inner,
        }
    }
}

#[async_trait]
impl<Q, H, E> HandlesQuery<Q, E> for WaitForProjectionToUpdate<H>
where
    Q: QueryMessage + 'static,
    H: HandlesQuery<Q, E>,
    E: From<ReadModelNotUpToDate> + Send + 'static,
{
    type Output = H::Output;

    async fn handle(&self, query: Q, scope: &RequestScope) -> Result<Self::Output, E> {
        let expected = scope.observed.get();
        if !self.projection.await_position(expected, self.timeout).await {
            tracing::warn!(
                projection = self.projection.name(),
                expected = %expected,
                "projection not up to date"
            );
            return Err(ReadModelNotUpToDate.into());
        }
        let output = self.inner.handle(query, scope).await?;
        // the projection may have advanced past what was strictly required;
        // later reads in this request must be at least as fresh
        scope.observed.observe(self.projection.position());
        Ok(output)
    }
}
