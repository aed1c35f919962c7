//! The query side: projections built from the global event log.
//!
//! A projection consumes every event in log order exactly once and exposes
//! how far it has read as its position. Updates run on dedicated background
//! workers; readers wait for a projection to reach an observed position
//! instead of taking any global lock. That protocol is what gives callers
//! read-your-writes consistency across independently updated read models.

pub mod consistency;
pub mod error;
pub mod projection;
pub mod status;
pub mod updater;
pub mod worker;

pub use consistency::{
    ReadModelNotUpToDate, UpdateObservedPositionAfterCommit, UpdateProjectionsAfterHandling,
    WaitForProjectionToUpdate,
};
pub use error::{ProjectionError, Result};
pub use projection::Projection;
pub use status::{EventStoreStatus, ProjectionStatus, SystemStatus};
pub use updater::{ProjectionUpdater, UpdatableProjection};
pub use worker::{TriggerableWorker, WorkerPool};
