//! The write model: aggregates reconstructed from their event streams.
//!
//! An aggregate is replayed fresh from its stream on every load; there is no
//! in-process cache, so staleness is bounded only by the event store's own
//! consistency.

pub mod aggregate;
pub mod error;
pub mod repository;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{RepositoryError, Result};
pub use repository::Repository;
