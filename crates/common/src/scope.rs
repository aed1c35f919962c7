//! Request-scoped context.
//!
//! The original per-request state here is explicit instead of ambient: a
//! [`RequestScope`] is created at the request boundary and threaded through
//! handler calls, so causality tracking and the observed position are never
//! coupled to a particular execution thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use uuid::Uuid;

use crate::envelope::Envelope;
use crate::ids::MessageId;
use crate::position::GlobalPosition;

/// Well-known header carrying the observed position across a request/response
/// boundary. Absence of the header means "start from zero".
pub const OBSERVED_POSITION_HEADER: &str = "X-Observed-Position";

/// The message (if any) that caused the messages created in this context.
#[derive(Debug, Clone, Copy)]
pub struct Cause {
    pub correlation_id: Uuid,
    pub message_id: MessageId,
}

/// Causality context for creating new envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageContext {
    cause: Option<Cause>,
}

impl MessageContext {
    /// A context with no cause; envelopes created in it are origin messages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The context of handling the given envelope: messages created in it are
    /// correlated to it and caused by it.
    pub fn of<M>(envelope: &Envelope<M>) -> Self {
        Self {
            cause: Some(Cause {
                correlation_id: envelope.correlation_id,
                message_id: envelope.message_id,
            }),
        }
    }

    pub fn cause(&self) -> Option<Cause> {
        self.cause
    }
}

/// The latest global position a logical operation must consider itself aware
/// of.
///
/// Commands publish their commit position into the tracker; queries wait for
/// the projection they read to reach the tracked value. The value only ever
/// increases within a request and starts at zero for a fresh request. It can
/// be carried across a process boundary by serializing the number and
/// re-seeding a tracker on the receiving side.
#[derive(Debug, Default)]
pub struct ObservedPosition {
    position: AtomicI64,
}

impl ObservedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the tracked position. Observing a lower value is a no-op.
    pub fn observe(&self, position: GlobalPosition) {
        self.position.fetch_max(position.as_i64(), Ordering::AcqRel);
    }

    /// Returns the tracked position.
    pub fn get(&self) -> GlobalPosition {
        GlobalPosition::new(self.position.load(Ordering::Acquire))
    }

    /// Resets the tracker to zero, as done at request boundaries.
    pub fn reset(&self) {
        self.position.store(0, Ordering::Release);
    }
}

/// Explicit per-request context: the causality of the message being handled
/// plus the observed position shared by everything in the request.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    pub context: MessageContext,
    pub observed: Arc<ObservedPosition>,
}

impl RequestScope {
    /// A fresh scope for a new request: no cause, observed position zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The scope of handling the given envelope within this request.
    ///
    /// The observed position is shared with the parent scope; only the
    /// causality context changes.
    pub fn handling<M>(&self, envelope: &Envelope<M>) -> Self {
        Self {
            context: MessageContext::of(envelope),
            observed: Arc::clone(&self.observed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_zero() {
        let observed = ObservedPosition::new();

        assert_eq!(observed.get(), GlobalPosition::BEGINNING);
    }

    #[test]
    fn increases_when_observing_higher_values() {
        let observed = ObservedPosition::new();
        observed.observe(GlobalPosition::new(1));
        assert_eq!(observed.get(), GlobalPosition::new(1));

        observed.observe(GlobalPosition::new(2));
        assert_eq!(observed.get(), GlobalPosition::new(2));
    }

    #[test]
    fn stays_same_when_observing_lower_values() {
        let observed = ObservedPosition::new();
        observed.observe(GlobalPosition::new(2));
        assert_eq!(observed.get(), GlobalPosition::new(2));

        observed.observe(GlobalPosition::new(1));
        assert_eq!(observed.get(), GlobalPosition::new(2));
    }

    #[test]
    fn reset_brings_it_to_zero() {
        let observed = ObservedPosition::new();
        observed.observe(GlobalPosition::new(10));
        assert_eq!(observed.get(), GlobalPosition::new(10));

        observed.reset();
        assert_eq!(observed.get(), GlobalPosition::BEGINNING);
    }

    #[test]
    fn scopes_of_different_requests_are_independent() {
        let scope1 = RequestScope::new();
        let scope2 = RequestScope::new();
        scope1.observed.observe(GlobalPosition::new(10));
        scope2.observed.observe(GlobalPosition::new(20));

        assert_eq!(scope1.observed.get(), GlobalPosition::new(10));
        assert_eq!(scope2.observed.get(), GlobalPosition::new(20));
    }

    #[test]
    fn handling_shares_the_observed_position_with_the_parent_scope() {
        let scope = RequestScope::new();
        let envelope = Envelope::new((), &scope.context);

        let inner = scope.handling(&envelope);
        inner.observed.observe(GlobalPosition::new(7));

        assert_eq!(scope.observed.get(), GlobalPosition::new(7));
        assert_eq!(
            inner.context.cause().map(|c| c.message_id),
            Some(envelope.message_id)
        );
    }
}
