//! Pending-call table: one [`ResultSlot`] per in-flight invocation.

use std::collections::HashMap;

use relay_core::{ConnectionId, CorrelationId};
use relay_runtime::ForeignValue;
use tokio::sync::oneshot;

/// Stack placeholder carried by every disconnect failure.
pub const DISCONNECT_STACK: &str = "worker connection closed before a result was received";

/// Sentinel delivered to calls whose connection died before replying.
#[derive(Clone, Debug, PartialEq)]
pub struct DisconnectFailure {
    /// Connection that went away.
    pub connection_id: ConnectionId,
    /// Human-readable diagnostic.
    pub stack: String,
}

impl DisconnectFailure {
    /// Failure for `connection_id` with the default diagnostic.
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            stack: DISCONNECT_STACK.to_string(),
        }
    }
}

/// What a [`ResultSlot`] resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome {
    /// The worker pushed a result.
    Value(ForeignValue),
    /// The connection terminated first.
    Disconnected(DisconnectFailure),
}

/// Single-resolution slot for one call.
///
/// The first resolution wins; later ones are no-ops reporting `false`.
#[derive(Debug)]
pub struct ResultSlot {
    tx: Option<oneshot::Sender<CallOutcome>>,
}

impl ResultSlot {
    /// Create an unresolved slot and the receiver the caller suspends on.
    pub fn new() -> (Self, oneshot::Receiver<CallOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Resolve the slot. Returns `false` if it was already resolved or the
    /// caller stopped waiting.
    pub fn resolve(&mut self, outcome: CallOutcome) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Whether a resolution has been attempted.
    pub fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }
}

/// Outstanding calls on one connection, keyed by correlation ID.
#[derive(Debug, Default)]
pub struct PendingCalls {
    slots: HashMap<CorrelationId, ResultSlot>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call, returning the receiver that delivers its outcome.
    pub fn register(&mut self, correlation_id: CorrelationId) -> oneshot::Receiver<CallOutcome> {
        let (slot, rx) = ResultSlot::new();
        let _ = self.slots.insert(correlation_id, slot);
        rx
    }

    /// Remove and resolve the slot for `correlation_id`.
    ///
    /// Returns `false` when no such call is outstanding.
    pub fn resolve(&mut self, correlation_id: &CorrelationId, outcome: CallOutcome) -> bool {
        match self.slots.remove(correlation_id) {
            Some(mut slot) => slot.resolve(outcome),
            None => false,
        }
    }

    /// Drop a slot without resolving it.
    pub fn cancel(&mut self, correlation_id: &CorrelationId) -> bool {
        self.slots.remove(correlation_id).is_some()
    }

    /// Resolve every outstanding slot with `failure`, emptying the table.
    ///
    /// Returns how many slots were drained.
    pub fn fail_all(&mut self, failure: &DisconnectFailure) -> usize {
        let count = self.slots.len();
        for (_, mut slot) in self.slots.drain() {
            let _ = slot.resolve(CallOutcome::Disconnected(failure.clone()));
        }
        count
    }

    /// Whether `correlation_id` is outstanding.
    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.slots.contains_key(correlation_id)
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no calls are outstanding.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
