//! Call Dispatcher: correlated invocations over the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_core::{BridgeError, ConnectionId, CorrelationId, OwnerId, Result};
use relay_runtime::{ForeignValue, Value, from_foreign, to_foreign, to_foreign_serialized};
use relay_settings::DispatchSettings;
use serde::Serialize;
use tracing::{debug, warn};

use crate::metrics::{INVOCATION_DURATION_SECONDS, INVOCATION_FAILURES_TOTAL, INVOCATIONS_TOTAL};
use crate::pending::CallOutcome;
use crate::protocol::HostFrame;
use crate::registry::{BegunCall, Registry};

/// Issues invocations to workers and waits for their results.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    /// Create a dispatcher using the configured deadline.
    pub fn new(registry: Arc<Registry>, settings: &DispatchSettings) -> Self {
        Self::with_timeout(registry, settings.invoke_timeout())
    }

    /// Create a dispatcher with an explicit deadline (`None` waits forever).
    pub fn with_timeout(registry: Arc<Registry>, timeout: Option<Duration>) -> Self {
        Self { registry, timeout }
    }

    /// The registry calls are routed through.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The per-call deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Invoke a script on one of `owner`'s workers.
    ///
    /// Suspends until the worker replies, its connection dies, or the
    /// deadline passes.
    pub async fn invoke(&self, owner: &OwnerId, payload: &Value) -> Result<Value> {
        self.dispatch(owner, to_foreign(payload)).await
    }

    /// Invoke with any serializable host type as the payload.
    pub async fn invoke_serialized<T: Serialize + ?Sized>(
        &self,
        owner: &OwnerId,
        payload: &T,
    ) -> Result<Value> {
        let payload = to_foreign_serialized(payload)?;
        self.dispatch(owner, payload).await
    }

    async fn dispatch(&self, owner: &OwnerId, payload: ForeignValue) -> Result<Value> {
        metrics::counter!(INVOCATIONS_TOTAL).increment(1);
        let started = Instant::now();

        let result = self.round_trip(owner, &payload).await;

        metrics::histogram!(INVOCATION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!(INVOCATION_FAILURES_TOTAL, "code" => e.code()).increment(1);
            warn!(owner = %owner, code = e.code(), error = %e, "invocation failed");
        }
        result
    }

    async fn round_trip(&self, owner: &OwnerId, payload: &ForeignValue) -> Result<Value> {
        let BegunCall {
            connection,
            correlation_id,
            outcome,
        } = self.registry.begin_call(owner)?;

        debug!(
            owner = %owner,
            connection_id = %connection.id,
            correlation_id = %correlation_id,
            "dispatching invocation"
        );

        let mut guard = PendingGuard::new(&self.registry, &connection.id, &correlation_id);

        let frame = HostFrame::invoke(correlation_id.clone(), payload);
        if !connection.send_json(&frame) {
            return Err(BridgeError::Transport(format!(
                "outbound channel for connection {} is full or closed",
                connection.id
            )));
        }

        let received = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, outcome).await {
                Ok(received) => received,
                Err(_) => {
                    return Err(BridgeError::Timeout {
                        owner: owner.clone(),
                        correlation_id: correlation_id.clone(),
                        timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => outcome.await,
        };
        guard.disarm();

        match received {
            Ok(CallOutcome::Value(value)) => {
                debug!(correlation_id = %correlation_id, "invocation resolved");
                Ok(from_foreign(&value))
            }
            Ok(CallOutcome::Disconnected(failure)) => Err(BridgeError::WorkerDisconnected {
                connection_id: failure.connection_id,
                stack: failure.stack,
            }),
            // The slot was dropped unresolved, which only happens when the
            // connection was torn down.
            Err(_) => Err(BridgeError::WorkerDisconnected {
                connection_id: connection.id.clone(),
                stack: "result slot dropped".to_string(),
            }),
        }
    }
}

/// Removes a call's pending slot unless the call completed.
///
/// Covers every early exit of a round trip: send failure, deadline, and the
/// caller dropping the `invoke` future mid-wait.
struct PendingGuard<'a> {
    registry: &'a Registry,
    connection_id: &'a ConnectionId,
    correlation_id: &'a CorrelationId,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(
        registry: &'a Registry,
        connection_id: &'a ConnectionId,
        correlation_id: &'a CorrelationId,
    ) -> Self {
        Self {
            registry,
            connection_id,
            correlation_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.registry.cancel_pending_call(self.connection_id, self.correlation_id) {
            debug!(
                connection_id = %self.connection_id,
                correlation_id = %self.correlation_id,
                "pending call abandoned"
            );
        }
    }
}
