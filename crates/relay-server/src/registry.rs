//! Connection Registry: owner → live worker connections.
//!
//! Connections are indexed directly by their ID, with owner membership as a
//! secondary index, so routing a result is an O(1) lookup. Both indices and
//! every connection's pending-call table are mutated only under the one
//! registry lock: register, unregister, pick, resolve and call registration
//! are atomic with respect to each other.
//!
//! Lock order: registry, then a connection's pending table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use relay_core::{BridgeError, ConnectionId, CorrelationId, OwnerId, Result};
use relay_runtime::ForeignValue;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::metrics::{
    STALE_RESULTS_TOTAL, WORKER_CONNECTIONS_ACTIVE, WORKER_CONNECTIONS_TOTAL,
    WORKER_DISCONNECTIONS_TOTAL,
};
use crate::pending::{CallOutcome, DisconnectFailure};
use crate::websocket::connection::WorkerConnection;

/// A call registered on a connection, not yet sent.
#[derive(Debug)]
pub struct BegunCall {
    /// Connection the call was placed on.
    pub connection: Arc<WorkerConnection>,
    /// Correlation ID the worker must echo back.
    pub correlation_id: CorrelationId,
    /// Resolves when the result arrives or the connection dies.
    pub outcome: oneshot::Receiver<CallOutcome>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<WorkerConnection>>,
    owners: HashMap<OwnerId, HashSet<ConnectionId>>,
}

impl Inner {
    /// Remove a connection from both indices, pruning an emptied owner.
    fn detach(&mut self, connection_id: &ConnectionId) -> Option<Arc<WorkerConnection>> {
        let connection = self.connections.remove(connection_id)?;
        if let Some(set) = self.owners.get_mut(&connection.owner) {
            let _ = set.remove(connection_id);
            if set.is_empty() {
                let _ = self.owners.remove(&connection.owner);
            }
        }
        Some(connection)
    }

    fn pick(&self, owner: &OwnerId) -> Result<Arc<WorkerConnection>> {
        self.owners
            .get(owner)
            .and_then(|set| set.iter().choose(&mut rand::rng()))
            .and_then(|id| self.connections.get(id))
            .cloned()
            .ok_or_else(|| BridgeError::UnknownOwner(owner.clone()))
    }
}

/// Process-wide map of live worker connections.
///
/// Constructed once at startup and shared as `Arc<Registry>`.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under `owner`. Never fails.
    ///
    /// Registering an ID that is already live replaces the old connection,
    /// whose pending calls are failed as if it had disconnected.
    pub fn register(
        &self,
        owner: OwnerId,
        connection_id: ConnectionId,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Arc<WorkerConnection> {
        let connection = Arc::new(WorkerConnection::new(connection_id.clone(), owner.clone(), tx));
        let active = {
            let mut inner = self.inner.lock();
            if let Some(replaced) = inner.detach(&connection_id) {
                let failed = replaced.pending().fail_all(&DisconnectFailure::new(connection_id.clone()));
                debug!(connection_id = %connection_id, failed, "replaced live connection");
            }
            let _ = inner
                .owners
                .entry(owner.clone())
                .or_default()
                .insert(connection_id.clone());
            let _ = inner.connections.insert(connection_id.clone(), Arc::clone(&connection));
            inner.connections.len()
        };

        metrics::counter!(WORKER_CONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(WORKER_CONNECTIONS_ACTIVE).set(active as f64);
        info!(owner = %owner, connection_id = %connection_id, active, "worker connected");
        connection
    }

    /// Remove a connection and fail its pending calls.
    ///
    /// Returns how many pending calls were failed. Unknown IDs are a no-op:
    /// disconnect events can race with cleanup.
    pub fn unregister(&self, connection_id: &ConnectionId) -> usize {
        let (connection, failed, active) = {
            let mut inner = self.inner.lock();
            let Some(connection) = inner.detach(connection_id) else {
                debug!(connection_id = %connection_id, "unregister for unknown connection");
                return 0;
            };
            let failed = connection
                .pending()
                .fail_all(&DisconnectFailure::new(connection_id.clone()));
            (connection, failed, inner.connections.len())
        };

        metrics::counter!(WORKER_DISCONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(WORKER_CONNECTIONS_ACTIVE).set(active as f64);
        info!(
            owner = %connection.owner,
            connection_id = %connection_id,
            failed,
            active,
            "worker disconnected"
        );
        failed
    }

    /// A live connection of `owner`, chosen uniformly at random.
    pub fn pick_connection(&self, owner: &OwnerId) -> Result<Arc<WorkerConnection>> {
        self.inner.lock().pick(owner)
    }

    /// Pick a connection and register a fresh pending call on it, atomically.
    pub fn begin_call(&self, owner: &OwnerId) -> Result<BegunCall> {
        let inner = self.inner.lock();
        let connection = inner.pick(owner)?;
        let correlation_id = CorrelationId::new();
        let outcome = connection.pending().register(correlation_id.clone());
        Ok(BegunCall {
            connection,
            correlation_id,
            outcome,
        })
    }

    /// Route a worker result to its pending call.
    ///
    /// A miss (unknown connection or correlation ID) is a silent no-op
    /// returning `false`: late and duplicate results are expected.
    pub fn resolve_pending_call(
        &self,
        connection_id: &ConnectionId,
        correlation_id: &CorrelationId,
        value: ForeignValue,
    ) -> bool {
        let resolved = {
            let inner = self.inner.lock();
            inner.connections.get(connection_id).is_some_and(|connection| {
                connection
                    .pending()
                    .resolve(correlation_id, CallOutcome::Value(value))
            })
        };
        if !resolved {
            metrics::counter!(STALE_RESULTS_TOTAL).increment(1);
            debug!(
                connection_id = %connection_id,
                correlation_id = %correlation_id,
                "stale result ignored"
            );
        }
        resolved
    }

    /// Drop a pending call without resolving it.
    pub fn cancel_pending_call(
        &self,
        connection_id: &ConnectionId,
        correlation_id: &CorrelationId,
    ) -> bool {
        let inner = self.inner.lock();
        inner
            .connections
            .get(connection_id)
            .is_some_and(|connection| connection.pending().cancel(correlation_id))
    }

    /// Look up a live connection.
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<WorkerConnection>> {
        self.inner.lock().connections.get(connection_id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Number of owners with at least one live connection.
    pub fn owner_count(&self) -> usize {
        self.inner.lock().owners.len()
    }

    /// Live connection IDs of `owner`.
    pub fn owner_connections(&self, owner: &OwnerId) -> Vec<ConnectionId> {
        self.inner
            .lock()
            .owners
            .get(owner)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outstanding calls on a connection (0 if unknown).
    pub fn pending_count(&self, connection_id: &ConnectionId) -> usize {
        self.inner
            .lock()
            .connections
            .get(connection_id)
            .map_or(0, |connection| connection.pending_count())
    }
}
