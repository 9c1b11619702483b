//! Error taxonomy for the bridge.
//!
//! Only failures the caller of an invocation can observe live here. Stale
//! results and duplicate disconnects are not errors: the registry treats
//! them as silent no-ops, and value marshalling is total.

use thiserror::Error;

use crate::ids::{ConnectionId, CorrelationId, OwnerId};

/// Errors surfaced to the caller of an invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No live connection exists for the owner.
    #[error("no live worker connection for owner '{0}'")]
    UnknownOwner(OwnerId),

    /// The connection died before a result arrived.
    #[error("worker connection {connection_id} disconnected: {stack}")]
    WorkerDisconnected {
        /// Connection that went away.
        connection_id: ConnectionId,
        /// Human-readable diagnostic placeholder.
        stack: String,
    },

    /// The worker neither replied nor disconnected within the deadline.
    #[error("invocation {correlation_id} for owner '{owner}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Owner the call was dispatched for.
        owner: OwnerId,
        /// Correlation ID of the abandoned call.
        correlation_id: CorrelationId,
        /// Configured deadline.
        timeout_ms: u64,
    },

    /// The request could not be handed to the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// A host structured value could not be serialized for marshalling.
    #[error("marshal error: {0}")]
    Marshal(String),
}

impl BridgeError {
    /// Machine-readable error code, used for metric labels and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownOwner(_) => "UNKNOWN_OWNER",
            Self::WorkerDisconnected { .. } => "WORKER_DISCONNECTED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Transport(_) => "TRANSPORT",
            Self::Marshal(_) => "MARSHAL",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Marshal(e.to_string())
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
