//! Inbound frame handling.

use relay_core::ConnectionId;
use tracing::{debug, trace, warn};

use crate::protocol::{WorkerFrame, result_value};
use crate::registry::Registry;

/// What an inbound text frame amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A result was delivered to a waiting call.
    Resolved,
    /// A result matched no outstanding call.
    Stale,
    /// Keepalive.
    Ping,
    /// Not a frame we understand; dropped.
    Malformed,
}

/// Handle one text frame from the worker on `connection_id`.
pub fn handle_frame(registry: &Registry, connection_id: &ConnectionId, text: &str) -> FrameOutcome {
    let frame: WorkerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(connection_id = %connection_id, error = %e, "malformed worker frame dropped");
            return FrameOutcome::Malformed;
        }
    };

    match frame {
        WorkerFrame::Result {
            correlation_id,
            value,
        } => {
            debug!(
                connection_id = %connection_id,
                correlation_id = %correlation_id,
                "result received"
            );
            let value = result_value(value.as_ref());
            if registry.resolve_pending_call(connection_id, &correlation_id, value) {
                FrameOutcome::Resolved
            } else {
                FrameOutcome::Stale
            }
        }
        WorkerFrame::Ping => {
            trace!(connection_id = %connection_id, "worker ping");
            FrameOutcome::Ping
        }
    }
}
