//! Live worker connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use relay_core::{ConnectionId, OwnerId};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::pending::PendingCalls;

/// One live transport session belonging to one owner.
pub struct WorkerConnection {
    /// Host-assigned connection ID.
    pub id: ConnectionId,
    /// Owner the worker announced on connect.
    pub owner: OwnerId,
    /// Send channel to the socket's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the worker last sent anything (frames or pongs).
    last_seen: Mutex<Instant>,
    /// Calls awaiting a result from this worker.
    pending: Mutex<PendingCalls>,
    /// Count of frames dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl WorkerConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, owner: OwnerId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            owner,
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            pending: Mutex::new(PendingCalls::new()),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text frame for the worker.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a frame and queue it.
    pub fn send_json<T: Serialize + ?Sized>(&self, frame: &T) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Whether the write task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Record inbound activity.
    pub fn mark_seen(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the worker last sent anything.
    pub fn idle(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Number of calls awaiting a result.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Lock the pending-call table. Callers hold the registry lock first.
    pub(crate) fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock()
    }
}

impl std::fmt::Debug for WorkerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConnection")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (WorkerConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = WorkerConnection::new(ConnectionId::from("c1"), OwnerId::from("alice"), tx);
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id.as_str(), "c1");
        assert_eq!(conn.owner.as_str(), "alice");
        assert_eq!(conn.pending_count(), 0);
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_frame_success() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(conn.is_closed());
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = WorkerConnection::new(ConnectionId::from("c2"), OwnerId::from("bob"), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send_json(&serde_json::json!({"type": "invoke"})));
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "invoke");
    }

    #[test]
    fn mark_seen_resets_idle() {
        let (conn, _rx) = make_connection();
        *conn.last_seen.lock() = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        assert!(conn.idle() >= Duration::from_secs(59));
        conn.mark_seen();
        assert!(conn.idle() < Duration::from_secs(1));
    }
}
