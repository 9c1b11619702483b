//! One worker's socket lifecycle: register, pump frames, unregister.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use relay_core::{ConnectionId, OwnerId};
use relay_settings::ServerSettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::connection::WorkerConnection;
use super::handler::handle_frame;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::registry::Registry;

/// Per-socket transport settings.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Capacity of the outbound frame channel.
    pub outbound_buffer: usize,
    /// Ping / liveness check period.
    pub heartbeat_interval: Duration,
    /// Silence after which the worker is dropped.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerSettings> for SessionConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            outbound_buffer: settings.outbound_buffer,
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

/// Drive an upgraded worker socket until it closes, goes silent, or the
/// server shuts down. The connection is unregistered on every exit path.
pub async fn run_worker_session(
    socket: WebSocket,
    owner: OwnerId,
    registry: Arc<Registry>,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let connection_id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(config.outbound_buffer);
    let connection = registry.register(owner, connection_id.clone(), tx);
    let registration = Registration {
        registry: Arc::clone(&registry),
        connection: Arc::clone(&connection),
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: forward queued frames, ping periodically, close on shutdown.
    let writer_cancel = cancel.clone();
    let writer_id = connection_id.clone();
    let ping_period = config.heartbeat_interval;
    let writer = async move {
        let mut ping_interval = tokio::time::interval(ping_period);
        let _ = ping_interval.tick().await;
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text((*frame).clone().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                        break;
                    }
                    trace!(connection_id = %writer_id, "sent ping");
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    };

    // Reader: route results, track activity.
    let reader_registry = Arc::clone(&registry);
    let reader_connection = Arc::clone(&connection);
    let reader = async move {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(connection_id = %reader_connection.id, error = %e, "socket read error");
                    break;
                }
            };
            reader_connection.mark_seen();
            match msg {
                Message::Text(text) => {
                    let _ = handle_frame(&reader_registry, &reader_connection.id, text.as_str());
                }
                Message::Binary(_) => {
                    warn!(connection_id = %reader_connection.id, "binary frame ignored");
                }
                Message::Close(_) => break,
                // Pongs only refresh activity; axum answers pings itself.
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    };

    let heartbeat = run_heartbeat(
        Arc::clone(&connection),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        cancel.clone(),
    );

    tokio::select! {
        () = writer => {}
        () = reader => {}
        result = heartbeat => {
            if result == HeartbeatResult::TimedOut {
                warn!(
                    connection_id = %connection_id,
                    idle_ms = connection.idle().as_millis() as u64,
                    "worker heartbeat timed out"
                );
            }
        }
    }

    drop(registration);
}

/// Holds a worker's registry entry for the life of its session.
///
/// Dropping it unregisters the connection, so a session that unwinds or is
/// aborted still fails its pending calls and leaves the registry.
struct Registration {
    registry: Arc<Registry>,
    connection: Arc<WorkerConnection>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let failed = self.registry.unregister(&self.connection.id);
        info!(
            connection_id = %self.connection.id,
            age_secs = self.connection.age().as_secs(),
            failed,
            dropped = self.connection.drop_count(),
            "worker session ended"
        );
    }
}
