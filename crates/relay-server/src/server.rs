//! `RelayServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{BridgeError, OwnerId};
use relay_runtime::Value;
use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::websocket::session::{SessionConfig, run_worker_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live worker connections.
    pub registry: Arc<Registry>,
    /// Call dispatcher over `registry`.
    pub dispatcher: Dispatcher,
    /// Cancelled when the server begins shutting down.
    pub cancel: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Per-socket transport settings.
    pub session: SessionConfig,
    /// Max inbound `WebSocket` message size.
    pub max_message_size: usize,
}

/// The relay server.
pub struct RelayServer {
    settings: RelaySettings,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a server with a fresh registry.
    pub fn new(settings: RelaySettings) -> Self {
        let registry = Arc::new(Registry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), &settings.dispatch);
        Self {
            settings,
            registry,
            dispatcher,
            cancel: CancellationToken::new(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from an installed Prometheus recorder.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            dispatcher: self.dispatcher.clone(),
            cancel: self.cancel.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            session: SessionConfig::from(&self.settings.server),
            max_message_size: self.settings.server.max_message_size,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/worker", get(worker_handler))
            .route("/owners/{owner}/invoke", post(invoke_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let addr = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "relay server listening");

        let router = self.router();
        let token = self.cancel.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        Ok(ServerHandle {
            addr: local_addr,
            task,
        })
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The call dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop accepting requests and close every worker session. Idempotent.
    ///
    /// Pending calls on the closed sessions fail as worker disconnects.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Effective settings.
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }
}

/// A running server.
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait up to `timeout` for the serve task to finish after shutdown.
    ///
    /// Returns `false` if in-flight requests were still running at the deadline.
    pub async fn drain(self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.task).await.is_ok() {
            true
        } else {
            warn!(timeout_ms = timeout.as_millis() as u64, "server did not drain before the deadline");
            false
        }
    }
}

/// `/health` response body.
#[derive(Debug, Serialize)]
pub struct Health {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live worker connections.
    pub connections: usize,
    /// Owners with at least one live connection.
    pub owners: usize,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: if state.cancel.is_cancelled() { "draining" } else { "ok" },
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.registry.connection_count(),
        owners: state.registry.owner_count(),
    })
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Query string of the worker upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Owner the worker acts for.
    pub owner: Option<String>,
}

/// GET /worker?owner=…: upgrade to a worker session.
async fn worker_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(owner) = params.owner.filter(|o| !o.is_empty()).map(OwnerId::from) else {
        return (StatusCode::BAD_REQUEST, "missing owner").into_response();
    };

    let cancel = state.cancel.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            run_worker_session(socket, owner, state.registry, state.session, cancel)
        })
}

/// POST /owners/{owner}/invoke: dispatch a JSON payload and return the result.
async fn invoke_handler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let owner = OwnerId::from(owner);
    match state.dispatcher.invoke(&owner, &payload).await {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &BridgeError) -> Response {
    let status = match err {
        BridgeError::UnknownOwner(_) => StatusCode::NOT_FOUND,
        BridgeError::WorkerDisconnected { .. } | BridgeError::Transport(_) => StatusCode::BAD_GATEWAY,
        BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Marshal(_) => StatusCode::BAD_REQUEST,
    };
    let body = json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        }
    });
    (status, Json(body)).into_response()
}
