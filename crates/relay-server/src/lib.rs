//! # relay-server
//!
//! Worker connection registry, call dispatch, and the Axum `WebSocket` transport.
//!
//! - [`registry::Registry`]: owner → connections map with per-connection
//!   result slots keyed by correlation ID
//! - [`dispatch::Dispatcher`]: invoke a script on an owner's worker and
//!   suspend until its result, disconnect, or deadline
//! - `WebSocket` gateway: worker sessions, heartbeat, result frames
//! - HTTP endpoints: health, Prometheus metrics, invoke
//! - Graceful shutdown via `CancellationToken`
//!
//! ## Crate Position
//!
//! Depends on `relay-core`, `relay-settings`, `relay-runtime`. Used by `relay-agent`.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod metrics;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod websocket;

pub use dispatch::Dispatcher;
pub use pending::{CallOutcome, ResultSlot};
pub use registry::{BegunCall, Registry};
pub use server::{RelayServer, ServerHandle};
