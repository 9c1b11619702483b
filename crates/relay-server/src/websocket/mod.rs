//! Worker-facing `WebSocket` transport.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
