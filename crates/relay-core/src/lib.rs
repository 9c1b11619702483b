//! # relay-core
//!
//! Foundation types for the relay script-execution bridge.
//!
//! - **Branded IDs**: [`ids::OwnerId`], [`ids::ConnectionId`], [`ids::CorrelationId`] as newtypes
//! - **Errors**: [`errors::BridgeError`] taxonomy via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other relay crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;

pub use errors::{BridgeError, Result};
pub use ids::{ConnectionId, CorrelationId, OwnerId};
