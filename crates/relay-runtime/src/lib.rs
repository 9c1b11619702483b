//! # relay-runtime
//!
//! Value models on both sides of the bridge and the conversions between them.
//!
//! - [`value::Value`]: the host's closed dynamic value model
//! - [`foreign::ForeignValue`]: the worker runtime's native value model, with
//!   [`foreign::ForeignObject`] as the capability interface over objects of
//!   unknown shape
//! - [`marshal`]: `to_foreign` / `from_foreign`, the recursive converter
//! - [`wire`]: JSON encoding of foreign values for the transport
//!
//! ## Crate Position
//!
//! Depends on `relay-core`. Used by `relay-server`.

#![deny(unsafe_code)]

pub mod foreign;
pub mod marshal;
pub mod value;
pub mod wire;

pub use foreign::{ForeignObject, ForeignValue, ProbeError, ScriptObject};
pub use marshal::{from_foreign, to_foreign, to_foreign_serialized};
pub use value::Value;
