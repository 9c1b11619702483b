//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! settings file. Each type implements [`Default`] with production default
//! values, and `#[serde(default)]` allows partial JSON.

mod dispatch;
mod logging;
mod server;

pub use dispatch::*;
pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the relay bridge.
///
/// ```json
/// {
///   "server": { "port": 9300 },
///   "dispatch": { "invokeTimeoutMs": 5000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Settings schema version.
    pub version: String,
    /// HTTP / WebSocket server settings.
    pub server: ServerSettings,
    /// Call dispatch settings.
    pub dispatch: DispatchSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            dispatch: DispatchSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RelaySettings {
    /// Correct invalid invariants after loading.
    ///
    /// Out-of-range values are clamped with a warning rather than rejected.
    pub fn validate(&mut self) {
        let s = &mut self.server;
        if s.heartbeat_interval_ms < MIN_HEARTBEAT_INTERVAL_MS {
            tracing::warn!(
                interval_ms = s.heartbeat_interval_ms,
                min_ms = MIN_HEARTBEAT_INTERVAL_MS,
                "heartbeat interval too short, raising to minimum"
            );
            s.heartbeat_interval_ms = MIN_HEARTBEAT_INTERVAL_MS;
        }
        if s.heartbeat_timeout_ms < s.heartbeat_interval_ms {
            tracing::warn!(
                interval_ms = s.heartbeat_interval_ms,
                timeout_ms = s.heartbeat_timeout_ms,
                "heartbeat timeout shorter than interval, raising to interval"
            );
            s.heartbeat_timeout_ms = s.heartbeat_interval_ms;
        }
        if s.outbound_buffer == 0 {
            tracing::warn!("outbound buffer of 0 is invalid, using 1");
            s.outbound_buffer = 1;
        }
    }
}
