//! HTTP / WebSocket server settings.

use serde::{Deserialize, Serialize};

/// Shortest accepted heartbeat interval, from any settings source.
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;

/// Server network and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Per-connection outbound frame queue depth.
    pub outbound_buffer: usize,
    /// Interval between WebSocket pings to each worker.
    pub heartbeat_interval_ms: u64,
    /// A worker silent for this long is disconnected.
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9300,
            outbound_buffer: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 9300);
        assert_eq!(s.outbound_buffer, 256);
        assert_eq!(s.heartbeat_interval_ms, 30_000);
        assert_eq!(s.heartbeat_timeout_ms, 90_000);
        assert_eq!(s.max_message_size, 16 * 1024 * 1024);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"0.0.0.0","port":3000,"outboundBuffer":8}"#;
        let s: ServerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 3000);
        assert_eq!(s.outbound_buffer, 8);
        assert_eq!(s.heartbeat_interval_ms, 30_000);
    }
}
