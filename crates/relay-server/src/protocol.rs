//! Transport frames exchanged with workers.
//!
//! Every frame is a JSON text message tagged by `type`. Payloads and result
//! values use the foreign-value wire encoding from [`relay_runtime::wire`].

use relay_core::CorrelationId;
use relay_runtime::{ForeignValue, wire};
use serde::{Deserialize, Serialize};

/// Host → worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostFrame {
    /// Run a script invocation.
    Invoke {
        /// Must be echoed in the result.
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
        /// Marshalled request.
        payload: serde_json::Value,
    },
}

impl HostFrame {
    /// Build an invoke frame from a foreign payload.
    pub fn invoke(correlation_id: CorrelationId, payload: &ForeignValue) -> Self {
        Self::Invoke {
            correlation_id,
            payload: wire::encode(payload),
        }
    }
}

/// Worker → host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerFrame {
    /// Result of an earlier invocation.
    Result {
        /// Correlation ID from the invoke frame.
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
        /// Result value; absent means "no value".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    /// Application-level keepalive.
    Ping,
}

/// Decode a result value, treating an absent value as `undefined`.
pub fn result_value(value: Option<&serde_json::Value>) -> ForeignValue {
    value.map_or(ForeignValue::Undefined, wire::decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoke_frame_shape() {
        let frame = HostFrame::invoke(CorrelationId::from("k1"), &ForeignValue::Int(3));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, json!({"type": "invoke", "correlationId": "k1", "payload": 3}));
    }

    #[test]
    fn parse_result_with_value() {
        let frame: WorkerFrame =
            serde_json::from_str(r#"{"type":"result","correlationId":"k1","value":{"a":1}}"#).unwrap();
        assert_eq!(
            frame,
            WorkerFrame::Result {
                correlation_id: CorrelationId::from("k1"),
                value: Some(json!({"a": 1})),
            }
        );
    }

    #[test]
    fn parse_result_without_value() {
        let frame: WorkerFrame =
            serde_json::from_str(r#"{"type":"result","correlationId":"k1"}"#).unwrap();
        let WorkerFrame::Result { value, .. } = frame else {
            panic!("expected result frame");
        };
        assert!(value.is_none());
        assert!(result_value(value.as_ref()).is_undefined());
    }

    #[test]
    fn parse_ping() {
        let frame: WorkerFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame, WorkerFrame::Ping);
    }

    #[test]
    fn unknown_type_is_error() {
        assert!(serde_json::from_str::<WorkerFrame>(r#"{"type":"launch"}"#).is_err());
        assert!(serde_json::from_str::<WorkerFrame>(r#"{"type":"result"}"#).is_err());
    }

    #[test]
    fn result_value_decodes_wire_encoding() {
        let v = result_value(Some(&json!({"$date": 0})));
        assert_eq!(v, ForeignValue::Date(0.0));
    }
}
