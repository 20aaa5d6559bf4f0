//! Request/response and event framing spoken by the structured client over
//! a single channel.
//!
//! Responses are distinguished from events by the presence of an `id` field;
//! the untagged [`Message`] enum performs that classification, with a
//! forward-compatible catch-all for anything newer workers may emit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request id for correlating the response.
    pub id: u32,
    /// Method name to invoke.
    pub method: String,
    /// Method parameters as a JSON object.
    pub params: Value,
}

/// Response from the worker, correlated by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    /// Success result (mutually exclusive with `error`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error result (mutually exclusive with `result`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Error details attached to a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Error type name, when the worker provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Unsolicited event from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub method: String,
    pub params: Value,
}

/// Discriminated union of inbound client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Response message (has an `id` field).
    Response(Response),
    /// Event message (no `id` field).
    Event(Event),
    /// Unknown message shape (forward-compatible catch-all).
    Unknown(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_response_by_id_field() {
        let msg: Message =
            serde_json::from_value(serde_json::json!({"id": 4, "result": {"ok": true}})).unwrap();
        match msg {
            Message::Response(r) => {
                assert_eq!(r.id, 4);
                assert!(r.error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classifies_event_without_id() {
        let msg: Message = serde_json::from_value(
            serde_json::json!({"method": "processExit", "params": {"code": 0}}),
        )
        .unwrap();
        match msg {
            Message::Event(e) => assert_eq!(e.method, "processExit"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_shape_falls_through_to_unknown() {
        let msg: Message = serde_json::from_value(serde_json::json!({"heartbeat": 1})).unwrap();
        assert!(matches!(msg, Message::Unknown(_)));
    }
}
