//! Gateway protocol schema
//!
//! Defines the wire format for gateway messages: every WebSocket text frame
//! carries one `{ "event": ..., "data": ... }` envelope.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Protocol version
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Frame sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Event name
    pub event: String,
    /// Event data
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ClientFrame {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Frame pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name
    pub event: String,
    /// Event data
    pub data: serde_json::Value,
}

impl EventFrame {
    /// Create a new event from a serializable payload
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        EventFrame {
            event: event.into(),
            // plain structs with string keys always serialize
            data: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// `submissionId` field of the payload, if any
    pub fn submission_id(&self) -> Option<&str> {
        self.data.get("submissionId").and_then(|v| v.as_str())
    }
}

/// Protocol error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
}

/// Standard error codes
pub mod error_codes {
    /// Frame is not valid JSON or not an envelope
    pub const PARSE_ERROR: i32 = -32700;
    /// Unknown event name
    pub const UNKNOWN_EVENT: i32 = -32601;
    /// Binary frames are not supported
    pub const UNSUPPORTED_FRAME: i32 = -32600;
}

impl ProtocolError {
    /// Create a new protocol error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        ProtocolError {
            code,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::PARSE_ERROR, message)
    }

    /// Create an unknown event error
    pub fn unknown_event(event: &str) -> Self {
        Self::new(
            error_codes::UNKNOWN_EVENT,
            format!("Unknown event: {}", event),
        )
    }

    /// Create an unsupported frame error
    pub fn unsupported_frame() -> Self {
        Self::new(error_codes::UNSUPPORTED_FRAME, "Only text frames are supported")
    }
}
