//! `graphql-transport-ws` wire messages.
//!
//! Messages are JSON objects tagged by a `type` field. Client-to-server and
//! server-to-client messages are separate enums so each side only parses what
//! it may legally receive.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::OperationId;

/// Sub-protocol name advertised in the `Sec-WebSocket-Protocol` header.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Close codes used by the protocol.
pub mod close_code {
    /// Internal server error.
    pub const INTERNAL_ERROR: u16 = 4500;
    /// Malformed or unexpected message.
    pub const BAD_REQUEST: u16 = 4400;
    /// Operation attempted before `connection_init` succeeded.
    pub const UNAUTHORIZED: u16 = 4401;
    /// `connection_init` rejected by the server.
    pub const FORBIDDEN: u16 = 4403;
    /// Liveness check failed.
    pub const CONNECTION_TIMEOUT: u16 = 4408;
}

/// Payload of a `subscribe` message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    /// Query document text.
    pub query: String,
    /// Operation to run when the document holds several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variable values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    /// Protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

/// A GraphQL-style error entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable description.
    pub message: String,
    /// Response path the error relates to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Implementation-specific details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphqlError {
    /// Build an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

impl std::fmt::Display for GraphqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Messages a client may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session handshake.
    ConnectionInit {
        /// Arbitrary handshake data (auth tokens and similar).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Register an operation.
    Subscribe {
        /// Client-chosen operation ID.
        id: OperationId,
        /// Operation to run.
        payload: SubscribePayload,
    },
    /// Client-initiated liveness probe.
    Ping {
        /// Optional opaque data.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Reply to a server ping.
    Pong {
        /// Optional opaque data.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Stop an operation.
    Complete {
        /// Operation to stop.
        id: OperationId,
    },
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionInit { .. } => "connection_init",
            Self::Subscribe { .. } => "subscribe",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Complete { .. } => "complete",
        }
    }
}

/// Messages the server may send.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    ConnectionAck {
        /// Optional data for the client.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Server-initiated liveness probe.
    Ping {
        /// Optional opaque data.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Reply to a client ping.
    Pong {
        /// Optional opaque data.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// One execution result for an operation.
    Next {
        /// Operation the result belongs to.
        id: OperationId,
        /// Execution result (`{"data": ..., "errors": ...}`).
        payload: Value,
    },
    /// Operation failed before producing results.
    Error {
        /// Operation that failed.
        id: OperationId,
        /// Validation or execution errors.
        payload: Vec<GraphqlError>,
    },
    /// Operation finished.
    Complete {
        /// Operation that finished.
        id: OperationId,
    },
}

impl ServerMessage {
    /// Serialize to a text frame.
    pub fn to_json(&self) -> String {
        // Every variant is a plain tree of strings, maps and arrays.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Serialize to frame bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parse_connection_init_without_payload() {
        let msg = ClientMessage::parse(r#"{"type":"connection_init"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ConnectionInit { payload: None });
    }

    #[test]
    fn parse_subscribe() {
        let msg = ClientMessage::parse(
            r#"{"type":"subscribe","id":"1","payload":{"query":"subscription { a }","operationName":"A","variables":{"x":1}}}"#,
        )
        .unwrap();
        assert_matches!(msg, ClientMessage::Subscribe { id, payload } => {
            assert_eq!(id.as_str(), "1");
            assert_eq!(payload.operation_name.as_deref(), Some("A"));
            assert_eq!(payload.variables.unwrap()["x"], json!(1));
        });
    }

    #[test]
    fn parse_complete() {
        let msg = ClientMessage::parse(r#"{"type":"complete","id":"7"}"#).unwrap();
        assert_eq!(msg.kind(), "complete");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(ClientMessage::parse(r#"{"type":"start","id":"1"}"#).is_err());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn server_message_is_type_tagged() {
        let msg = ServerMessage::Next {
            id: OperationId::from("1"),
            payload: json!({"data": {"a": 1}}),
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "next");
        assert_eq!(value["id"], "1");
        assert_eq!(value["payload"]["data"]["a"], 1);
    }

    #[test]
    fn connection_ack_omits_empty_payload() {
        let json = ServerMessage::ConnectionAck { payload: None }.to_json();
        assert_eq!(json, r#"{"type":"connection_ack"}"#);
    }

    #[test]
    fn error_message_carries_error_array() {
        let msg = ServerMessage::Error {
            id: OperationId::from("2"),
            payload: vec![GraphqlError::new("nope")],
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["payload"][0]["message"], "nope");
    }
}
