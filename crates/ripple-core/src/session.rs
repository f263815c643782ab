//! Inbound session events and transport acknowledgements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ConnectionId;
use crate::model::RequestContext;

/// Which transport route produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRoute {
    /// Session opened.
    Connect,
    /// Session closed.
    Disconnect,
    /// Text frame received.
    Message,
}

/// One inbound invocation from the transport adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Route that fired.
    pub route: SessionRoute,
    /// Session the event belongs to.
    pub connection_id: ConnectionId,
    /// Routing coordinates of the session.
    pub request_context: RequestContext,
    /// Frame text for `Message`; ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl SessionEvent {
    /// A connect event.
    pub fn connect(connection_id: ConnectionId, request_context: RequestContext) -> Self {
        Self {
            route: SessionRoute::Connect,
            connection_id,
            request_context,
            body: None,
        }
    }

    /// A disconnect event.
    pub fn disconnect(connection_id: ConnectionId, request_context: RequestContext) -> Self {
        Self {
            route: SessionRoute::Disconnect,
            connection_id,
            request_context,
            body: None,
        }
    }

    /// A message event carrying `body`.
    pub fn message(
        connection_id: ConnectionId,
        request_context: RequestContext,
        body: impl Into<String>,
    ) -> Self {
        Self {
            route: SessionRoute::Message,
            connection_id,
            request_context,
            body: Some(body.into()),
        }
    }
}

/// Acknowledgement returned to the transport for one invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportResponse {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl TransportResponse {
    /// 200 with no body.
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// Bare status.
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Status with a text body.
    pub fn with_body(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::status(status_code)
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.headers.insert(name.into(), value.into());
        self
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_event_carries_body() {
        let event = SessionEvent::message(
            ConnectionId::from("c"),
            RequestContext::default(),
            r#"{"type":"ping"}"#,
        );
        assert_eq!(event.route, SessionRoute::Message);
        assert_eq!(event.body.as_deref(), Some(r#"{"type":"ping"}"#));
    }

    #[test]
    fn connect_event_has_no_body() {
        let event = SessionEvent::connect(ConnectionId::from("c"), RequestContext::default());
        assert!(event.body.is_none());
    }

    #[test]
    fn response_builder() {
        let resp = TransportResponse::ok().header("Sec-WebSocket-Protocol", "graphql-transport-ws");
        assert!(resp.is_success());
        assert_eq!(
            resp.headers.get("Sec-WebSocket-Protocol").map(String::as_str),
            Some("graphql-transport-ws")
        );
    }

    #[test]
    fn error_status_is_not_success() {
        let resp = TransportResponse::with_body(400, "bad");
        assert!(!resp.is_success());
        assert_eq!(resp.body.as_deref(), Some("bad"));
    }

    #[test]
    fn route_serializes_lowercase() {
        let json = serde_json::to_string(&SessionRoute::Disconnect).unwrap();
        assert_eq!(json, "\"disconnect\"");
    }
}
