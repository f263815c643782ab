//! Persisted records: [`Connection`] and [`Subscription`].
//!
//! Both are plain data. The store has no referential integrity, so the
//! "a subscription's connection exists" invariant is enforced lazily by the
//! broker on delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ConnectionId, OperationId};
use crate::protocol::SubscribePayload;

/// Routing coordinates needed to push data back to a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Endpoint host the session is attached to.
    pub domain_name: String,
    /// Deployment stage of that endpoint.
    pub stage: String,
}

impl RequestContext {
    /// Build a request context.
    pub fn new(domain_name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            stage: stage.into(),
        }
    }
}

/// One live duplex session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Transport-assigned session ID.
    pub id: ConnectionId,
    /// Where to push data for this session.
    pub request_context: RequestContext,
    /// Payload captured by `connection_init`; `None` until the handshake succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_init_payload: Option<Value>,
    /// Liveness marker: cleared before each heartbeat ping, set by `pong`.
    #[serde(default)]
    pub has_ponged: bool,
    /// When the session was opened.
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// A freshly opened connection that has not completed `connection_init`.
    pub fn new(id: ConnectionId, request_context: RequestContext) -> Self {
        Self {
            id,
            request_context,
            connection_init_payload: None,
            has_ponged: false,
            created_at: Utc::now(),
        }
    }

    /// Whether `connection_init` has been accepted for this session.
    pub fn is_initialized(&self) -> bool {
        self.connection_init_payload.is_some()
    }
}

/// One active topic registration, keyed by `(connection_id, operation_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Owning connection.
    pub connection_id: ConnectionId,
    /// Client-issued operation ID.
    pub operation_id: OperationId,
    /// Topic the registration listens on.
    pub topic: String,
    /// Field-equality filter; `None` matches every event on the topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    /// Root subscription field resolved at subscribe time.
    pub field: String,
    /// Original subscribe payload, replayed when rendering `next` messages.
    pub subscription: SubscribePayload,
    /// Routing coordinates copied from the connection.
    pub request_context: RequestContext,
    /// Snapshot of the connection-init payload for resolver context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_init_payload: Option<Value>,
    /// When the registration was written.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Composite store key, `connection_id|operation_id`.
    pub fn key(&self) -> String {
        subscription_key(&self.connection_id, &self.operation_id)
    }
}

/// Composite key used to address a subscription record.
pub fn subscription_key(connection_id: &ConnectionId, operation_id: &OperationId) -> String {
    format!("{connection_id}|{operation_id}")
}
