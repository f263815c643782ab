//! The [`RecordStore`] boundary.
//!
//! Every method is a single atomic operation against the backend. There are
//! no multi-record transactions: callers compose these calls and tolerate
//! interleaving with other invocations.

use async_trait::async_trait;
use ripple_core::{Connection, ConnectionId, OperationId, Subscription};
use serde_json::Value;

use crate::errors::Result;

/// Typed persistence for [`Connection`] and [`Subscription`] records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a connection by ID.
    async fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>>;

    /// Insert `connection` unless a record with the same ID exists.
    ///
    /// Returns `true` if this call created the record (first writer wins).
    async fn create_connection(&self, connection: &Connection) -> Result<bool>;

    /// Set the connection-init payload if the connection exists and has none.
    ///
    /// Returns `true` if the payload was written.
    async fn set_connection_init_payload(&self, id: &ConnectionId, payload: &Value)
    -> Result<bool>;

    /// Set the liveness marker if the connection exists.
    ///
    /// Returns `true` if a record was updated.
    async fn set_has_ponged(&self, id: &ConnectionId, has_ponged: bool) -> Result<bool>;

    /// Delete a connection. Returns `true` if a record was present.
    async fn delete_connection(&self, id: &ConnectionId) -> Result<bool>;

    /// Fetch a subscription by its composite key.
    async fn get_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<Option<Subscription>>;

    /// Write a subscription, replacing any record with the same key.
    async fn put_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Delete a subscription. Returns `true` if a record was present.
    async fn delete_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<bool>;

    /// All subscriptions on `topic`.
    async fn query_by_topic(&self, topic: &str) -> Result<Vec<Subscription>>;

    /// All subscriptions owned by `connection_id`.
    async fn query_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Subscription>>;
}
