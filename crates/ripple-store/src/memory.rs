//! In-process [`RecordStore`] backed by hash maps.
//!
//! Each method takes one lock for the duration of one logical operation,
//! which gives the same per-call atomicity as the `SQLite` backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use ripple_core::{Connection, ConnectionId, OperationId, Subscription};
use serde_json::Value;

use crate::errors::Result;
use crate::record_store::RecordStore;

type SubscriptionKey = (ConnectionId, OperationId);

/// Record store that lives and dies with the process.
#[derive(Default)]
pub struct MemoryRecordStore {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    subscriptions: RwLock<BTreeMap<SubscriptionKey, Subscription>>,
}

impl MemoryRecordStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Number of stored subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        Ok(self.connections.read().get(id).cloned())
    }

    async fn create_connection(&self, connection: &Connection) -> Result<bool> {
        let mut connections = self.connections.write();
        if connections.contains_key(&connection.id) {
            return Ok(false);
        }
        let _ = connections.insert(connection.id.clone(), connection.clone());
        Ok(true)
    }

    async fn set_connection_init_payload(
        &self,
        id: &ConnectionId,
        payload: &Value,
    ) -> Result<bool> {
        let mut connections = self.connections.write();
        match connections.get_mut(id) {
            Some(conn) if conn.connection_init_payload.is_none() => {
                conn.connection_init_payload = Some(payload.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_has_ponged(&self, id: &ConnectionId, has_ponged: bool) -> Result<bool> {
        let mut connections = self.connections.write();
        match connections.get_mut(id) {
            Some(conn) => {
                conn.has_ponged = has_ponged;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_connection(&self, id: &ConnectionId) -> Result<bool> {
        Ok(self.connections.write().remove(id).is_some())
    }

    async fn get_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<Option<Subscription>> {
        let key = (connection_id.clone(), operation_id.clone());
        Ok(self.subscriptions.read().get(&key).cloned())
    }

    async fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let key = (
            subscription.connection_id.clone(),
            subscription.operation_id.clone(),
        );
        let _ = self.subscriptions.write().insert(key, subscription.clone());
        Ok(())
    }

    async fn delete_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<bool> {
        let key = (connection_id.clone(), operation_id.clone());
        Ok(self.subscriptions.write().remove(&key).is_some())
    }

    async fn query_by_topic(&self, topic: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .values()
            .filter(|s| s.topic == topic)
            .cloned()
            .collect())
    }

    async fn query_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .values()
            .filter(|s| &s.connection_id == connection_id)
            .cloned()
            .collect())
    }
}
