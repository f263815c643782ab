//! [`RecordStore`] over a pooled `SQLite` database.

use std::path::Path;

use async_trait::async_trait;
use ripple_core::{Connection, ConnectionId, OperationId, Subscription};
use rusqlite::Connection as Db;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};
use crate::record_store::RecordStore;
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::{ConnectionRepo, SubscriptionRepo};

/// `SQLite`-backed record store.
///
/// Blocking database work runs on tokio's blocking pool, one pooled
/// connection per call.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: ConnectionPool,
}

impl SqliteRecordStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| StoreError::Internal(format!("non-UTF-8 path: {}", path.display())))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Internal(format!("create {}: {e}", parent.display())))?;
        }
        let store = Self::new(connection::new_file(path_str, config)?);
        store.migrate()?;
        info!(path = %path.display(), "opened sqlite record store");
        Ok(store)
    }

    /// Fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let store = Self::new(connection::new_in_memory(&ConnectionConfig::default())?);
        store.migrate()?;
        Ok(store)
    }

    /// Apply pending migrations.
    pub fn migrate(&self) -> Result<u32> {
        let conn = self.pool.get()?;
        run_migrations(&conn)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Db) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        let id = id.clone();
        self.with_conn(move |db| ConnectionRepo::get(db, &id)).await
    }

    async fn create_connection(&self, connection: &Connection) -> Result<bool> {
        let connection = connection.clone();
        self.with_conn(move |db| ConnectionRepo::insert_if_absent(db, &connection))
            .await
    }

    async fn set_connection_init_payload(
        &self,
        id: &ConnectionId,
        payload: &Value,
    ) -> Result<bool> {
        let id = id.clone();
        let payload = payload.clone();
        self.with_conn(move |db| ConnectionRepo::set_init_payload(db, &id, &payload))
            .await
    }

    async fn set_has_ponged(&self, id: &ConnectionId, has_ponged: bool) -> Result<bool> {
        let id = id.clone();
        self.with_conn(move |db| ConnectionRepo::set_has_ponged(db, &id, has_ponged))
            .await
    }

    async fn delete_connection(&self, id: &ConnectionId) -> Result<bool> {
        let id = id.clone();
        let removed = self.with_conn(move |db| ConnectionRepo::delete(db, &id)).await?;
        debug!(removed, "delete connection");
        Ok(removed)
    }

    async fn get_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<Option<Subscription>> {
        let (c, o) = (connection_id.clone(), operation_id.clone());
        self.with_conn(move |db| SubscriptionRepo::get(db, &c, &o)).await
    }

    async fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        let subscription = subscription.clone();
        self.with_conn(move |db| SubscriptionRepo::upsert(db, &subscription))
            .await
    }

    async fn delete_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<bool> {
        let (c, o) = (connection_id.clone(), operation_id.clone());
        self.with_conn(move |db| SubscriptionRepo::delete(db, &c, &o)).await
    }

    async fn query_by_topic(&self, topic: &str) -> Result<Vec<Subscription>> {
        let topic = topic.to_owned();
        self.with_conn(move |db| SubscriptionRepo::list_by_topic(db, &topic))
            .await
    }

    async fn query_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Subscription>> {
        let id = connection_id.clone();
        self.with_conn(move |db| SubscriptionRepo::list_by_connection(db, &id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connection, subscription};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn connection_lifecycle() {
        let store = SqliteRecordStore::in_memory().unwrap();
        let conn = connection("c1");

        assert!(store.create_connection(&conn).await.unwrap());
        assert!(!store.create_connection(&conn).await.unwrap());
        assert!(store.set_connection_init_payload(&conn.id, &json!({"a": 1})).await.unwrap());
        assert!(store.set_has_ponged(&conn.id, true).await.unwrap());

        let stored = store.get_connection(&conn.id).await.unwrap().unwrap();
        assert!(stored.is_initialized());
        assert!(stored.has_ponged);

        assert!(store.delete_connection(&conn.id).await.unwrap());
        assert!(!store.delete_connection(&conn.id).await.unwrap());
    }

    #[tokio::test]
    async fn subscription_scans() {
        let store = SqliteRecordStore::in_memory().unwrap();
        store.put_subscription(&subscription("c1", "1", "t")).await.unwrap();
        store.put_subscription(&subscription("c2", "1", "t")).await.unwrap();

        assert_eq!(store.query_by_topic("t").await.unwrap().len(), 2);
        assert_eq!(
            store
                .query_by_connection(&ConnectionId::from("c2"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ripple.db");
        let config = ConnectionConfig::default();

        {
            let store = SqliteRecordStore::open(&path, &config).unwrap();
            let _ = store.create_connection(&connection("c1")).await.unwrap();
            store.put_subscription(&subscription("c1", "1", "t")).await.unwrap();
        }

        let store = SqliteRecordStore::open(&path, &config).unwrap();
        assert!(store.get_connection(&ConnectionId::from("c1")).await.unwrap().is_some());
        assert_eq!(store.query_by_topic("t").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteRecordStore::open(&dir.path().join("r.db"), &ConnectionConfig::default())
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create_connection(&connection("same")).await.unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
