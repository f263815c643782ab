//! Subscription repository: CRUD and scans for the `subscriptions` table.
//!
//! Rows are keyed by `(connection_id, operation_id)`; `topic` is indexed for
//! fan-out scans.

use rusqlite::types::Type;
use rusqlite::{Connection as Db, OptionalExtension, params};

use ripple_core::{ConnectionId, OperationId, RequestContext, SubscribePayload, Subscription};

use crate::errors::Result;

const COLUMNS: &str = "connection_id, operation_id, topic, filter, field, subscription, \
                       domain_name, stage, connection_init_payload, created_at";

/// Subscription repository.
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Insert or replace by composite key.
    pub fn upsert(db: &Db, sub: &Subscription) -> Result<()> {
        let payload = serde_json::to_string(&sub.subscription)?;
        let _ = db.execute(
            "INSERT OR REPLACE INTO subscriptions
                 (connection_id, operation_id, topic, filter, field, subscription,
                  domain_name, stage, connection_init_payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                sub.connection_id.as_str(),
                sub.operation_id.as_str(),
                sub.topic,
                sub.filter,
                sub.field,
                payload,
                sub.request_context.domain_name,
                sub.request_context.stage,
                sub.connection_init_payload,
                sub.created_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch by composite key.
    pub fn get(
        db: &Db,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<Option<Subscription>> {
        let row = db
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM subscriptions
                     WHERE connection_id = ?1 AND operation_id = ?2"
                ),
                params![connection_id.as_str(), operation_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Delete by composite key. Returns whether a row existed.
    pub fn delete(
        db: &Db,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<bool> {
        let changed = db.execute(
            "DELETE FROM subscriptions WHERE connection_id = ?1 AND operation_id = ?2",
            params![connection_id.as_str(), operation_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// All rows on a topic.
    pub fn list_by_topic(db: &Db, topic: &str) -> Result<Vec<Subscription>> {
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE topic = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(params![topic], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All rows owned by a connection.
    pub fn list_by_connection(db: &Db, connection_id: &ConnectionId) -> Result<Vec<Subscription>> {
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM subscriptions WHERE connection_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(params![connection_id.as_str()], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
        let payload: String = row.get(5)?;
        let subscription: SubscribePayload = serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
        Ok(Subscription {
            connection_id: ConnectionId::from_string(row.get(0)?),
            operation_id: OperationId::from_string(row.get(1)?),
            topic: row.get(2)?,
            filter: row.get(3)?,
            field: row.get(4)?,
            subscription,
            request_context: RequestContext {
                domain_name: row.get(6)?,
                stage: row.get(7)?,
            },
            connection_init_payload: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use crate::test_support::subscription;
    use serde_json::json;

    fn setup() -> Db {
        let db = Db::open_in_memory().unwrap();
        let _ = run_migrations(&db).unwrap();
        db
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let db = setup();
        let mut sub = subscription("c1", "op1", "messages");
        sub.filter = Some(json!({"room": "A"}));
        sub.connection_init_payload = Some(json!({"user": "u"}));
        SubscriptionRepo::upsert(&db, &sub).unwrap();

        let stored = SubscriptionRepo::get(&db, &sub.connection_id, &sub.operation_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored, sub);
    }

    #[test]
    fn null_filter_round_trips_as_none() {
        let db = setup();
        let sub = subscription("c1", "op1", "messages");
        SubscriptionRepo::upsert(&db, &sub).unwrap();
        let stored = SubscriptionRepo::get(&db, &sub.connection_id, &sub.operation_id)
            .unwrap()
            .unwrap();
        assert!(stored.filter.is_none());
    }

    #[test]
    fn upsert_replaces_same_key() {
        let db = setup();
        let mut sub = subscription("c1", "op1", "a");
        SubscriptionRepo::upsert(&db, &sub).unwrap();
        sub.topic = "b".into();
        SubscriptionRepo::upsert(&db, &sub).unwrap();

        assert!(SubscriptionRepo::list_by_topic(&db, "a").unwrap().is_empty());
        assert_eq!(SubscriptionRepo::list_by_topic(&db, "b").unwrap().len(), 1);
    }

    #[test]
    fn scans_by_topic_and_connection() {
        let db = setup();
        SubscriptionRepo::upsert(&db, &subscription("c1", "1", "t")).unwrap();
        SubscriptionRepo::upsert(&db, &subscription("c1", "2", "u")).unwrap();
        SubscriptionRepo::upsert(&db, &subscription("c2", "1", "t")).unwrap();

        assert_eq!(SubscriptionRepo::list_by_topic(&db, "t").unwrap().len(), 2);
        let owned = SubscriptionRepo::list_by_connection(&db, &ConnectionId::from("c1")).unwrap();
        let ops: Vec<&str> = owned.iter().map(|s| s.operation_id.as_str()).collect();
        assert_eq!(owned.len(), 2);
        assert!(ops.contains(&"1") && ops.contains(&"2"));
    }

    #[test]
    fn delete_reports_presence() {
        let db = setup();
        let sub = subscription("c1", "1", "t");
        SubscriptionRepo::upsert(&db, &sub).unwrap();
        assert!(SubscriptionRepo::delete(&db, &sub.connection_id, &sub.operation_id).unwrap());
        assert!(!SubscriptionRepo::delete(&db, &sub.connection_id, &sub.operation_id).unwrap());
    }
}
