//! Connection repository: CRUD for the `connections` table.

use rusqlite::{Connection as Db, OptionalExtension, params};
use serde_json::Value;

use ripple_core::{Connection, ConnectionId, RequestContext};

use crate::errors::Result;

const COLUMNS: &str = "id, domain_name, stage, connection_init_payload, has_ponged, created_at";

/// Connection repository.
pub struct ConnectionRepo;

impl ConnectionRepo {
    /// Insert unless the ID exists. Returns whether a row was inserted.
    pub fn insert_if_absent(db: &Db, conn: &Connection) -> Result<bool> {
        let changed = db.execute(
            "INSERT OR IGNORE INTO connections
                 (id, domain_name, stage, connection_init_payload, has_ponged, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conn.id.as_str(),
                conn.request_context.domain_name,
                conn.request_context.stage,
                conn.connection_init_payload,
                conn.has_ponged,
                conn.created_at,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Fetch by ID.
    pub fn get(db: &Db, id: &ConnectionId) -> Result<Option<Connection>> {
        let row = db
            .query_row(
                &format!("SELECT {COLUMNS} FROM connections WHERE id = ?1"),
                params![id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Write the init payload only if it is still unset.
    pub fn set_init_payload(db: &Db, id: &ConnectionId, payload: &Value) -> Result<bool> {
        let changed = db.execute(
            "UPDATE connections SET connection_init_payload = ?2
             WHERE id = ?1 AND connection_init_payload IS NULL",
            params![id.as_str(), payload],
        )?;
        Ok(changed > 0)
    }

    /// Set the liveness marker of an existing row.
    pub fn set_has_ponged(db: &Db, id: &ConnectionId, has_ponged: bool) -> Result<bool> {
        let changed = db.execute(
            "UPDATE connections SET has_ponged = ?2 WHERE id = ?1",
            params![id.as_str(), has_ponged],
        )?;
        Ok(changed > 0)
    }

    /// Delete by ID. Returns whether a row existed.
    pub fn delete(db: &Db, id: &ConnectionId) -> Result<bool> {
        let changed = db.execute("DELETE FROM connections WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Connection> {
        Ok(Connection {
            id: ConnectionId::from_string(row.get(0)?),
            request_context: RequestContext {
                domain_name: row.get(1)?,
                stage: row.get(2)?,
            },
            connection_init_payload: row.get(3)?,
            has_ponged: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
