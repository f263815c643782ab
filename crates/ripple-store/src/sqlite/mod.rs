//! `SQLite` backend for the record store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL pragmas on every connection
//! - **[`migrations`]**: version-tracked schema, embedded at compile time
//! - **[`repositories`]**: stateless SQL per table
//! - **[`store`]**: the async [`RecordStore`](crate::RecordStore) adapter

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use migrations::{current_version, latest_version, run_migrations};
pub use store::SqliteRecordStore;
