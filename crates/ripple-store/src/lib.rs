//! # ripple-store
//!
//! Persistence for Ripple [`Connection`](ripple_core::Connection) and
//! [`Subscription`](ripple_core::Subscription) records.
//!
//! - [`RecordStore`]: the async boundary the broker depends on
//! - [`SqliteRecordStore`]: pooled `SQLite` with versioned migrations
//! - [`MemoryRecordStore`]: process-local maps for tests and ephemeral runs
//!
//! The store offers per-operation atomicity only. Conditional create and
//! conditional update give first-writer-wins semantics for connections;
//! subscription writes are last-writer-wins and deletes are idempotent.

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod record_store;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use memory::MemoryRecordStore;
pub use record_store::RecordStore;
pub use sqlite::{ConnectionConfig, SqliteRecordStore};
