//! # ripple-server
//!
//! Reference runtime for the Ripple broker in a single process.
//!
//! - [`websocket`]: `graphql-transport-ws` upgrade and per-socket pump
//! - [`delivery::LocalDelivery`]: delivery channel over attached sockets
//! - [`timer`]: tokio-driven heartbeat executions
//! - [`server::RippleServer`]: router with `/ws`, `/publish`, `/complete`,
//!   `/health` and `/metrics`, plus graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod timer;
pub mod websocket;

pub use config::ServerConfig;
pub use delivery::{LocalDelivery, Outbound};
pub use errors::{Result, ServerError};
pub use server::{AppState, RippleServer};
pub use shutdown::ShutdownCoordinator;
pub use timer::{TimerDriver, TokioTimer};
