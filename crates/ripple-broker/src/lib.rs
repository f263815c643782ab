//! # ripple-broker
//!
//! Filtered publish/subscribe over `graphql-transport-ws` sessions.
//!
//! The broker is stateless: each call reads and writes Connection and
//! Subscription records through a [`RecordStore`](ripple_store::RecordStore)
//! and reaches clients through a [`DeliveryChannel`]. Any number of broker
//! clones, in any number of processes, can serve the same sessions.
//!
//! - [`Broker::handle`]: session protocol handler
//! - [`Broker::publish`] / [`Broker::complete`]: topic fan-out
//! - [`Broker::heartbeat_step`]: one tick of the liveness state machine
//! - [`SubscriptionTable`]: root field to topic, filter and hooks
//! - [`ServerHooks`]: optional server-level hooks

#![deny(unsafe_code)]

pub mod broker;
pub mod config;
pub mod definition;
pub mod delivery;
pub mod engine;
pub mod errors;
pub mod fanout;
pub mod filter;
pub mod heartbeat;
pub mod hooks;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_support;

pub use broker::{Broker, BrokerBuilder};
pub use config::{BrokerConfig, HeartbeatConfig};
pub use definition::{
    CompleteArgs, DynamicFilter, FilterSource, SubscribeArgs, SubscriptionDefinition,
    SubscriptionTable,
};
pub use delivery::{CloseOutcome, DeliveryChannel};
pub use engine::{PassthroughEngine, QueryEngine, ResolvedOperation};
pub use errors::{BrokerError, DeliveryError, HookError, Result, TimerError};
pub use fanout::PublishReport;
pub use hooks::{
    ConnectionArgs, ConnectionInitArgs, ErrorArgs, HookFn, HookFuture, PingArgs, ServerHooks,
    hook_fn,
};
pub use registry::SubscribeOutcome;
pub use session::SUBPROTOCOL_HEADER;
pub use timer::TimerService;
