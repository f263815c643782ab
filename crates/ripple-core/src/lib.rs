//! # ripple-core
//!
//! Foundation types shared by every Ripple crate.
//!
//! - **Branded IDs**: [`ConnectionId`](ids::ConnectionId) and
//!   [`OperationId`](ids::OperationId) as newtypes for type safety
//! - **Data model**: persisted [`Connection`](model::Connection) and
//!   [`Subscription`](model::Subscription) records
//! - **Protocol**: `graphql-transport-ws` client/server messages
//! - **Heartbeat token**: [`StateFunctionInput`](heartbeat::StateFunctionInput)
//!   round-tripped through the durable timer
//! - **Session events**: transport-neutral inbound events and acknowledgements
//! - **Retry math** and **logging** bootstrap

#![deny(unsafe_code)]

pub mod event;
pub mod heartbeat;
pub mod ids;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod retry;
pub mod session;

pub use event::PubSubEvent;
pub use heartbeat::{HeartbeatState, StateFunctionInput};
pub use ids::{ConnectionId, OperationId};
pub use model::{Connection, RequestContext, Subscription};
pub use protocol::{ClientMessage, GraphqlError, ServerMessage, SubscribePayload};
pub use session::{SessionEvent, SessionRoute, TransportResponse};
