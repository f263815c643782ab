//! Heartbeat token round-tripped through the durable timer.

use serde::{Deserialize, Serialize};

use crate::ids::ConnectionId;
use crate::model::RequestContext;

/// Heartbeat phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeartbeatState {
    /// Send a ping and arm the review.
    Ping,
    /// Check whether a pong arrived since the last ping.
    Review,
    /// Terminal: the connection was reaped.
    Abort,
}

impl std::fmt::Display for HeartbeatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ping => "PING",
            Self::Review => "REVIEW",
            Self::Abort => "ABORT",
        };
        f.write_str(s)
    }
}

/// Resumable heartbeat state for one connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFunctionInput {
    /// Connection being probed.
    pub connection_id: ConnectionId,
    /// Endpoint host.
    pub domain_name: String,
    /// Endpoint stage.
    pub stage: String,
    /// Phase to run on the next tick.
    pub state: HeartbeatState,
    /// Seconds the timer waits before the next tick.
    pub seconds: u64,
}

impl StateFunctionInput {
    /// Build a token for `connection_id` routed through `request_context`.
    pub fn new(
        connection_id: ConnectionId,
        request_context: &RequestContext,
        state: HeartbeatState,
        seconds: u64,
    ) -> Self {
        Self {
            connection_id,
            domain_name: request_context.domain_name.clone(),
            stage: request_context.stage.clone(),
            state,
            seconds,
        }
    }

    /// Same connection, next phase.
    #[must_use]
    pub fn advance(&self, state: HeartbeatState, seconds: u64) -> Self {
        Self {
            state,
            seconds,
            ..self.clone()
        }
    }

    /// Whether the timer should stop after this token.
    pub fn is_terminal(&self) -> bool {
        self.state == HeartbeatState::Abort
    }

    /// Routing coordinates carried by the token.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.domain_name.clone(), self.stage.clone())
    }
}
