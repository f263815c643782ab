//! Push-delivery boundary.

use async_trait::async_trait;
use ripple_core::{ConnectionId, RequestContext};

use crate::errors::DeliveryError;

/// Result of a force-close request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The session was open and is now closing.
    Closed,
    /// The session was already gone.
    AlreadyGone,
}

/// Pushes frames to, and closes, transport sessions.
///
/// `request_context` carries the endpoint coordinates of the session. Local
/// transports may ignore it, and transports without close codes may ignore
/// `code`.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send one text frame.
    async fn push(
        &self,
        request_context: &RequestContext,
        connection_id: &ConnectionId,
        data: &[u8],
    ) -> Result<(), DeliveryError>;

    /// Close the session from the server side with a protocol close code.
    async fn force_close(
        &self,
        request_context: &RequestContext,
        connection_id: &ConnectionId,
        code: u16,
    ) -> Result<CloseOutcome, DeliveryError>;
}
