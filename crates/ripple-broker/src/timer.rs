//! Durable-timer boundary for the heartbeat.

use async_trait::async_trait;
use ripple_core::StateFunctionInput;

use crate::errors::TimerError;

/// Starts a heartbeat execution.
///
/// The service waits `input.seconds`, invokes
/// [`Broker::heartbeat_step`](crate::Broker::heartbeat_step) with the token,
/// and keeps going with each returned token until it gets `None` or an
/// `ABORT` token.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Schedule the first tick.
    async fn start(&self, input: StateFunctionInput) -> Result<(), TimerError>;
}
