//! Graceful shutdown via a shared `CancellationToken`.
//!
//! The listener, every socket session and the heartbeat timer driver watch
//! the same token. Cancelling it stops new upgrades, closes sessions (each
//! runs its disconnect cleanup) and drops pending heartbeat executions.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits by default.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owner of the server-wide cancellation token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then wait up to `timeout` for the server task to finish.
    ///
    /// Returns `false` when the task was still running at the deadline.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Duration) -> bool {
        self.shutdown();
        info!(timeout_secs = timeout.as_secs(), "draining sessions");
        match tokio::time::timeout(timeout, server).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "server task ended abnormally");
                true
            }
            Err(_) => {
                warn!("drain timed out after {timeout:?}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_cancels_every_clone() {
        let coord = ShutdownCoordinator::new();
        let session = coord.token();
        let timers = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(session.is_cancelled() && timers.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_waits_for_server_task() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let server = tokio::spawn(async move { token.cancelled().await });
        assert!(coord.drain(server, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_at_deadline() {
        let coord = ShutdownCoordinator::new();
        let server = tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        assert!(!coord.drain(server, Duration::from_millis(50)).await);
        assert!(coord.is_shutting_down());
    }
}
