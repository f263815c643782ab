//! In-process heartbeat timer.
//!
//! [`TokioTimer`] is the [`TimerService`] handed to the broker; it only
//! enqueues tokens. [`TimerDriver`] owns the queue and runs one task per
//! heartbeat execution: sleep `seconds`, call
//! [`Broker::heartbeat_step`], repeat with the returned token.
//!
//! Executions live only as long as this process. A deployment that needs
//! heartbeats to survive restarts plugs a durable [`TimerService`] into the
//! broker instead.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use ripple_broker::{Broker, TimerError, TimerService};
use ripple_core::StateFunctionInput;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::HEARTBEAT_TICK_FAILURES_TOTAL;

/// First wait before retrying a failed tick with the same token.
const TICK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the retry wait; failed ticks are retried indefinitely.
const MAX_TICK_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Enqueues heartbeat executions for a [`TimerDriver`].
#[derive(Clone, Debug)]
pub struct TokioTimer {
    tx: mpsc::UnboundedSender<StateFunctionInput>,
}

#[async_trait]
impl TimerService for TokioTimer {
    async fn start(&self, input: StateFunctionInput) -> Result<(), TimerError> {
        self.tx
            .send(input)
            .map_err(|_| TimerError::Schedule("timer driver stopped".into()))
    }
}

/// Runs the executions queued through its [`TokioTimer`].
#[derive(Debug)]
pub struct TimerDriver {
    rx: mpsc::UnboundedReceiver<StateFunctionInput>,
}

/// Create a connected timer and driver.
pub fn channel() -> (TokioTimer, TimerDriver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TokioTimer { tx }, TimerDriver { rx })
}

impl TimerDriver {
    /// Run until `token` is cancelled or every [`TokioTimer`] is dropped.
    pub async fn run(mut self, broker: Broker, token: CancellationToken) {
        let mut executions = JoinSet::new();
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(input) => {
                        let _ = executions.spawn(execute(broker.clone(), input, token.clone()));
                    }
                    None => break,
                },
                Some(_) = executions.join_next(), if !executions.is_empty() => {}
            }
        }
        info!(running = executions.len(), "timer driver stopping");
        executions.shutdown().await;
    }
}

async fn execute(broker: Broker, mut input: StateFunctionInput, token: CancellationToken) {
    let mut wait = Duration::from_secs(input.seconds);
    let mut failures: u32 = 0;
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }
        match broker.heartbeat_step(&input).await {
            Ok(Some(next)) if !next.is_terminal() => {
                failures = 0;
                wait = Duration::from_secs(next.seconds);
                input = next;
            }
            Ok(_) => {
                debug!(connection_id = %input.connection_id, "heartbeat execution finished");
                return;
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                counter!(HEARTBEAT_TICK_FAILURES_TOTAL).increment(1);
                wait = retry_delay(failures);
                warn!(
                    connection_id = %input.connection_id,
                    error = %e,
                    failures,
                    retry_in_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "heartbeat tick failed, retrying"
                );
            }
        }
    }
}

/// Doubling wait after the `failures`-th consecutive failed tick.
fn retry_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    TICK_RETRY_DELAY
        .saturating_mul(1 << exponent)
        .min(MAX_TICK_RETRY_DELAY)
}
