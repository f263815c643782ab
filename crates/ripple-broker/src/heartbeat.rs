//! Heartbeat steps driven by an external durable timer.
//!
//! Each tick consumes a [`StateFunctionInput`] and returns the next one, or
//! `None` when the heartbeat for that connection is over:
//!
//! ```text
//! PING   --(ping pushed)----------------> REVIEW after timeout
//! REVIEW --(pong seen)------------------> PING after delay
//! REVIEW --(no pong: close, remove)-----> ABORT (terminal)
//! ABORT  --(close, remove again)--------> None
//! ```

use metrics::counter;
use ripple_core::protocol::close_code;
use ripple_core::{ConnectionId, HeartbeatState, RequestContext, ServerMessage, StateFunctionInput};
use tracing::{debug, info, instrument, warn};

use crate::broker::Broker;
use crate::errors::{DeliveryError, Result};
use crate::metrics::HEARTBEAT_ABORTS_TOTAL;

impl Broker {
    /// Start the heartbeat for a freshly initialised connection.
    pub async fn start_heartbeat(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
    ) -> Result<()> {
        let input = StateFunctionInput::new(
            connection_id.clone(),
            request_context,
            HeartbeatState::Ping,
            self.config.heartbeat.delay_secs,
        );
        self.timer.start(input).await?;
        debug!(connection_id = %connection_id, "heartbeat started");
        Ok(())
    }

    /// Run one heartbeat tick.
    ///
    /// Store failures are returned for this tick only; the token can be
    /// retried as is.
    #[instrument(skip_all, fields(connection_id = %input.connection_id, state = %input.state))]
    pub async fn heartbeat_step(
        &self,
        input: &StateFunctionInput,
    ) -> Result<Option<StateFunctionInput>> {
        match input.state {
            HeartbeatState::Ping => self.heartbeat_ping(input).await,
            HeartbeatState::Review => self.heartbeat_review(input).await,
            HeartbeatState::Abort => {
                self.abort(
                    &input.connection_id,
                    &input.request_context(),
                    close_code::CONNECTION_TIMEOUT,
                )
                .await?;
                Ok(None)
            }
        }
    }

    async fn heartbeat_ping(
        &self,
        input: &StateFunctionInput,
    ) -> Result<Option<StateFunctionInput>> {
        if self.store.get_connection(&input.connection_id).await?.is_none() {
            debug!("connection gone, heartbeat stopped");
            return Ok(None);
        }
        if !self
            .store
            .set_has_ponged(&input.connection_id, false)
            .await?
        {
            debug!("connection removed before ping, heartbeat stopped");
            return Ok(None);
        }

        let ping = ServerMessage::Ping { payload: None };
        match self
            .push_with_retry(&input.request_context(), &input.connection_id, &ping.to_bytes())
            .await
        {
            Ok(()) => {}
            Err(DeliveryError::Gone) => {
                self.prune(&input.connection_id).await?;
                return Ok(None);
            }
            Err(e) => {
                // a missed ping is judged at review time like any other
                warn!(error = %e, "heartbeat ping not delivered");
                self.report(&e, "heartbeat", &input.connection_id).await;
            }
        }
        Ok(Some(input.advance(
            HeartbeatState::Review,
            self.config.heartbeat.timeout_secs,
        )))
    }

    async fn heartbeat_review(
        &self,
        input: &StateFunctionInput,
    ) -> Result<Option<StateFunctionInput>> {
        let Some(connection) = self.store.get_connection(&input.connection_id).await? else {
            debug!("connection gone, heartbeat stopped");
            return Ok(None);
        };
        if connection.has_ponged {
            return Ok(Some(input.advance(
                HeartbeatState::Ping,
                self.config.heartbeat.delay_secs,
            )));
        }

        info!("no pong within timeout, closing connection");
        counter!(HEARTBEAT_ABORTS_TOTAL).increment(1);
        self.abort(
            &input.connection_id,
            &connection.request_context,
            close_code::CONNECTION_TIMEOUT,
        )
        .await?;
        Ok(Some(input.advance(HeartbeatState::Abort, 0)))
    }
}
