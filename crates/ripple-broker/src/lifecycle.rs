//! Connection lifecycle: create, disconnect, prune and abort.
//!
//! Removal always deletes the Connection record before cascading over its
//! Subscriptions, so a subscribe racing with the removal sees the connection
//! gone and cleans up after itself.

use metrics::counter;
use ripple_core::{Connection, ConnectionId, RequestContext};
use tracing::{debug, info, instrument, warn};

use crate::broker::Broker;
use crate::delivery::CloseOutcome;
use crate::errors::Result;
use crate::hooks::ConnectionArgs;
use crate::metrics::{CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL, PRUNES_TOTAL};

impl Broker {
    /// Run `on_connect`, then create the Connection record if absent.
    #[instrument(skip_all, fields(connection_id = %connection_id))]
    pub async fn connect(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
    ) -> Result<()> {
        self.hooks
            .connect(ConnectionArgs {
                connection_id: connection_id.clone(),
                request_context: request_context.clone(),
            })
            .await?;

        let connection = Connection::new(connection_id.clone(), request_context.clone());
        if self.store.create_connection(&connection).await? {
            counter!(CONNECTIONS_TOTAL).increment(1);
            info!("connection opened");
        } else {
            debug!("connection already recorded");
        }
        Ok(())
    }

    /// Run `on_disconnect`, then remove the connection and its subscriptions.
    ///
    /// A failing hook is reported through `on_error` and does not stop the
    /// cleanup.
    #[instrument(skip_all, fields(connection_id = %connection_id))]
    pub async fn disconnect(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
    ) -> Result<()> {
        let args = ConnectionArgs {
            connection_id: connection_id.clone(),
            request_context: request_context.clone(),
        };
        if let Err(e) = self.hooks.disconnect(args).await {
            warn!(error = %e, "on_disconnect hook failed");
            self.report(&e, "disconnect", connection_id).await;
        }

        let ended = self.remove_connection(connection_id).await?;
        counter!(DISCONNECTIONS_TOTAL).increment(1);
        info!(subscriptions = ended, "connection closed");
        Ok(())
    }

    /// Remove a connection the transport reported as gone.
    #[instrument(skip_all, fields(connection_id = %connection_id))]
    pub(crate) async fn prune(&self, connection_id: &ConnectionId) -> Result<()> {
        let ended = self.remove_connection(connection_id).await?;
        counter!(PRUNES_TOTAL).increment(1);
        info!(subscriptions = ended, "pruned stale connection");
        Ok(())
    }

    /// Close the session with `code`, then remove it.
    ///
    /// Safe to repeat: a session that is already closed is still cleaned up.
    #[instrument(skip_all, fields(connection_id = %connection_id, code))]
    pub(crate) async fn abort(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
        code: u16,
    ) -> Result<()> {
        match self
            .delivery
            .force_close(request_context, connection_id, code)
            .await
        {
            Ok(CloseOutcome::Closed) => debug!("session closed"),
            Ok(CloseOutcome::AlreadyGone) => debug!("session already gone"),
            Err(e) => warn!(error = %e, "force close failed"),
        }
        let _ = self.remove_connection(connection_id).await?;
        Ok(())
    }

    /// Delete the Connection, then end each of its Subscriptions.
    ///
    /// Every subscription is attempted. Failures are reported through
    /// `on_error` and the first one is returned after the loop.
    /// Returns the number of subscriptions ended.
    pub(crate) async fn remove_connection(&self, connection_id: &ConnectionId) -> Result<usize> {
        let _ = self.store.delete_connection(connection_id).await?;
        let subscriptions = self.store.query_by_connection(connection_id).await?;
        let mut ended = 0;
        let mut first_error = None;
        for subscription in &subscriptions {
            match self.end_subscription(subscription).await {
                Ok(()) => ended += 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        operation_id = %subscription.operation_id,
                        "failed to end subscription"
                    );
                    self.report(&e, "cascade", connection_id).await;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(ended),
        }
    }
}
