//! Subscription registration and completion.

use chrono::Utc;
use metrics::counter;
use ripple_core::{
    Connection, ConnectionId, GraphqlError, OperationId, SubscribePayload, Subscription,
};
use tracing::{debug, info, instrument, warn};

use crate::broker::Broker;
use crate::definition::{CompleteArgs, SubscribeArgs};
use crate::errors::Result;
use crate::metrics::{SUBSCRIPTIONS_REJECTED_TOTAL, SUBSCRIPTIONS_TOTAL};

/// Result of a subscribe request.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscribeOutcome {
    /// The subscription was stored.
    Subscribed(Subscription),
    /// Validation or the `on_subscribe` veto failed; nothing was stored.
    Rejected(Vec<GraphqlError>),
    /// The connection disappeared while subscribing; the write was undone.
    ConnectionGone,
}

impl Broker {
    /// Register `operation_id` on an initialised `connection`.
    ///
    /// Subscribing again with the same operation ID replaces the earlier
    /// subscription.
    #[instrument(skip_all, fields(connection_id = %connection.id, operation_id = %operation_id))]
    pub async fn subscribe(
        &self,
        connection: &Connection,
        operation_id: &OperationId,
        payload: SubscribePayload,
    ) -> Result<SubscribeOutcome> {
        let resolved = match self.engine.resolve(&payload) {
            Ok(resolved) => resolved,
            Err(errors) => return Ok(self.rejected(errors)),
        };
        let Some(definition) = self.table.get(&resolved.field) else {
            return Ok(self.rejected(vec![GraphqlError::new(format!(
                "Unknown subscription field \"{}\"",
                resolved.field
            ))]));
        };

        let context = self
            .hooks
            .build_context(connection.connection_init_payload.as_ref(), &connection.id);
        let args = SubscribeArgs {
            connection_id: connection.id.clone(),
            operation_id: operation_id.clone(),
            field: resolved.field,
            args: resolved.args,
            context,
            payload,
        };

        match definition.subscribe_veto(args.clone()).await {
            Ok(errors) if errors.is_empty() => {}
            Ok(errors) => return Ok(self.rejected(errors)),
            Err(e) => {
                warn!(error = %e, "on_subscribe hook failed");
                self.report(&e, "subscribe", &connection.id).await;
                return Ok(self.rejected(vec![GraphqlError::new(e.to_string())]));
            }
        }

        let topic = match definition.render_topic(&args.args) {
            Ok(topic) => topic,
            Err(error) => return Ok(self.rejected(vec![error])),
        };
        let subscription = Subscription {
            connection_id: connection.id.clone(),
            operation_id: operation_id.clone(),
            topic,
            filter: definition.resolve_filter(&args),
            field: args.field.clone(),
            subscription: args.payload.clone(),
            request_context: connection.request_context.clone(),
            connection_init_payload: connection.connection_init_payload.clone(),
            created_at: Utc::now(),
        };
        self.store.put_subscription(&subscription).await?;

        if self.store.get_connection(&connection.id).await?.is_none() {
            let _ = self
                .store
                .delete_subscription(&connection.id, operation_id)
                .await?;
            debug!("connection vanished during subscribe, subscription removed");
            return Ok(SubscribeOutcome::ConnectionGone);
        }

        counter!(SUBSCRIPTIONS_TOTAL).increment(1);
        info!(topic = %subscription.topic, "subscribed");

        if let Err(e) = definition.after_subscribe(args).await {
            warn!(error = %e, "on_after_subscribe hook failed");
            self.report(&e, "after_subscribe", &connection.id).await;
        }
        Ok(SubscribeOutcome::Subscribed(subscription))
    }

    /// End a subscription at the client's request.
    ///
    /// Returns `false` when there was nothing to complete.
    #[instrument(skip_all, fields(connection_id = %connection_id, operation_id = %operation_id))]
    pub async fn complete_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Result<bool> {
        let Some(subscription) = self
            .store
            .get_subscription(connection_id, operation_id)
            .await?
        else {
            debug!("no subscription to complete");
            return Ok(false);
        };
        self.end_subscription(&subscription).await?;
        Ok(true)
    }

    /// Fire `on_complete`, then delete the record.
    pub(crate) async fn end_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.fire_on_complete(subscription).await;
        let _ = self
            .store
            .delete_subscription(&subscription.connection_id, &subscription.operation_id)
            .await?;
        Ok(())
    }

    async fn fire_on_complete(&self, subscription: &Subscription) {
        let Some(definition) = self.table.get(&subscription.field) else {
            return;
        };
        let context = self.hooks.build_context(
            subscription.connection_init_payload.as_ref(),
            &subscription.connection_id,
        );
        let args = CompleteArgs {
            subscription: subscription.clone(),
            context,
        };
        if let Err(e) = definition.complete(args).await {
            warn!(error = %e, operation_id = %subscription.operation_id, "on_complete hook failed");
            self.report(&e, "complete", &subscription.connection_id)
                .await;
        }
    }

    fn rejected(&self, errors: Vec<GraphqlError>) -> SubscribeOutcome {
        counter!(SUBSCRIPTIONS_REJECTED_TOTAL).increment(1);
        debug!(errors = errors.len(), "subscription rejected");
        SubscribeOutcome::Rejected(errors)
    }
}
