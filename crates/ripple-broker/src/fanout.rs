//! Topic fan-out: `publish` and server-side `complete`.
//!
//! Matching subscriptions are delivered concurrently, bounded by
//! `BrokerConfig::concurrency`. A failed delivery never aborts the fan-out:
//! `gone` prunes the connection, and transient failures are retried with
//! backoff and then dropped for that one subscription.

use std::time::Instant;

use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use ripple_core::{ConnectionId, PubSubEvent, RequestContext, ServerMessage, Subscription};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::broker::Broker;
use crate::errors::{DeliveryError, Result};
use crate::filter;
use crate::metrics::{
    DELIVERIES_TOTAL, DELIVERY_RETRIES_TOTAL, FANOUT_DURATION_SECONDS, PUBLISHES_TOTAL,
};

/// Tally of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Subscriptions whose filter matched the event.
    pub matched: usize,
    /// Successful deliveries.
    pub delivered: usize,
    /// Deliveries that found the connection gone.
    pub pruned: usize,
    /// Deliveries dropped after exhausting retries or failing cleanup.
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Pruned,
    Failed,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Pruned => "pruned",
            Self::Failed => "failed",
        }
    }
}

impl PublishReport {
    fn tally(outcomes: &[Outcome]) -> Self {
        let mut report = Self {
            matched: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Pruned => report.pruned += 1,
                Outcome::Failed => report.failed += 1,
            }
        }
        report
    }
}

impl Broker {
    /// Push a `next` message to every subscription matching `event`.
    #[instrument(skip_all, fields(topic = %event.topic))]
    pub async fn publish(&self, event: &PubSubEvent) -> Result<PublishReport> {
        counter!(PUBLISHES_TOTAL).increment(1);
        let started = Instant::now();
        let matched = self.matching(event).await?;

        let outcomes: Vec<Outcome> = stream::iter(matched)
            .map(|subscription| async move { self.deliver_next(&subscription, event).await })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = PublishReport::tally(&outcomes);
        histogram!(FANOUT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(?report, "publish finished");
        Ok(report)
    }

    /// Push `complete` to every subscription matching `event` and end them.
    ///
    /// A subscription whose `complete` frame could not be delivered after
    /// retries is kept.
    #[instrument(skip_all, fields(topic = %event.topic))]
    pub async fn complete(&self, event: &PubSubEvent) -> Result<PublishReport> {
        let started = Instant::now();
        let matched = self.matching(event).await?;

        let outcomes: Vec<Outcome> = stream::iter(matched)
            .map(|subscription| async move { self.deliver_complete(&subscription).await })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = PublishReport::tally(&outcomes);
        histogram!(FANOUT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(?report, "complete finished");
        Ok(report)
    }

    async fn matching(&self, event: &PubSubEvent) -> Result<Vec<Subscription>> {
        let subscriptions = self.store.query_by_topic(&event.topic).await?;
        Ok(subscriptions
            .into_iter()
            .filter(|s| filter::matches(&event.payload, s.filter.as_ref()))
            .collect())
    }

    async fn deliver_next(&self, subscription: &Subscription, event: &PubSubEvent) -> Outcome {
        let context = self.hooks.build_context(
            subscription.connection_init_payload.as_ref(),
            &subscription.connection_id,
        );
        let payload = self.engine.execute(subscription, event, &context).await;
        let message = ServerMessage::Next {
            id: subscription.operation_id.clone(),
            payload,
        };
        let pushed = self
            .push_with_retry(
                &subscription.request_context,
                &subscription.connection_id,
                &message.to_bytes(),
            )
            .await;

        let outcome = match pushed {
            Ok(()) => Outcome::Delivered,
            Err(error) => self.delivery_failed(subscription, &error, "publish").await,
        };
        counter!(DELIVERIES_TOTAL, "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn deliver_complete(&self, subscription: &Subscription) -> Outcome {
        let message = ServerMessage::Complete {
            id: subscription.operation_id.clone(),
        };
        let pushed = self
            .push_with_retry(
                &subscription.request_context,
                &subscription.connection_id,
                &message.to_bytes(),
            )
            .await;

        let outcome = match pushed {
            Ok(()) => match self.end_subscription(subscription).await {
                Ok(()) => Outcome::Delivered,
                Err(e) => {
                    warn!(error = %e, "failed to end subscription");
                    self.report(&e, "complete", &subscription.connection_id)
                        .await;
                    Outcome::Failed
                }
            },
            Err(error) => self.delivery_failed(subscription, &error, "complete").await,
        };
        counter!(DELIVERIES_TOTAL, "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn delivery_failed(
        &self,
        subscription: &Subscription,
        error: &DeliveryError,
        stage: &str,
    ) -> Outcome {
        let connection_id = &subscription.connection_id;
        match error {
            DeliveryError::Gone => match self.prune(connection_id).await {
                Ok(()) => Outcome::Pruned,
                Err(e) => {
                    warn!(error = %e, connection_id = %connection_id, "prune failed");
                    self.report(&e, stage, connection_id).await;
                    Outcome::Failed
                }
            },
            DeliveryError::Transient(_) => {
                warn!(
                    error = %error,
                    connection_id = %connection_id,
                    operation_id = %subscription.operation_id,
                    "delivery dropped after retries"
                );
                self.report(error, stage, connection_id).await;
                Outcome::Failed
            }
        }
    }

    /// Push `data`, retrying transient failures with backoff.
    ///
    /// `gone` is returned at once; it never improves with retries.
    pub(crate) async fn push_with_retry(
        &self,
        request_context: &RequestContext,
        connection_id: &ConnectionId,
        data: &[u8],
    ) -> std::result::Result<(), DeliveryError> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match self.delivery.push(request_context, connection_id, data).await {
                Ok(()) => return Ok(()),
                Err(DeliveryError::Transient(reason)) if attempt < retry.max_retries => {
                    let delay = retry.delay_for(attempt);
                    debug!(
                        connection_id = %connection_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        reason = %reason,
                        "push failed, retrying"
                    );
                    counter!(DELIVERY_RETRIES_TOTAL).increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
