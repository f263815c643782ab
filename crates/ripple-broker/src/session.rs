//! `graphql-transport-ws` session handler.
//!
//! [`Broker::handle`] consumes one inbound transport event and returns the
//! acknowledgement for the transport. It never waits on other invocations;
//! everything it knows about the session comes from the record store.

use metrics::counter;
use ripple_core::protocol::{SUBPROTOCOL, close_code};
use ripple_core::{
    ClientMessage, ConnectionId, GraphqlError, OperationId, RequestContext, ServerMessage,
    SessionEvent, SessionRoute, SubscribePayload, TransportResponse,
};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::broker::Broker;
use crate::errors::DeliveryError;
use crate::hooks::{ConnectionInitArgs, PingArgs};
use crate::metrics::{INVALID_MESSAGES_TOTAL, MESSAGES_TOTAL};
use crate::registry::SubscribeOutcome;

/// Header advertising the negotiated subprotocol.
pub const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

impl Broker {
    /// Handle one session event.
    #[instrument(skip_all, fields(connection_id = %event.connection_id, route = ?event.route))]
    pub async fn handle(&self, event: SessionEvent) -> TransportResponse {
        let SessionEvent {
            route,
            connection_id,
            request_context,
            body,
        } = event;

        match route {
            SessionRoute::Connect => self.on_connect(&connection_id, &request_context).await,
            SessionRoute::Disconnect => {
                if let Err(e) = self.disconnect(&connection_id, &request_context).await {
                    warn!(error = %e, "disconnect cleanup failed");
                    self.report(&e, "disconnect", &connection_id).await;
                }
                TransportResponse::ok()
            }
            SessionRoute::Message => {
                self.on_message(
                    &connection_id,
                    &request_context,
                    body.as_deref().unwrap_or_default(),
                )
                .await
            }
        }
    }

    async fn on_connect(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
    ) -> TransportResponse {
        match self.connect(connection_id, request_context).await {
            Ok(()) => TransportResponse::ok().header(SUBPROTOCOL_HEADER, SUBPROTOCOL),
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.report(&e, "connect", connection_id).await;
                TransportResponse::with_body(500, e.to_string())
            }
        }
    }

    async fn on_message(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
        body: &str,
    ) -> TransportResponse {
        let message = match ClientMessage::parse(body) {
            Ok(message) => message,
            Err(e) => {
                counter!(INVALID_MESSAGES_TOTAL).increment(1);
                debug!(error = %e, "invalid message");
                self.report(&e, "message", connection_id).await;
                return TransportResponse::with_body(400, format!("Invalid message: {e}"));
            }
        };
        counter!(MESSAGES_TOTAL, "type" => message.kind()).increment(1);

        match message {
            ClientMessage::ConnectionInit { payload } => {
                self.on_connection_init(connection_id, request_context, payload)
                    .await
            }
            ClientMessage::Subscribe { id, payload } => {
                self.on_subscribe(connection_id, request_context, &id, payload)
                    .await
            }
            ClientMessage::Ping { payload } => {
                let args = PingArgs {
                    connection_id: connection_id.clone(),
                    payload,
                };
                if let Err(e) = self.hooks.ping(args).await {
                    self.report(&e, "ping", connection_id).await;
                }
                self.reply(request_context, connection_id, &ServerMessage::Pong { payload: None })
                    .await;
                TransportResponse::ok()
            }
            ClientMessage::Pong { payload } => {
                let args = PingArgs {
                    connection_id: connection_id.clone(),
                    payload,
                };
                if let Err(e) = self.hooks.pong(args).await {
                    self.report(&e, "pong", connection_id).await;
                }
                if let Err(e) = self.store.set_has_ponged(connection_id, true).await {
                    warn!(error = %e, "failed to record pong");
                    self.report(&e, "pong", connection_id).await;
                }
                TransportResponse::ok()
            }
            ClientMessage::Complete { id } => {
                match self.complete_subscription(connection_id, &id).await {
                    Ok(_) => TransportResponse::ok(),
                    Err(e) => {
                        warn!(error = %e, operation_id = %id, "complete failed");
                        self.report(&e, "complete", connection_id).await;
                        TransportResponse::with_body(500, e.to_string())
                    }
                }
            }
        }
    }

    async fn on_connection_init(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
        payload: Option<Value>,
    ) -> TransportResponse {
        let connection = match self.store.get_connection(connection_id).await {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                debug!("connection_init for unknown connection");
                return TransportResponse::with_body(400, "Unknown connection");
            }
            Err(e) => {
                self.report(&e, "connection_init", connection_id).await;
                return TransportResponse::with_body(500, e.to_string());
            }
        };
        if connection.is_initialized() {
            debug!("repeated connection_init, acknowledging again");
            self.reply(
                request_context,
                connection_id,
                &ServerMessage::ConnectionAck { payload: None },
            )
            .await;
            return TransportResponse::ok();
        }

        let args = ConnectionInitArgs {
            connection_id: connection_id.clone(),
            request_context: request_context.clone(),
            payload: payload.clone(),
        };
        let persisted = match self.hooks.connection_init(args).await {
            Ok(result) => result.or(payload).unwrap_or_else(|| json!({})),
            Err(e) => {
                warn!(error = %e, "connection_init rejected");
                self.report(&e, "connection_init", connection_id).await;
                if let Err(abort) = self
                    .abort(connection_id, request_context, close_code::FORBIDDEN)
                    .await
                {
                    warn!(error = %abort, "cleanup after rejected connection_init failed");
                }
                return TransportResponse::with_body(403, e.to_string());
            }
        };

        match self
            .store
            .set_connection_init_payload(connection_id, &persisted)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // lost a race with another init, or the connection is gone
                debug!("connection_init payload not written");
                return TransportResponse::ok();
            }
            Err(e) => {
                self.report(&e, "connection_init", connection_id).await;
                return TransportResponse::with_body(500, e.to_string());
            }
        }

        self.reply(request_context, connection_id, &ServerMessage::ConnectionAck { payload: None })
            .await;
        // after the ack so a zero-delay first ping cannot overtake it
        if self.config.heartbeat.enabled {
            if let Err(e) = self.start_heartbeat(connection_id, request_context).await {
                warn!(error = %e, "failed to start heartbeat");
                self.report(&e, "heartbeat", connection_id).await;
            }
        }
        TransportResponse::ok()
    }

    async fn on_subscribe(
        &self,
        connection_id: &ConnectionId,
        request_context: &RequestContext,
        operation_id: &OperationId,
        payload: SubscribePayload,
    ) -> TransportResponse {
        let connection = match self.store.get_connection(connection_id).await {
            Ok(Some(connection)) if connection.is_initialized() => connection,
            Ok(_) => {
                let error = ServerMessage::Error {
                    id: operation_id.clone(),
                    payload: vec![GraphqlError::new("Connection is not initialised")],
                };
                self.reply(request_context, connection_id, &error).await;
                return TransportResponse::ok();
            }
            Err(e) => {
                self.report(&e, "subscribe", connection_id).await;
                return TransportResponse::with_body(500, e.to_string());
            }
        };

        match self.subscribe(&connection, operation_id, payload).await {
            Ok(SubscribeOutcome::Subscribed(_) | SubscribeOutcome::ConnectionGone) => {}
            Ok(SubscribeOutcome::Rejected(errors)) => {
                let error = ServerMessage::Error {
                    id: operation_id.clone(),
                    payload: errors,
                };
                self.reply(request_context, connection_id, &error).await;
            }
            Err(e) => {
                warn!(error = %e, operation_id = %operation_id, "subscribe failed");
                self.report(&e, "subscribe", connection_id).await;
                return TransportResponse::with_body(500, e.to_string());
            }
        }
        TransportResponse::ok()
    }

    /// Push one protocol message to the session, pruning it if gone.
    async fn reply(
        &self,
        request_context: &RequestContext,
        connection_id: &ConnectionId,
        message: &ServerMessage,
    ) {
        match self
            .push_with_retry(request_context, connection_id, &message.to_bytes())
            .await
        {
            Ok(()) => {}
            Err(DeliveryError::Gone) => {
                if let Err(e) = self.prune(connection_id).await {
                    self.report(&e, "prune", connection_id).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "reply not delivered");
                self.report(&e, "reply", connection_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{SubscriptionDefinition, SubscriptionTable};
    use crate::errors::HookError;
    use crate::hooks::{ErrorArgs, ServerHooks};
    use crate::test_support::{Harness, ctx, fast_config};
    use parking_lot::Mutex;
    use ripple_store::RecordStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> SubscriptionTable {
        SubscriptionTable::new().define("onMessage", SubscriptionDefinition::new("messages"))
    }

    fn subscribe_msg(id: &str, query: &str) -> Value {
        json!({"type": "subscribe", "id": id, "payload": {"query": query}})
    }

    async fn stored_payload(h: &Harness, id: &str) -> Option<Value> {
        h.store
            .get_connection(&ConnectionId::from(id))
            .await
            .unwrap()
            .and_then(|c| c.connection_init_payload)
    }

    #[tokio::test]
    async fn connect_advertises_subprotocol() {
        let h = Harness::new();
        let resp = h.connect("c1").await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(
            resp.headers.get(SUBPROTOCOL_HEADER).map(String::as_str),
            Some("graphql-transport-ws")
        );
        assert_eq!(h.store.connection_count(), 1);
    }

    #[tokio::test]
    async fn rejected_connect_is_500() {
        let hooks =
            ServerHooks::new().on_connect(|_args| async { Err(HookError::rejected("nope")) });
        let h = Harness::with(table(), hooks, fast_config());
        let resp = h.connect("c1").await;
        assert_eq!(resp.status_code, 500);
        assert_eq!(h.store.connection_count(), 0);
    }

    #[tokio::test]
    async fn connection_init_persists_client_payload_and_acks() {
        let h = Harness::new();
        assert!(h.connect("c1").await.is_success());
        let resp = h
            .send("c1", json!({"type": "connection_init", "payload": {"token": "abc"}}))
            .await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(stored_payload(&h, "c1").await, Some(json!({"token": "abc"})));
        assert_eq!(h.delivery.frame_types("c1"), vec!["connection_ack"]);
    }

    #[tokio::test]
    async fn connection_init_without_payload_persists_empty_object() {
        let h = Harness::new();
        h.ready("c1").await;
        assert_eq!(stored_payload(&h, "c1").await, Some(json!({})));
    }

    #[tokio::test]
    async fn connection_init_hook_result_is_persisted() {
        let hooks = ServerHooks::new().on_connection_init(|args: ConnectionInitArgs| async move {
            let token = args.payload.and_then(|p| p.get("token").cloned());
            Ok(Some(json!({ "user": token })))
        });
        let h = Harness::with(table(), hooks, fast_config());
        assert!(h.connect("c1").await.is_success());
        let _ = h
            .send("c1", json!({"type": "connection_init", "payload": {"token": "abc"}}))
            .await;
        assert_eq!(stored_payload(&h, "c1").await, Some(json!({"user": "abc"})));
    }

    #[tokio::test]
    async fn repeated_connection_init_reacks_without_hook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let hooks = ServerHooks::new().on_connection_init(move |_args: ConnectionInitArgs| {
            let seen = Arc::clone(&seen);
            async move {
                let _ = seen.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        });
        let h = Harness::with(table(), hooks, fast_config());
        h.ready("c1").await;
        let resp = h.send("c1", json!({"type": "connection_init"})).await;
        assert!(resp.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.timer.started().len(), 1);
        assert_eq!(h.delivery.frame_types("c1"), vec!["connection_ack", "connection_ack"]);
    }

    #[tokio::test]
    async fn rejected_connection_init_closes_session() {
        let errors = Arc::new(Mutex::new(Vec::<ErrorArgs>::new()));
        let sink = Arc::clone(&errors);
        let hooks = ServerHooks::new()
            .on_connection_init(|_args: ConnectionInitArgs| async {
                Err(HookError::rejected("bad token"))
            })
            .on_error(move |args: ErrorArgs| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(args);
                    Ok(())
                }
            });
        let h = Harness::with(table(), hooks, fast_config());
        assert!(h.connect("c1").await.is_success());
        let resp = h.send("c1", json!({"type": "connection_init"})).await;

        assert_eq!(resp.status_code, 403);
        assert_eq!(
            h.delivery.closes(),
            vec![(ConnectionId::from("c1"), close_code::FORBIDDEN)]
        );
        assert_eq!(h.store.connection_count(), 0);
        assert!(h.timer.started().is_empty());
        let errors = errors.lock();
        assert_eq!(errors[0].context["stage"], "connection_init");
        assert!(errors[0].error.contains("bad token"));
    }

    #[tokio::test]
    async fn connection_init_for_unknown_connection_is_400() {
        let h = Harness::new();
        let resp = h.send("ghost", json!({"type": "connection_init"})).await;
        assert_eq!(resp.status_code, 400);
        assert_eq!(h.store.connection_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_before_init_sends_error() {
        let h = Harness::with(table(), ServerHooks::new(), fast_config());
        assert!(h.connect("c1").await.is_success());
        let resp = h
            .send("c1", subscribe_msg("7", "subscription { onMessage }"))
            .await;
        assert!(resp.is_success());
        let frames = h.delivery.frames("c1");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert_eq!(frames[0]["id"], "7");
        assert_eq!(h.store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn invalid_subscribe_sends_error_array() {
        let h = Harness::with(table(), ServerHooks::new(), fast_config());
        h.ready("c1").await;
        let _ = h.send("c1", subscribe_msg("1", "query { me }")).await;
        let frames = h.delivery.frames("c1");
        let last = frames.last().unwrap();
        assert_eq!(last["type"], "error");
        assert!(last["payload"][0]["message"].is_string());
        assert_eq!(h.store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn subscribe_then_client_complete() {
        let h = Harness::with(table(), ServerHooks::new(), fast_config());
        h.ready("c1").await;
        let _ = h
            .send("c1", subscribe_msg("1", "subscription { onMessage }"))
            .await;
        assert_eq!(h.store.subscription_count(), 1);

        let resp = h.send("c1", json!({"type": "complete", "id": "1"})).await;
        assert!(resp.is_success());
        assert_eq!(h.store.subscription_count(), 0);

        // completing again, or an unknown id, is a no-op
        let resp = h.send("c1", json!({"type": "complete", "id": "1"})).await;
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let pings = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&pings);
        let hooks = ServerHooks::new().on_ping(move |_args: PingArgs| {
            let seen = Arc::clone(&seen);
            async move {
                let _ = seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let h = Harness::with(table(), hooks, fast_config());
        h.ready("c1").await;
        let resp = h.send("c1", json!({"type": "ping"})).await;
        assert!(resp.is_success());
        assert_eq!(h.delivery.frame_types("c1").last().unwrap(), "pong");
        assert_eq!(pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pong_sets_liveness_marker() {
        let h = Harness::new();
        h.ready("c1").await;
        let _ = h.send("c1", json!({"type": "pong"})).await;
        let conn = h
            .store
            .get_connection(&ConnectionId::from("c1"))
            .await
            .unwrap()
            .unwrap();
        assert!(conn.has_ponged);
    }

    #[tokio::test]
    async fn malformed_message_is_400_and_reported() {
        let reported = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&reported);
        let hooks = ServerHooks::new().on_error(move |_args: ErrorArgs| {
            let seen = Arc::clone(&seen);
            async move {
                let _ = seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let h = Harness::with(table(), hooks, fast_config());
        h.ready("c1").await;

        let resp = h
            .broker
            .handle(SessionEvent::message(ConnectionId::from("c1"), ctx(), "{not json"))
            .await;
        assert_eq!(resp.status_code, 400);
        let resp = h.send("c1", json!({"type": "start", "id": "1"})).await;
        assert_eq!(resp.status_code, 400);

        assert_eq!(reported.load(Ordering::SeqCst), 2);
        // session stays open
        assert_eq!(h.store.connection_count(), 1);
        assert!(h.delivery.closes().is_empty());
    }

    #[tokio::test]
    async fn disconnect_is_always_ok() {
        let h = Harness::with(table(), ServerHooks::new(), fast_config());
        h.ready("c1").await;
        let _ = h
            .send("c1", subscribe_msg("1", "subscription { onMessage }"))
            .await;
        for _ in 0..2 {
            let resp = h
                .broker
                .handle(SessionEvent::disconnect(ConnectionId::from("c1"), ctx()))
                .await;
            assert_eq!(resp.status_code, 200);
        }
        assert_eq!(h.store.connection_count(), 0);
        assert_eq!(h.store.subscription_count(), 0);
    }
}
