//! In-process delivery channel for sockets attached to this server.
//!
//! Each open socket registers a bounded outbound queue; a writer task per
//! socket drains it into the WebSocket. Pushing to a connection that is not
//! registered here reports `gone`.

use std::collections::HashMap;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use ripple_broker::{CloseOutcome, DeliveryChannel, DeliveryError};
use ripple_core::{ConnectionId, RequestContext};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::metrics::WS_SEND_QUEUE_FULL_TOTAL;

/// A frame queued for one socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Text(String),
    /// Close the socket with this code.
    Close(u16),
}

/// Connection table of locally attached sockets.
#[derive(Debug)]
pub struct LocalDelivery {
    sessions: RwLock<HashMap<ConnectionId, mpsc::Sender<Outbound>>>,
    queue_size: usize,
}

impl LocalDelivery {
    /// Table whose sessions buffer up to `queue_size` frames.
    pub fn new(queue_size: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_size: queue_size.max(1),
        }
    }

    /// Attach a socket and return the receiving end of its queue.
    pub fn register(&self, connection_id: &ConnectionId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(self.queue_size);
        if self
            .sessions
            .write()
            .insert(connection_id.clone(), tx)
            .is_some()
        {
            warn!(connection_id = %connection_id, "replaced an existing session queue");
        }
        rx
    }

    /// Detach a socket. Later pushes report `gone`.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        let _ = self.sessions.write().remove(connection_id);
    }

    /// Number of attached sockets.
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    fn sender(&self, connection_id: &ConnectionId) -> Option<mpsc::Sender<Outbound>> {
        self.sessions.read().get(connection_id).cloned()
    }
}

#[async_trait]
impl DeliveryChannel for LocalDelivery {
    async fn push(
        &self,
        _request_context: &RequestContext,
        connection_id: &ConnectionId,
        data: &[u8],
    ) -> Result<(), DeliveryError> {
        let Some(tx) = self.sender(connection_id) else {
            return Err(DeliveryError::Gone);
        };
        let text = String::from_utf8_lossy(data).into_owned();
        match tx.try_send(Outbound::Text(text)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!(WS_SEND_QUEUE_FULL_TOTAL).increment(1);
                Err(DeliveryError::Transient("send queue full".into()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister(connection_id);
                Err(DeliveryError::Gone)
            }
        }
    }

    async fn force_close(
        &self,
        _request_context: &RequestContext,
        connection_id: &ConnectionId,
        code: u16,
    ) -> Result<CloseOutcome, DeliveryError> {
        let Some(tx) = self.sessions.write().remove(connection_id) else {
            return Ok(CloseOutcome::AlreadyGone);
        };
        // the writer exits on Close, so a full queue must not drop it
        match tx.send(Outbound::Close(code)).await {
            Ok(()) => {
                debug!(connection_id = %connection_id, code, "close queued");
                Ok(CloseOutcome::Closed)
            }
            Err(_) => Ok(CloseOutcome::AlreadyGone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    #[tokio::test]
    async fn push_reaches_registered_queue() {
        let delivery = LocalDelivery::new(4);
        let id = ConnectionId::from("c1");
        let mut rx = delivery.register(&id);

        delivery.push(&ctx(), &id, br#"{"type":"pong"}"#).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Text(r#"{"type":"pong"}"#.into()))
        );
        assert_eq!(delivery.count(), 1);
    }

    #[tokio::test]
    async fn unknown_connection_is_gone() {
        let delivery = LocalDelivery::new(4);
        let err = delivery
            .push(&ctx(), &ConnectionId::from("nobody"), b"{}")
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::Gone);
    }

    #[tokio::test]
    async fn full_queue_is_transient() {
        let delivery = LocalDelivery::new(1);
        let id = ConnectionId::from("c1");
        let _rx = delivery.register(&id);
        delivery.push(&ctx(), &id, b"1").await.unwrap();
        assert_matches!(
            delivery.push(&ctx(), &id, b"2").await,
            Err(DeliveryError::Transient(_))
        );
    }

    #[tokio::test]
    async fn dropped_receiver_is_gone_and_detached() {
        let delivery = LocalDelivery::new(4);
        let id = ConnectionId::from("c1");
        drop(delivery.register(&id));
        assert_eq!(
            delivery.push(&ctx(), &id, b"x").await,
            Err(DeliveryError::Gone)
        );
        assert_eq!(delivery.count(), 0);
    }

    #[tokio::test]
    async fn force_close_queues_close_once() {
        let delivery = LocalDelivery::new(4);
        let id = ConnectionId::from("c1");
        let mut rx = delivery.register(&id);

        assert_eq!(
            delivery.force_close(&ctx(), &id, 4408).await.unwrap(),
            CloseOutcome::Closed
        );
        assert_eq!(
            delivery.force_close(&ctx(), &id, 4408).await.unwrap(),
            CloseOutcome::AlreadyGone
        );
        assert_eq!(rx.recv().await, Some(Outbound::Close(4408)));
        assert_eq!(
            delivery.push(&ctx(), &id, b"x").await,
            Err(DeliveryError::Gone)
        );
    }
}
