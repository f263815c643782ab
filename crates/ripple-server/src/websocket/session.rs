//! One socket from upgrade to disconnect.

use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{gauge, histogram};
use ripple_core::protocol::close_code;
use ripple_core::{ConnectionId, RequestContext, SessionEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::delivery::Outbound;
use crate::metrics::{WS_SESSION_DURATION_SECONDS, WS_SESSIONS_ACTIVE};
use crate::server::AppState;

/// Reason text sent with a close code.
pub fn close_reason(code: u16) -> &'static str {
    match code {
        close_code::FORBIDDEN => "Forbidden",
        close_code::CONNECTION_TIMEOUT => "Connection timeout",
        close_code::BAD_REQUEST => "Bad request",
        close_code::UNAUTHORIZED => "Unauthorized",
        close_code::INTERNAL_ERROR => "Internal server error",
        _ => "",
    }
}

/// Pump frames both ways until either side ends, then disconnect.
///
/// Text frames are handed to the broker in arrival order. Outbound frames
/// come from the session's [`LocalDelivery`](crate::delivery::LocalDelivery)
/// queue; a queued close ends the session.
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_session(
    socket: WebSocket,
    connection_id: ConnectionId,
    request_context: RequestContext,
    mut outbound: mpsc::Receiver<Outbound>,
    state: AppState,
) {
    let started = Instant::now();
    let (mut sink, mut stream) = socket.split();
    gauge!(WS_SESSIONS_ACTIVE).increment(1.0);
    info!("client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(code) => {
                    let frame = CloseFrame {
                        code,
                        reason: Utf8Bytes::from_static(close_reason(code)),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let broker = state.broker.clone();
    let reader_id = connection_id.clone();
    let reader_ctx = request_context.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            let body = match msg {
                Message::Text(text) => text.to_string(),
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => text.to_owned(),
                    Err(_) => {
                        debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            let resp = broker
                .handle(SessionEvent::message(
                    reader_id.clone(),
                    reader_ctx.clone(),
                    body,
                ))
                .await;
            if !resp.is_success() {
                debug!(status = resp.status_code, body = ?resp.body, "message not accepted");
            }
        }
    });

    let token = state.shutdown.token();
    tokio::select! {
        _ = &mut writer => debug!("writer finished"),
        _ = &mut reader => debug!("reader finished"),
        () = token.cancelled() => debug!("server shutting down"),
    }
    writer.abort();
    reader.abort();

    state.delivery.unregister(&connection_id);
    let _ = state
        .broker
        .handle(SessionEvent::disconnect(connection_id, request_context))
        .await;

    gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
    histogram!(WS_SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!("client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reasons_cover_protocol_codes() {
        assert_eq!(close_reason(4403), "Forbidden");
        assert_eq!(close_reason(4408), "Connection timeout");
        assert_eq!(close_reason(1000), "");
    }
}
