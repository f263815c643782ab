//! `graphql-transport-ws` endpoint.
//!
//! The upgrade request is the broker's `connect` event: a refused connect
//! answers the HTTP request with the broker's status and no socket is
//! opened.

pub mod session;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use ripple_core::protocol::SUBPROTOCOL;
use ripple_core::{ConnectionId, SessionEvent};
use tracing::{debug, warn};

use crate::metrics::WS_UPGRADES_REFUSED_TOTAL;
use crate::server::AppState;

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let connection_id = ConnectionId::generate();
    let request_context = state.config.request_context.clone();

    let resp = state
        .broker
        .handle(SessionEvent::connect(
            connection_id.clone(),
            request_context.clone(),
        ))
        .await;
    if !resp.is_success() {
        counter!(WS_UPGRADES_REFUSED_TOTAL).increment(1);
        debug!(connection_id = %connection_id, status = resp.status_code, "upgrade refused");
        let status =
            StatusCode::from_u16(resp.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, resp.body.unwrap_or_default()).into_response();
    }

    // registered before the 101 so nothing the client triggers can miss it
    let outbound = state.delivery.register(&connection_id);

    let failed_state = state.clone();
    let failed_id = connection_id.clone();
    let failed_ctx = request_context.clone();
    ws.protocols([SUBPROTOCOL])
        .max_message_size(state.config.max_message_size)
        .on_failed_upgrade(move |e| {
            warn!(connection_id = %failed_id, error = %e, "websocket upgrade failed");
            failed_state.delivery.unregister(&failed_id);
            drop(tokio::spawn(async move {
                let _ = failed_state
                    .broker
                    .handle(SessionEvent::disconnect(failed_id, failed_ctx))
                    .await;
            }));
        })
        .on_upgrade(move |socket| {
            session::run_session(socket, connection_id, request_context, outbound, state)
        })
}
