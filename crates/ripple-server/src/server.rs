//! `RippleServer`: Axum HTTP + WebSocket front end for one broker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use ripple_broker::{Broker, BrokerConfig, PublishReport, ServerHooks, SubscriptionTable};
use ripple_core::PubSubEvent;
use ripple_store::RecordStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use crate::config::ServerConfig;
use crate::delivery::LocalDelivery;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::timer::{self, TimerDriver};
use crate::websocket::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broker serving every session.
    pub broker: Broker,
    /// Sockets attached to this process.
    pub delivery: Arc<LocalDelivery>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

/// The Ripple server.
pub struct RippleServer {
    config: Arc<ServerConfig>,
    broker: Broker,
    delivery: Arc<LocalDelivery>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    driver: Mutex<Option<TimerDriver>>,
}

impl RippleServer {
    /// Wire a broker over `store` to a local delivery channel and timer.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn RecordStore>,
        table: SubscriptionTable,
        hooks: ServerHooks,
        broker_config: BrokerConfig,
    ) -> Self {
        let delivery = Arc::new(LocalDelivery::new(config.send_queue));
        let (timer, driver) = timer::channel();
        let broker = Broker::builder(store, delivery.clone(), Arc::new(timer))
            .table(table)
            .hooks(hooks)
            .config(broker_config)
            .build();
        Self {
            config: Arc::new(config),
            broker,
            delivery,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            broker: self.broker.clone(),
            delivery: self.delivery.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            config: self.config.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/publish", post(publish_handler))
            .route("/complete", post(complete_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the listener and start serving.
    ///
    /// Also starts the heartbeat timer driver. Both stop when the shutdown
    /// coordinator fires; the returned handle completes after that.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let driver = self.driver.lock().take().ok_or(ServerError::AlreadyStarted)?;

        let router = self.router();
        let broker = self.broker.clone();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let timers = tokio::spawn(driver.run(broker, token.clone()));
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            let _ = timers.await;
        });

        info!(%addr, "ripple server listening");
        Ok((addr, handle))
    }

    /// Get the broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Get the local delivery channel.
    pub fn delivery(&self) -> &Arc<LocalDelivery> {
        &self.delivery
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// POST /publish
#[instrument(skip_all, fields(topic = %event.topic))]
async fn publish_handler(
    State(state): State<AppState>,
    Json(event): Json<PubSubEvent>,
) -> Response {
    report_response(state.broker.publish(&event).await)
}

/// POST /complete
#[instrument(skip_all, fields(topic = %event.topic))]
async fn complete_handler(
    State(state): State<AppState>,
    Json(event): Json<PubSubEvent>,
) -> Response {
    report_response(state.broker.complete(&event).await)
}

fn report_response(result: ripple_broker::Result<PublishReport>) -> Response {
    match result {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "fan-out failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.delivery.count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ripple_broker::{FilterSource, SubscriptionDefinition};
    use ripple_core::{ConnectionId, RequestContext, SessionEvent};
    use ripple_store::MemoryRecordStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::delivery::Outbound;

    fn make_server() -> RippleServer {
        let table = SubscriptionTable::new().define(
            "onMessage",
            SubscriptionDefinition::new("messages").filter(FilterSource::from_args(["room"])),
        );
        RippleServer::new(
            ServerConfig::default(),
            Arc::new(MemoryRecordStore::new()),
            table,
            ServerHooks::new(),
            BrokerConfig::default(),
        )
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.delivery().count(), 0);
        assert_eq!(server.broker().table().len(), 1);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn publish_endpoint_fans_out() {
        let server = make_server();
        let id = ConnectionId::from("c1");
        let mut rx = server.delivery().register(&id);
        let ctx = RequestContext::default();
        let broker = server.broker();
        let _ = broker.handle(SessionEvent::connect(id.clone(), ctx.clone())).await;
        for body in [
            json!({"type": "connection_init"}),
            json!({"type": "subscribe", "id": "s1", "payload": {"query": "subscription { onMessage(room: \"red\") }"}}),
        ] {
            let resp = broker
                .handle(SessionEvent::message(id.clone(), ctx.clone(), body.to_string()))
                .await;
            assert!(resp.is_success());
        }

        let resp = server
            .router()
            .oneshot(post_json(
                "/publish",
                &json!({"topic": "messages", "payload": {"room": "red", "text": "hi"}}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["matched"], 1);
        assert_eq!(report["delivered"], 1);

        let mut types = Vec::new();
        while let Ok(Outbound::Text(text)) = rx.try_recv() {
            let frame: Value = serde_json::from_str(&text).unwrap();
            types.push(frame["type"].as_str().unwrap().to_string());
        }
        assert_eq!(types, vec!["connection_ack", "next"]);
    }

    #[tokio::test]
    async fn complete_endpoint_reports_nothing_matched() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_json("/complete", &json!({"topic": "nobody"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["matched"], 0);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders_text() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = make_server().with_metrics(handle);
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_twice_is_refused() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(matches!(
            server.listen().await,
            Err(ServerError::AlreadyStarted)
        ));
        server.shutdown().shutdown();
        handle.await.unwrap();
    }
}
