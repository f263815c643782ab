//! Recording fakes and a wired-up broker for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use ripple_core::retry::RetryConfig;
use ripple_core::{
    Connection, ConnectionId, OperationId, RequestContext, SessionEvent, StateFunctionInput,
    Subscription, TransportResponse,
};
use ripple_store::{MemoryRecordStore, RecordStore, StoreError};
use serde_json::Value;

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::definition::SubscriptionTable;
use crate::delivery::{CloseOutcome, DeliveryChannel};
use crate::errors::{DeliveryError, TimerError};
use crate::hooks::ServerHooks;
use crate::timer::TimerService;

pub(crate) fn ctx() -> RequestContext {
    RequestContext::new("example.test", "test")
}

/// Delivery channel that records frames and can simulate failures.
#[derive(Default)]
pub(crate) struct RecordingDelivery {
    pushes: Mutex<Vec<(ConnectionId, Value)>>,
    closes: Mutex<Vec<(ConnectionId, u16)>>,
    gone: Mutex<HashSet<ConnectionId>>,
    transient: Mutex<HashMap<ConnectionId, u32>>,
    attempts: Mutex<u32>,
}

impl RecordingDelivery {
    pub(crate) fn mark_gone(&self, id: &str) {
        let _ = self.gone.lock().insert(ConnectionId::from(id));
    }

    pub(crate) fn fail_transiently(&self, id: &str, times: u32) {
        let _ = self.transient.lock().insert(ConnectionId::from(id), times);
    }

    pub(crate) fn frames(&self, id: &str) -> Vec<Value> {
        self.pushes
            .lock()
            .iter()
            .filter(|(c, _)| c.as_str() == id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub(crate) fn frame_types(&self, id: &str) -> Vec<String> {
        self.frames(id)
            .iter()
            .filter_map(|f| f["type"].as_str().map(str::to_string))
            .collect()
    }

    pub(crate) fn closes(&self) -> Vec<(ConnectionId, u16)> {
        self.closes.lock().clone()
    }

    pub(crate) fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDelivery {
    async fn push(
        &self,
        _request_context: &RequestContext,
        connection_id: &ConnectionId,
        data: &[u8],
    ) -> Result<(), DeliveryError> {
        *self.attempts.lock() += 1;
        if self.gone.lock().contains(connection_id) {
            return Err(DeliveryError::Gone);
        }
        if let Some(left) = self.transient.lock().get_mut(connection_id) {
            if *left > 0 {
                *left -= 1;
                return Err(DeliveryError::Transient("throttled".into()));
            }
        }
        let frame: Value = serde_json::from_slice(data).unwrap();
        self.pushes.lock().push((connection_id.clone(), frame));
        Ok(())
    }

    async fn force_close(
        &self,
        _request_context: &RequestContext,
        connection_id: &ConnectionId,
        code: u16,
    ) -> Result<CloseOutcome, DeliveryError> {
        if !self.gone.lock().insert(connection_id.clone()) {
            return Ok(CloseOutcome::AlreadyGone);
        }
        self.closes.lock().push((connection_id.clone(), code));
        Ok(CloseOutcome::Closed)
    }
}

/// Timer that records started executions instead of running them.
#[derive(Default)]
pub(crate) struct RecordingTimer {
    started: Mutex<Vec<StateFunctionInput>>,
}

impl RecordingTimer {
    pub(crate) fn started(&self) -> Vec<StateFunctionInput> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl TimerService for RecordingTimer {
    async fn start(&self, input: StateFunctionInput) -> Result<(), TimerError> {
        self.started.lock().push(input);
        Ok(())
    }
}

pub(crate) fn fast_config() -> BrokerConfig {
    BrokerConfig {
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
        },
        ..BrokerConfig::default()
    }
}

pub(crate) struct Harness {
    pub broker: Broker,
    pub store: Arc<MemoryRecordStore>,
    pub delivery: Arc<RecordingDelivery>,
    pub timer: Arc<RecordingTimer>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with(SubscriptionTable::new(), ServerHooks::new(), BrokerConfig::default())
    }

    pub(crate) fn with(table: SubscriptionTable, hooks: ServerHooks, config: BrokerConfig) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        Self::over(store.clone(), store, table, hooks, config)
    }

    /// Harness whose broker writes through a [`FlakyStore`] over `store`.
    pub(crate) fn flaky(
        table: SubscriptionTable,
        hooks: ServerHooks,
        config: BrokerConfig,
    ) -> (Self, Arc<FlakyStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        (Self::over(store, flaky.clone(), table, hooks, config), flaky)
    }

    fn over(
        store: Arc<MemoryRecordStore>,
        backend: Arc<dyn RecordStore>,
        table: SubscriptionTable,
        hooks: ServerHooks,
        config: BrokerConfig,
    ) -> Self {
        let delivery = Arc::new(RecordingDelivery::default());
        let timer = Arc::new(RecordingTimer::default());
        let broker = Broker::builder(backend, delivery.clone(), timer.clone())
            .table(table)
            .hooks(hooks)
            .config(config)
            .build();
        Self {
            broker,
            store,
            delivery,
            timer,
        }
    }

    pub(crate) async fn connect(&self, id: &str) -> TransportResponse {
        self.broker
            .handle(SessionEvent::connect(ConnectionId::from(id), ctx()))
            .await
    }

    pub(crate) async fn send(&self, id: &str, message: Value) -> TransportResponse {
        self.broker
            .handle(SessionEvent::message(
                ConnectionId::from(id),
                ctx(),
                message.to_string(),
            ))
            .await
    }

    /// Connect and complete `connection_init`.
    pub(crate) async fn ready(&self, id: &str) {
        assert!(self.connect(id).await.is_success());
        let resp = self
            .send(id, serde_json::json!({"type": "connection_init"}))
            .await;
        assert!(resp.is_success(), "{resp:?}");
    }
}

/// Store wrapper that fails a number of `delete_subscription` calls.
pub(crate) struct FlakyStore {
    inner: Arc<MemoryRecordStore>,
    failing_deletes: AtomicU32,
}

impl FlakyStore {
    pub(crate) fn new(inner: Arc<MemoryRecordStore>) -> Self {
        Self {
            inner,
            failing_deletes: AtomicU32::new(0),
        }
    }

    pub(crate) fn fail_deletes(&self, times: u32) {
        self.failing_deletes.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get_connection(&self, id: &ConnectionId) -> ripple_store::Result<Option<Connection>> {
        self.inner.get_connection(id).await
    }

    async fn create_connection(&self, connection: &Connection) -> ripple_store::Result<bool> {
        self.inner.create_connection(connection).await
    }

    async fn set_connection_init_payload(
        &self,
        id: &ConnectionId,
        payload: &Value,
    ) -> ripple_store::Result<bool> {
        self.inner.set_connection_init_payload(id, payload).await
    }

    async fn set_has_ponged(
        &self,
        id: &ConnectionId,
        has_ponged: bool,
    ) -> ripple_store::Result<bool> {
        self.inner.set_has_ponged(id, has_ponged).await
    }

    async fn delete_connection(&self, id: &ConnectionId) -> ripple_store::Result<bool> {
        self.inner.delete_connection(id).await
    }

    async fn get_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> ripple_store::Result<Option<Subscription>> {
        self.inner.get_subscription(connection_id, operation_id).await
    }

    async fn put_subscription(&self, subscription: &Subscription) -> ripple_store::Result<()> {
        self.inner.put_subscription(subscription).await
    }

    async fn delete_subscription(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> ripple_store::Result<bool> {
        let failing = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("delete failed".into()));
        }
        self.inner.delete_subscription(connection_id, operation_id).await
    }

    async fn query_by_topic(&self, topic: &str) -> ripple_store::Result<Vec<Subscription>> {
        self.inner.query_by_topic(topic).await
    }

    async fn query_by_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> ripple_store::Result<Vec<Subscription>> {
        self.inner.query_by_connection(connection_id).await
    }
}
