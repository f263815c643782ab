//! The [`Broker`] facade and its builder.
//!
//! A broker owns no connection state of its own: every field is a shared
//! handle, cloning is cheap, and any clone can serve any invocation. The
//! operations are split across `lifecycle`, `registry`, `fanout`,
//! `heartbeat` and `session`.

use std::fmt;
use std::sync::Arc;

use ripple_core::ConnectionId;
use ripple_store::RecordStore;
use serde_json::{Value, json};

use crate::config::BrokerConfig;
use crate::definition::SubscriptionTable;
use crate::delivery::DeliveryChannel;
use crate::engine::{PassthroughEngine, QueryEngine};
use crate::hooks::ServerHooks;
use crate::timer::TimerService;

/// Stateless pub/sub broker over a shared record store.
#[derive(Clone)]
pub struct Broker {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) delivery: Arc<dyn DeliveryChannel>,
    pub(crate) timer: Arc<dyn TimerService>,
    pub(crate) engine: Arc<dyn QueryEngine>,
    pub(crate) table: Arc<SubscriptionTable>,
    pub(crate) hooks: Arc<ServerHooks>,
    pub(crate) config: Arc<BrokerConfig>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("table", &self.table)
            .field("hooks", &self.hooks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Start building a broker from its three required adapters.
    pub fn builder(
        store: Arc<dyn RecordStore>,
        delivery: Arc<dyn DeliveryChannel>,
        timer: Arc<dyn TimerService>,
    ) -> BrokerBuilder {
        BrokerBuilder {
            store,
            delivery,
            timer,
            engine: Arc::new(PassthroughEngine),
            table: SubscriptionTable::new(),
            hooks: ServerHooks::new(),
            config: BrokerConfig::default(),
        }
    }

    /// The shared record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// The dispatch table.
    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    /// Runtime configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Report an absorbed error to `on_error`.
    pub(crate) async fn report(
        &self,
        error: &(dyn fmt::Display + Sync),
        stage: &str,
        connection_id: &ConnectionId,
    ) {
        self.hooks
            .error(error, error_context(stage, connection_id))
            .await;
    }
}

pub(crate) fn error_context(stage: &str, connection_id: &ConnectionId) -> Value {
    json!({ "stage": stage, "connectionId": connection_id })
}

/// Builder for [`Broker`].
pub struct BrokerBuilder {
    store: Arc<dyn RecordStore>,
    delivery: Arc<dyn DeliveryChannel>,
    timer: Arc<dyn TimerService>,
    engine: Arc<dyn QueryEngine>,
    table: SubscriptionTable,
    hooks: ServerHooks,
    config: BrokerConfig,
}

impl BrokerBuilder {
    /// Replace the query engine (default: [`PassthroughEngine`]).
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Set the dispatch table.
    #[must_use]
    pub fn table(mut self, table: SubscriptionTable) -> Self {
        self.table = table;
        self
    }

    /// Set the server hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: ServerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the runtime configuration.
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish.
    pub fn build(self) -> Broker {
        Broker {
            store: self.store,
            delivery: self.delivery,
            timer: self.timer,
            engine: self.engine,
            table: Arc::new(self.table),
            hooks: Arc::new(self.hooks),
            config: Arc::new(self.config),
        }
    }
}
