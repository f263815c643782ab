//! # ripple
//!
//! Ripple broker binary: loads settings, opens the record store, builds the
//! subscription table from settings and serves `graphql-transport-ws` plus
//! the publish endpoints.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ripple_broker::{
    BrokerConfig, FilterSource, ServerHooks, SubscriptionDefinition, SubscriptionTable,
};
use ripple_core::logging::init_subscriber;
use ripple_settings::{RippleSettings, StoreSettings, SubscriptionTableSettings};
use ripple_store::{ConnectionConfig, RecordStore, SqliteRecordStore};
use ripple_server::shutdown::DRAIN_TIMEOUT;
use ripple_server::{RippleServer, ServerConfig};

/// Ripple pub/sub broker.
#[derive(Parser, Debug)]
#[command(name = "ripple", about = "Filtered pub/sub broker for graphql-transport-ws")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// `SQLite` database path, or `:memory:` (overrides settings).
    #[arg(long)]
    db_path: Option<String>,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Settings file (defaults to `~/.ripple/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RippleSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db_path) = &self.db_path {
            settings.store.db_path.clone_from(db_path);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// Open the configured record store.
fn open_store(settings: &StoreSettings) -> Result<Arc<dyn RecordStore>> {
    let store = if settings.is_in_memory() {
        SqliteRecordStore::in_memory().context("Failed to open in-memory store")?
    } else {
        let config = ConnectionConfig {
            pool_size: settings.pool_size,
            busy_timeout_ms: settings.busy_timeout_ms,
        };
        SqliteRecordStore::open(&PathBuf::from(&settings.db_path), &config)
            .with_context(|| format!("Failed to open database: {}", settings.db_path))?
    };
    Ok(Arc::new(store))
}

/// Dispatch table described by the `subscriptions` settings section.
fn subscription_table(entries: &SubscriptionTableSettings) -> SubscriptionTable {
    entries
        .iter()
        .fold(SubscriptionTable::new(), |table, (field, entry)| {
            table.define(
                field.clone(),
                SubscriptionDefinition::new(entry.topic.clone())
                    .filter(FilterSource::from_args(entry.filter_args.iter().cloned())),
            )
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(ripple_settings::settings_path);
    let mut settings = ripple_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    args.apply(&mut settings);

    init_subscriber(&settings.logging.level, settings.logging.format);

    let store = open_store(&settings.store)?;
    let table = subscription_table(&settings.subscriptions);
    if table.is_empty() {
        tracing::warn!("no subscriptions configured; every subscribe will be rejected");
    }

    let metrics = ripple_server::metrics::install_recorder().context("Failed to install metrics")?;
    let server = RippleServer::new(
        ServerConfig::from_settings(&settings.server),
        store,
        table,
        ServerHooks::new(),
        BrokerConfig::from_settings(&settings),
    )
    .with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        fields = server.broker().table().len(),
        "Ripple listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().drain(handle, DRAIN_TIMEOUT).await {
        tracing::warn!("some sessions were still open at exit");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
