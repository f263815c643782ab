//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON documents fill the gaps from each type's [`Default`].

mod broker;
mod server;

pub use broker::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Ripple broker.
///
/// ```json
/// {
///   "server": { "port": 4000 },
///   "heartbeat": { "delaySecs": 30, "timeoutSecs": 15 },
///   "subscriptions": { "onMessage": { "topic": "messages", "filterArgs": ["room"] } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RippleSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Record store settings.
    pub store: StoreSettings,
    /// Heartbeat timing.
    pub heartbeat: HeartbeatSettings,
    /// Push delivery tuning.
    pub delivery: DeliverySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Subscription dispatch table.
    pub subscriptions: SubscriptionTableSettings,
}

impl RippleSettings {
    /// Reject combinations the broker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.enabled && self.heartbeat.timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.timeoutSecs must be positive".into(),
            ));
        }
        if self.delivery.concurrency == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.concurrency must be positive".into(),
            ));
        }
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be positive".into(),
            ));
        }
        if let Some((field, _)) = self
            .subscriptions
            .iter()
            .find(|(_, entry)| entry.topic.is_empty())
        {
            return Err(SettingsError::InvalidValue(format!(
                "subscriptions.{field}.topic is empty"
            )));
        }
        Ok(())
    }
}
