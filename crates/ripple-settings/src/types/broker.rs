//! Heartbeat, delivery, and subscription-table settings.

use std::collections::BTreeMap;

use ripple_core::retry::{DEFAULT_JITTER_FACTOR, RetryConfig};
use serde::{Deserialize, Serialize};

/// Heartbeat timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Whether `connection_init` starts the heartbeat.
    pub enabled: bool,
    /// Seconds between a successful review and the next ping.
    pub delay_secs: u64,
    /// Seconds a client has to answer a ping.
    pub timeout_secs: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 30,
            timeout_secs: 15,
        }
    }
}

/// Push delivery tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Retries after a transient push failure.
    pub max_retries: u32,
    /// Base backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,
    /// Concurrent pushes per publish.
    pub concurrency: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            concurrency: 16,
        }
    }
}

impl DeliverySettings {
    /// Backoff parameters for the fan-out.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// One entry of the settings-driven subscription table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionSettings {
    /// Topic template; `{arg}` placeholders are filled from subscribe arguments.
    pub topic: String,
    /// Subscribe arguments copied into the filter when present.
    pub filter_args: Vec<String>,
}

/// Root field name to subscription entry.
pub type SubscriptionTableSettings = BTreeMap<String, SubscriptionSettings>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_defaults() {
        let h = HeartbeatSettings::default();
        assert!(h.enabled);
        assert_eq!(h.delay_secs, 30);
        assert_eq!(h.timeout_secs, 15);
    }

    #[test]
    fn delivery_retry_config() {
        let d = DeliverySettings {
            max_retries: 5,
            ..DeliverySettings::default()
        };
        let r = d.retry_config();
        assert_eq!(r.max_retries, 5);
        assert_eq!(r.base_delay_ms, d.base_delay_ms);
    }

    #[test]
    fn subscription_entry_from_json() {
        let table: SubscriptionTableSettings = serde_json::from_str(
            r#"{"onMessage":{"topic":"room:{roomId}","filterArgs":["author"]}}"#,
        )
        .unwrap();
        let entry = &table["onMessage"];
        assert_eq!(entry.topic, "room:{roomId}");
        assert_eq!(entry.filter_args, vec!["author".to_string()]);
    }
}
