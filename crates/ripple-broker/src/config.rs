//! Broker tuning.

use ripple_core::retry::RetryConfig;
use ripple_settings::RippleSettings;

/// Heartbeat timing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Whether `connection_init` starts a heartbeat.
    pub enabled: bool,
    /// Seconds between a passed review and the next ping.
    pub delay_secs: u64,
    /// Seconds a client has to answer a ping.
    pub timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 30,
            timeout_secs: 15,
        }
    }
}

/// Runtime configuration of a [`Broker`](crate::Broker).
#[derive(Clone, Debug, PartialEq)]
pub struct BrokerConfig {
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Backoff for transient push failures.
    pub retry: RetryConfig,
    /// Concurrent pushes per fan-out.
    pub concurrency: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            retry: RetryConfig::default(),
            concurrency: 16,
        }
    }
}

impl BrokerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &RippleSettings) -> Self {
        Self {
            heartbeat: HeartbeatConfig {
                enabled: settings.heartbeat.enabled,
                delay_secs: settings.heartbeat.delay_secs,
                timeout_secs: settings.heartbeat.timeout_secs,
            },
            retry: settings.delivery.retry_config(),
            concurrency: settings.delivery.concurrency.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_settings_copies_values() {
        let mut settings = RippleSettings::default();
        settings.heartbeat.enabled = false;
        settings.heartbeat.delay_secs = 7;
        settings.delivery.max_retries = 1;
        settings.delivery.concurrency = 0;

        let config = BrokerConfig::from_settings(&settings);
        assert!(!config.heartbeat.enabled);
        assert_eq!(config.heartbeat.delay_secs, 7);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn defaults_match_settings_defaults() {
        assert_eq!(
            BrokerConfig::from_settings(&RippleSettings::default()),
            BrokerConfig::default()
        );
    }
}
