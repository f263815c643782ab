//! Network, persistence, and logging settings.

use ripple_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// HTTP/WebSocket listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listener port (0 picks an ephemeral port).
    pub port: u16,
    /// Largest accepted WebSocket frame in bytes.
    pub max_message_size: usize,
    /// Domain name recorded in each connection's request context.
    pub domain_name: String,
    /// Stage recorded in each connection's request context.
    pub stage: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            max_message_size: 1024 * 1024,
            domain_name: "localhost".to_string(),
            stage: "local".to_string(),
        }
    }
}

/// Record store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// `SQLite` database path, or `:memory:` for a throwaway store.
    pub db_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "ripple.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreSettings {
    /// Whether the store should live in memory only.
    pub fn is_in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` syntax accepted).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
