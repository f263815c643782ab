//! Server configuration.

use ripple_core::RequestContext;
use ripple_settings::ServerSettings;

/// Configuration for the Ripple server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Frames buffered per session before pushes fail transiently.
    pub send_queue: usize,
    /// Endpoint coordinates stamped on every session.
    pub request_context: RequestContext,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 1024 * 1024,
            send_queue: 256,
            request_context: RequestContext::new("localhost", "local"),
        }
    }
}

impl ServerConfig {
    /// Derive from the `server` settings section.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_message_size: settings.max_message_size,
            request_context: RequestContext::new(
                settings.domain_name.clone(),
                settings.stage.clone(),
            ),
            ..Self::default()
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_zero() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn from_settings_copies_endpoint() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 4100,
            domain_name: "ws.example.test".into(),
            stage: "prod".into(),
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:4100");
        assert_eq!(cfg.request_context, RequestContext::new("ws.example.test", "prod"));
        assert_eq!(cfg.send_queue, 256);
    }
}
