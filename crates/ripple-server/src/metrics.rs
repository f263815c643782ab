//! Prometheus metrics recorder and `/metrics` rendering.
//!
//! Broker metric names live in [`ripple_broker::metrics`]; the names below
//! belong to the WebSocket transport.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::{Result, ServerError};

/// Open WebSocket sessions in this process (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ripple_ws_sessions_active";
/// Lifetime of a WebSocket session (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "ripple_ws_session_duration_seconds";
/// Upgrades refused because `connect` failed (counter).
pub const WS_UPGRADES_REFUSED_TOTAL: &str = "ripple_ws_upgrades_refused_total";
/// Pushes that found the send queue full (counter).
pub const WS_SEND_QUEUE_FULL_TOTAL: &str = "ripple_ws_send_queue_full_total";
/// Heartbeat ticks that failed and were retried (counter).
pub const HEARTBEAT_TICK_FAILURES_TOTAL: &str = "ripple_heartbeat_tick_failures_total";

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        for name in [
            WS_SESSIONS_ACTIVE,
            WS_SESSION_DURATION_SECONDS,
            WS_UPGRADES_REFUSED_TOTAL,
            WS_SEND_QUEUE_FULL_TOTAL,
            HEARTBEAT_TICK_FAILURES_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
