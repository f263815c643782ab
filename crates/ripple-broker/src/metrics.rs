//! Metric names recorded by the broker and its transports.
//!
//! Recording is a no-op until a recorder is installed (the server installs a
//! Prometheus one).

/// Sessions opened (counter).
pub const CONNECTIONS_TOTAL: &str = "ripple_connections_total";
/// Sessions closed (counter).
pub const DISCONNECTIONS_TOTAL: &str = "ripple_disconnections_total";
/// Inbound protocol messages (counter, labels: type).
pub const MESSAGES_TOTAL: &str = "ripple_messages_total";
/// Malformed inbound messages (counter).
pub const INVALID_MESSAGES_TOTAL: &str = "ripple_invalid_messages_total";
/// Subscriptions written (counter).
pub const SUBSCRIPTIONS_TOTAL: &str = "ripple_subscriptions_total";
/// Subscriptions rejected by validation or veto (counter).
pub const SUBSCRIPTIONS_REJECTED_TOTAL: &str = "ripple_subscriptions_rejected_total";
/// Publish calls (counter).
pub const PUBLISHES_TOTAL: &str = "ripple_publishes_total";
/// Fan-out deliveries (counter, labels: outcome).
pub const DELIVERIES_TOTAL: &str = "ripple_deliveries_total";
/// Push retries after transient failures (counter).
pub const DELIVERY_RETRIES_TOTAL: &str = "ripple_delivery_retries_total";
/// Connections removed after a `gone` push (counter).
pub const PRUNES_TOTAL: &str = "ripple_prunes_total";
/// Connections reaped by the heartbeat (counter).
pub const HEARTBEAT_ABORTS_TOTAL: &str = "ripple_heartbeat_aborts_total";
/// Fan-out duration in seconds (histogram).
pub const FANOUT_DURATION_SECONDS: &str = "ripple_fanout_duration_seconds";
