//! Broker error types.
//!
//! [`BrokerError`] is what broker operations return to their caller. The
//! boundary errors ([`HookError`], [`DeliveryError`], [`TimerError`]) are
//! produced by user hooks and adapters; most of them are absorbed by the
//! broker and reported through `on_error` instead of being surfaced.

use ripple_store::StoreError;
use thiserror::Error;

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Record store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A hook rejected or failed an operation that cannot proceed without it.
    #[error("hook error: {0}")]
    Hook(#[from] HookError),

    /// Delivery channel failure.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Timer service failure.
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),
}

/// Errors raised by user hooks.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook deliberately refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The hook failed unexpectedly.
    #[error("hook '{hook}' failed: {message}")]
    Failed {
        /// Which hook slot failed.
        hook: &'static str,
        /// Error message from the hook.
        message: String,
    },
}

impl HookError {
    /// Build a [`HookError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Outcome of a failed push.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The session no longer exists on the transport.
    #[error("connection gone")]
    Gone,

    /// The push may succeed if retried.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// Errors raised by the durable timer service.
#[derive(Debug, Error)]
pub enum TimerError {
    /// The timer could not be scheduled.
    #[error("failed to schedule timer: {0}")]
    Schedule(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
