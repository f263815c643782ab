//! Server error types.

use thiserror::Error;

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),

    /// The server was already started.
    #[error("server already started")]
    AlreadyStarted,
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
