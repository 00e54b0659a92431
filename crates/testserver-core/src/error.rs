//! Error types for testserver-core

use thiserror::Error;

/// Result type alias for fixture server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the fixture server
#[derive(Debug, Error)]
pub enum Error {
    /// Pending request waiters are rejected with this when the server resets
    #[error("Static Server has been reset")]
    Reset,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper error
    #[error("HTTP error: {0}")]
    Hyper(String),

    /// A route handler panicked
    #[error("Route handler failed: {0}")]
    Handler(String),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this is the rejection produced by a server reset
    pub fn is_reset(&self) -> bool {
        matches!(self, Error::Reset)
    }
}
