//! Transport error classification.

use thiserror::Error;

/// Failure reported by a transport.
///
/// The split matters for retries: only a lost connection is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection dropped mid-request.
    #[error("network connection lost: {0}")]
    ConnectionLost(String),

    /// Any other failure (DNS, TLS, timeout, refused connection, bad URL).
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Creates a connection lost error.
    #[must_use]
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    /// Creates a generic request error.
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    /// Returns whether re-issuing the request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}
