//! Cache and loader error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised by cache infrastructure.
///
/// Fetch outcomes are reported through `ResultReason`, not through this type.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Failed to decode image.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Network error during download.
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Invalid loader configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CacheError {
    /// Creates an I/O error with context.
    #[must_use]
    pub fn io(context: &str, err: &std::io::Error) -> Self {
        Self::IoError(format!("{context}: {err}"))
    }
}
