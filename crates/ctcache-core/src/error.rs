//! Error types for the container cache
//!
//! Callers must be able to tell "nothing cached" apart from "cache
//! unavailable", so storage failures always surface as
//! [`Error::StoreUnavailable`] and are never folded into empty results.

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the container cache
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed IP range or FQDN. Raised during normalization, before the
    /// store is touched.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The cache file or its backing storage cannot be read or written
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an invalid value error
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    /// Create a store unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the caller can recover by correcting its input
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::InvalidValue(_))
    }
}
