//! Crate-level error type
//!
//! Request failures are carried as [`ClassifiedError`]; this type only adds the
//! failures that happen outside a request (configuration, local file access).

use thiserror::Error;

use crate::classifier::ClassifiedError;

/// Result type alias for docsum operations
pub type Result<T> = std::result::Result<T, Error>;

/// docsum errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Work stopped before it finished (interrupted or superseded)
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A classified request failure
    #[error(transparent)]
    Request(#[from] ClassifiedError),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    /// The classified request failure, if this is one
    pub fn as_classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Request(err) => Some(err),
            _ => None,
        }
    }
}
