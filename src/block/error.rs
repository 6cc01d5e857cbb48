//! Error types for the block storage port and operation backends.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`super::BlockStorage`] implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BlockStorageError {
    /// Raised when the backend rejects or fails an attach request.
    #[error("failed to attach volume {volume}: {message}")]
    Attach {
        /// Logical volume name.
        volume: String,
        /// Error message from the backend.
        message: String,
    },
    /// Raised when the backend rejects or fails a detach request.
    #[error("failed to detach volume {volume}: {message}")]
    Detach {
        /// Logical volume name.
        volume: String,
        /// Error message from the backend.
        message: String,
    },
    /// Raised when an asynchronous operation misses its deadline.
    #[error("timeout after {timeout:?} waiting for operation {operation} on {target} to complete")]
    Timeout {
        /// Backend operation identifier.
        operation: String,
        /// Resource the operation affects.
        target: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
}

/// Errors raised by an [`super::OperationBackend`] talking to a provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when the backend cannot be configured for this host.
    #[error("block storage configuration error: {0}")]
    Config(String),
    /// Wrapper for provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider or transport.
        message: String,
    },
}

impl BackendError {
    /// Returns the provider message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config(message) | Self::Provider { message } => message,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}
