//! Error types for the data access layer
//!
//! This module defines the error taxonomy shared by every crate in the
//! workspace. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Whether an error is *transient* (deadlock, lock timeout) is deliberately
//! not decided here: error codes are backend-specific, so the classification
//! is always asked of the backend that produced the error.

use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for data access operations
pub type DataResult<T> = std::result::Result<T, DataError>;

/// Error types for the data access layer
#[derive(Debug, Error)]
pub enum DataError {
    /// Failure reported by a storage backend
    ///
    /// `code` carries the backend's native error code (e.g. `"1205"` for a
    /// SQL Server deadlock victim, `"40P01"` for a Postgres deadlock) so the
    /// backend can later classify it as transient or not.
    #[error("Backend error{}: {message}", fmt_code(.code))]
    Backend {
        /// Backend-native error code, if any
        code: Option<String>,
        /// Human-readable message
        message: String,
    },

    /// Every attempt of a retried operation failed with a transient error
    #[error("Retry exhausted after {attempts} attempt(s): {source}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error raised by the final attempt
        #[source]
        source: Box<DataError>,
    },

    /// Missing or invalid entity metadata, unresolvable repository
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation not valid in the current state (e.g. writing to a committed transaction)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// One action of a write batch reported failure; the batch was rolled back
    #[error("Batch of transaction {transaction} failed at action {action}")]
    PartialBatchFailure {
        /// Transaction whose batch failed
        transaction: Uuid,
        /// Zero-based index of the failing action
        action: usize,
    },

    /// I/O error (configuration files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn fmt_code(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default()
}

impl DataError {
    /// Backend error without a native code
    pub fn backend(message: impl Into<String>) -> Self {
        DataError::Backend {
            code: None,
            message: message.into(),
        }
    }

    /// Backend error carrying a native error code
    pub fn backend_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        DataError::Backend {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        DataError::Configuration(message.into())
    }

    /// Invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        DataError::InvalidState(message.into())
    }

    /// Backend-native error code, looking through `RetryExhausted`
    pub fn code(&self) -> Option<&str> {
        match self.root_cause() {
            DataError::Backend { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The original error underneath any retry wrapping
    pub fn root_cause(&self) -> &DataError {
        let mut current = self;
        while let DataError::RetryExhausted { source, .. } = current {
            current = source.as_ref();
        }
        current
    }

    /// Whether this error is a configuration problem (never retried)
    pub fn is_configuration(&self) -> bool {
        matches!(self, DataError::Configuration(_))
    }

    /// Whether the retry engine gave up on this error
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, DataError::RetryExhausted { .. })
    }
}
