//! Store Error Types
//!
//! Errors surfaced by the persistence collaborator. Every call into the store
//! is bounded by a timeout, so `Timeout` is the one variant every caller can
//! expect regardless of backend.

use std::time::Duration;
use thiserror::Error;

/// Persistence collaborator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The call did not complete within the configured timeout
    #[error("Store operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Backend failure (I/O, lock poisoning, injected fault)
    #[error("Store operation '{operation}' failed: {message}")]
    OperationFailed {
        operation: &'static str,
        message: String,
    },

    /// Insert of a key that already exists
    #[error("Duplicate key: {key}")]
    DuplicateKey { key: String },

    /// Conditional write against a key that does not exist
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Commit/rollback/write against a transaction the store does not know
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(u64),
}

impl StoreError {
    /// Create a timeout error
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Create a backend failure error
    pub fn operation_failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation,
            message: message.into(),
        }
    }

    /// Create a duplicate key error
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Whether retrying the same call might succeed.
    ///
    /// Only idempotent reads are ever retried; callers must not retry
    /// structural writes even when this returns true.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::OperationFailed { .. })
    }
}
