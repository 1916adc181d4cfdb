//! Service Layer Error Types
//!
//! Errors raised by the repository, the hierarchy index and the content
//! debouncer. The operation engine wraps these into
//! [`OperationError`](crate::operations::OperationError).

use crate::db::StoreError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Bad parameters (duplicate ID, unknown node)
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence collaborator failed or timed out
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    /// Sibling chain could not be reconstructed from edges
    #[error("Broken sibling chain under '{parent_id}': {reason}")]
    BrokenChain { parent_id: String, reason: String },

    /// Node present in the document but unreachable from its root
    #[error("Orphaned node '{node_id}': no path from root")]
    Orphaned { node_id: String },

    /// Document root does not exist in the store
    #[error("Root node not found: {root_id}")]
    RootNotFound { root_id: String },

    /// Background worker is gone
    #[error("Service shut down: {0}")]
    ShutDown(String),
}

impl ServiceError {
    /// Create a broken chain error
    pub fn broken_chain(parent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BrokenChain {
            parent_id: parent_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a root not found error
    pub fn root_not_found(root_id: impl Into<String>) -> Self {
        Self::RootNotFound {
            root_id: root_id.into(),
        }
    }

    /// Whether an idempotent read failing with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_broken_chain_message() {
        let err = ServiceError::broken_chain("p1", "2 heads");
        assert_eq!(err.to_string(), "Broken sibling chain under 'p1': 2 heads");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_timeout_is_retryable() {
        let err: ServiceError =
            StoreError::timeout("get_edges_for_root", Duration::from_millis(5)).into();
        assert!(err.is_retryable());
    }
}
