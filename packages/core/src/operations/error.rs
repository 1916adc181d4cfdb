//! Error types for the operation engine
//!
//! Every structural operation returns `Result<_, OperationError>`. The variants
//! sort into four handling classes:
//!
//! - **Validation**: bad parameters, rejected before anything is staged
//! - **Policy violation** (`NoPrecedingSibling`, `NoParent`): the editor treats
//!   these as silent no-ops; the tree is unchanged
//! - **Corruption**: a staged or loaded tree failed the structural invariants;
//!   fatal, never auto-repaired
//! - **Persistence**: the store failed or timed out; nothing is left half applied
//!
//! # Examples
//!
//! ```rust
//! use nodespace_hierarchy::operations::OperationError;
//!
//! let err = OperationError::no_preceding_sibling("node-1");
//! assert!(err.is_policy_violation());
//! assert!(!err.is_fatal());
//! ```

use crate::db::StoreError;
use crate::models::ValidationError;
use crate::services::ServiceError;
use thiserror::Error;

/// Errors that can occur during structural operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Bad parameters (duplicate id, unknown parent, bad offset, ...)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Indent of a first child: there is no sibling to become the new parent
    #[error("Node '{node_id}' has no preceding sibling")]
    NoPrecedingSibling { node_id: String },

    /// Outdent of a document root
    #[error("Node '{node_id}' has no parent to outdent from")]
    NoParent { node_id: String },

    /// Structural invariant violated; signals a logic defect
    #[error("Hierarchy corruption under root '{root_id}': {reason}")]
    HierarchyCorruption { root_id: String, reason: String },

    /// Store failure or timeout
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A background worker the engine depends on is gone
    #[error("Engine shut down: {0}")]
    ShutDown(String),
}

impl OperationError {
    /// Create a NoPrecedingSibling error
    pub fn no_preceding_sibling(node_id: impl Into<String>) -> Self {
        Self::NoPrecedingSibling {
            node_id: node_id.into(),
        }
    }

    /// Create a NoParent error
    pub fn no_parent(node_id: impl Into<String>) -> Self {
        Self::NoParent {
            node_id: node_id.into(),
        }
    }

    /// Create a HierarchyCorruption error
    pub fn corruption(root_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HierarchyCorruption {
            root_id: root_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a NodeNotFound validation error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::Validation(ValidationError::NodeNotFound { id: id.into() })
    }

    /// Map a service error raised while working on `root_id`
    ///
    /// Chain and reachability failures become `HierarchyCorruption`.
    pub fn from_service(root_id: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(err) => Self::Validation(err),
            ServiceError::Store(err) => Self::Persistence(err),
            ServiceError::BrokenChain { .. } | ServiceError::Orphaned { .. } => {
                Self::corruption(root_id, err.to_string())
            }
            ServiceError::RootNotFound { root_id } => Self::node_not_found(root_id),
            ServiceError::ShutDown(what) => Self::ShutDown(what),
        }
    }

    /// Structural refusal the editor handles as a silent no-op
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::NoPrecedingSibling { .. } | Self::NoParent { .. }
        )
    }

    /// Non-retryable logic defect that must be escalated
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::HierarchyCorruption { .. })
    }
}
