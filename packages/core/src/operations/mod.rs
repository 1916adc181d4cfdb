//! Structural Operations
//!
//! This module provides the `OperationEngine`, the single entry point for
//! changes to a document's shape, plus its parameter and outcome types.
//!
//! Every structural operation runs under its document's root lock, is staged
//! on a copy of the committed arena, re-validated, and committed atomically.

mod engine;
pub mod error;
mod root_locks;
mod write_plan;

pub use engine::OperationEngine;
pub use error::OperationError;

use crate::models::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters for creating a node
///
/// Parent and container identity are operation parameters, never stored node
/// fields: the engine turns them into a parent edge in the same atomic step.
///
/// # ID Generation
///
/// `id: None` generates a UUID v4. A caller-supplied id (e.g. an editor that
/// pre-generates ids for optimistic updates) must be unique.
///
/// # Placement
///
/// - `parent_id: Some(p)`: appended at the tail of `p`'s children
/// - `parent_id: None, container_id: Some(r)`: appended at the tail of
///   document `r`'s top level
/// - both `None`: the node becomes the root of a new document
///
/// When both are given, `container_id` must name the parent's document root.
///
/// # Examples
///
/// ```rust
/// use nodespace_hierarchy::models::NodeKind;
/// use nodespace_hierarchy::operations::CreateNodeParams;
///
/// let params = CreateNodeParams::new(NodeKind::Task, "- [ ] ship it")
///     .under("parent-123")
///     .in_container("2025-01-03");
/// assert_eq!(params.parent_id.as_deref(), Some("parent-123"));
/// assert!(params.id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CreateNodeParams {
    /// Optional ID for the node; generated if None
    pub id: Option<String>,
    pub node_type: NodeKind,
    pub content: String,
    pub metadata: Map<String, Value>,
    /// Node to append under
    pub parent_id: Option<String>,
    /// Document root the new node must belong to
    pub container_id: Option<String>,
}

impl CreateNodeParams {
    pub fn new(node_type: NodeKind, content: impl Into<String>) -> Self {
        Self {
            id: None,
            node_type,
            content: content.into(),
            metadata: Map::new(),
            parent_id: None,
            container_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn in_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What happens to a deleted node's children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// Remove the whole subtree
    Cascade,
    /// Move the children into the node's former position under its parent
    PromoteChildren,
}

/// Result of `merge_with_previous`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOutcome {
    /// Content and children moved into the previous node; the node is gone
    Merged,
    /// Nothing to merge into (or the target refuses merges); nothing changed
    Skipped,
}
