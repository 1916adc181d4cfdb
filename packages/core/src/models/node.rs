//! Node and Edge Data Structures
//!
//! This module defines the stored entities of the hierarchy engine:
//!
//! - **Node**: content record (`id`, `node_type`, opaque `content`, `metadata`, `created_at`)
//! - **Edge**: directed parent→child relation carrying the sibling ordering pointer
//!
//! # Graph-Relational Storage
//!
//! A node never stores its parent, container or sibling. All structure lives in
//! edges, and every edge points one way (parent → child) with a single
//! `before_sibling_id` pointer naming the immediately preceding sibling.
//! Parent/container identity is passed to operations as parameters instead.
//!
//! # Examples
//!
//! ```rust
//! use nodespace_hierarchy::models::{Edge, Node, NodeKind};
//!
//! let root = Node::new(NodeKind::Date, "2025-01-03".to_string());
//! let child = Node::new(NodeKind::Text, "First note".to_string());
//!
//! // First child: no preceding sibling
//! let edge = Edge::new(root.id.clone(), child.id.clone(), None);
//! assert!(edge.is_head());
//! ```

use crate::models::NodeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for node and structural parameters
///
/// Raised before any mutation begins; a caller receiving one of these can be
/// sure nothing was written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Node '{id}' already exists")]
    DuplicateId { id: String },

    #[error("Parent node '{parent_id}' does not exist")]
    UnknownParent { parent_id: String },

    #[error("Node '{id}' does not exist")]
    NodeNotFound { id: String },

    #[error("Container '{container_id}' does not match parent root '{parent_root}'")]
    ContainerMismatch {
        container_id: String,
        parent_root: String,
    },

    #[error("Offset {offset} is invalid for node '{node_id}' with {length} characters")]
    InvalidOffset {
        node_id: String,
        offset: usize,
        length: usize,
    },

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Cannot delete node '{node_id}': {reason}")]
    InvalidDelete { node_id: String, reason: String },

    #[error("Node ID must not be empty")]
    EmptyId,
}

/// Universal content node
///
/// Content is an opaque string to the hierarchy engine; markdown semantics are
/// owned by the rendering layer. `metadata` is a free-form JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier (UUID unless the caller supplied one)
    pub id: String,

    /// Node kind tag
    pub node_type: NodeKind,

    /// Primary content/text of the node
    pub content: String,

    /// Free-form per-node metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Create a new Node with an auto-generated UUID and empty metadata
    pub fn new(node_type: NodeKind, content: String) -> Self {
        Self::new_with_id(Uuid::new_v4().to_string(), node_type, content, Map::new())
    }

    /// Create a new Node with a caller-chosen ID
    pub fn new_with_id(
        id: String,
        node_type: NodeKind,
        content: String,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            node_type,
            content,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Length of the content in characters (not bytes)
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Directed parent→child relation with single-pointer sibling ordering
///
/// `before_sibling_id` names the child immediately preceding this one under the
/// same parent, or `None` when this child is first (the chain head).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub parent_id: String,
    pub child_id: String,
    pub before_sibling_id: Option<String>,
}

impl Edge {
    pub fn new(parent_id: String, child_id: String, before_sibling_id: Option<String>) -> Self {
        Self {
            parent_id,
            child_id,
            before_sibling_id,
        }
    }

    /// Whether this edge is the head of its parent's sibling chain
    pub fn is_head(&self) -> bool {
        self.before_sibling_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_node_generates_uuid() {
        let node = Node::new(NodeKind::Text, "Hello".to_string());
        assert!(Uuid::parse_str(&node.id).is_ok());
        assert_eq!(node.node_type, NodeKind::Text);
        assert!(node.metadata.is_empty());
    }

    #[test]
    fn test_node_serializes_camel_case() {
        let mut metadata = Map::new();
        metadata.insert("priority".to_string(), json!("high"));
        let node = Node::new_with_id(
            "task-1".to_string(),
            NodeKind::Task,
            "- [ ] ship".to_string(),
            metadata,
        );

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["nodeType"], "task");
        assert_eq!(value["metadata"]["priority"], "high");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("parentId").is_none());
    }

    #[test]
    fn test_metadata_defaults_when_missing() {
        let node: Node = serde_json::from_value(json!({
            "id": "n1",
            "nodeType": "text",
            "content": "x",
            "createdAt": "2025-01-03T00:00:00Z"
        }))
        .unwrap();
        assert!(node.metadata.is_empty());
    }

    #[test]
    fn test_char_len_counts_chars() {
        let node = Node::new(NodeKind::Text, "héllo".to_string());
        assert_eq!(node.char_len(), 5);
        assert_eq!(node.content.len(), 6);
    }

    #[test]
    fn test_edge_head_detection() {
        let head = Edge::new("p".to_string(), "a".to_string(), None);
        let tail = Edge::new("p".to_string(), "b".to_string(), Some("a".to_string()));
        assert!(head.is_head());
        assert!(!tail.is_head());
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::DuplicateId {
            id: "n1".to_string(),
        };
        assert_eq!(err.to_string(), "Node 'n1' already exists");

        let err = ValidationError::InvalidOffset {
            node_id: "n1".to_string(),
            offset: 9,
            length: 3,
        };
        assert_eq!(
            err.to_string(),
            "Offset 9 is invalid for node 'n1' with 3 characters"
        );
    }
}
