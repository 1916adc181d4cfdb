//! Data Models
//!
//! This module contains the core data structures of the hierarchy engine:
//!
//! - `Node` - Universal content node (content is opaque to this crate)
//! - `Edge` - Parent→child relation with single-pointer sibling ordering
//! - `NodeKind` - Closed set of known node types
//! - `Tree` / `TreeNode` - Nested ordered view returned to the editor layer

mod node;
mod node_kind;
mod tree;

pub use node::{Edge, Node, ValidationError};
pub use node_kind::NodeKind;
pub use tree::{Tree, TreeNode};
