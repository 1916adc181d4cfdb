//! NodeSpace Node Hierarchy Engine
//!
//! This crate maintains ordered trees of content nodes (a document is a tree
//! under a root node) on top of a graph-style store that only knows flat
//! nodes and parent→child edges.
//!
//! # Architecture
//!
//! - **Single-pointer ordering**: each edge names the sibling it follows; the
//!   head of a chain names none. Order is reconstructed, never stored as an index
//! - **Bulk reads**: a whole document is fetched with one snapshot read of its
//!   nodes and edges, regardless of depth
//! - **Atomic structural operations**: every indent, outdent, merge, split,
//!   create and delete is staged on a copy of the committed tree,
//!   re-validated, then committed as one transaction (or compensated)
//! - **Per-root serialization**: structural operations on one document run
//!   one at a time; different documents never contend
//!
//! # Modules
//!
//! - [`models`] - Node, Edge, NodeKind and the nested Tree view
//! - [`db`] - `NodeStore` persistence seam, `MemoryStore`, domain events
//! - [`services`] - NodeRepository, HierarchyIndex, MergePolicy, ContentDebouncer
//! - [`operations`] - `OperationEngine`, the only writer of document structure
//! - [`config`] - Timeouts, retries and channel capacities
//! - [`logging`] - `tracing` subscriber setup for host binaries
//!
//! # Example
//!
//! ```rust
//! use nodespace_hierarchy::{CreateNodeParams, EngineConfig, MemoryStore, OperationEngine};
//! use nodespace_hierarchy::models::NodeKind;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let engine = OperationEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
//! let root = engine
//!     .create_node(CreateNodeParams::new(NodeKind::Date, "2025-01-03"))
//!     .await?;
//! let a = engine
//!     .create_node(CreateNodeParams::new(NodeKind::Text, "A").under(&root))
//!     .await?;
//! engine
//!     .create_node(CreateNodeParams::new(NodeKind::Text, "B").under(&root))
//!     .await?;
//!
//! let tree = engine.get_all_nodes_for_root(&root).await?;
//! assert_eq!(tree.outline(), "A, B");
//! assert_eq!(tree.top_level()[0].node.id, a);
//! # Ok::<(), nodespace_hierarchy::OperationError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::EngineConfig;
pub use db::{DomainEvent, MemoryStore, NodeStore, StoreError};
pub use logging::init_tracing;
pub use models::{Edge, Node, NodeKind, Tree, TreeNode, ValidationError};
pub use operations::{CreateNodeParams, DeletePolicy, MergeOutcome, OperationEngine, OperationError};
