//! Hierarchy Services
//!
//! This module contains the building blocks the operation engine composes:
//!
//! - `NodeRepository` - node-level CRUD over the persistence collaborator
//! - `HierarchyIndex` - tree reconstruction from flat edges, structural caches
//! - `MergePolicy` - which node kinds may receive merged content
//! - `ContentDebouncer` - coalesces rapid content-only writes
//!
//! Services never plan structural writes themselves; that is the operation
//! engine's job.

pub mod content_debouncer;
pub mod error;
pub mod hierarchy_index;
pub mod merge_policy;
pub mod node_repository;

pub use content_debouncer::{ContentDebouncer, ContentSink, DebouncerStats};
pub use error::ServiceError;
pub use hierarchy_index::{build_tree, Hierarchy, HierarchyIndex, IndexStats, NodeHandle};
pub use merge_policy::{MergePolicy, NodeCapabilities};
pub use node_repository::NodeRepository;
