//! NodeStore Trait - Persistence Collaborator Seam
//!
//! This module defines the `NodeStore` trait that abstracts durable storage of
//! nodes and edges. The hierarchy engine owns no storage schema: any backend
//! that can answer bulk per-root reads and apply node/edge writes inside a
//! transaction can sit behind this trait.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked backends
//!    share one interface
//! 2. **Bulk Reads**: `get_nodes_for_root` / `get_edges_for_root` return a whole
//!    document in two calls, independent of tree depth
//! 3. **Explicit Transactions**: Writes take `Option<TxnId>`; `None` applies the
//!    write immediately. Backends without transactions report it through
//!    `supports_transactions()` and the engine compensates instead
//! 4. **Committed Reads Only**: Reads never observe writes staged in an open
//!    transaction
//! 5. **Snapshot Reads**: `get_document` returns nodes and edges from one
//!    committed state where the backend can provide it
//!
//! # Examples
//!
//! ```rust,no_run
//! use nodespace_hierarchy::db::{MemoryStore, NodeStore};
//! use nodespace_hierarchy::models::{Edge, Node, NodeKind};
//!
//! # async fn example() -> Result<(), nodespace_hierarchy::db::StoreError> {
//! let store = MemoryStore::new();
//! let root = Node::new(NodeKind::Date, "2025-01-03".to_string());
//! let child = Node::new(NodeKind::Text, "note".to_string());
//!
//! let txn = store.begin().await?;
//! store.insert_node(Some(txn), root.clone()).await?;
//! store.insert_node(Some(txn), child.clone()).await?;
//! store
//!     .upsert_edge(Some(txn), Edge::new(root.id.clone(), child.id.clone(), None))
//!     .await?;
//! store.commit(txn).await?;
//!
//! assert_eq!(store.get_nodes_for_root(&root.id).await?.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{Edge, Node};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Result alias for store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to an open store transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Bound a store call by `timeout`, mapping expiry to [`StoreError::Timeout`]
pub async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Store call '{}' timed out after {:?}", operation, timeout);
            Err(StoreError::timeout(operation, timeout))
        }
    }
}

/// A single write against the store
///
/// Used both to stage a commit plan and to describe compensating writes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Insert a node that must not exist yet
    InsertNode(Node),
    /// Insert or overwrite a node
    UpsertNode(Node),
    /// Overwrite a node that must already exist
    UpdateNode(Node),
    /// Insert or overwrite the edge keyed by (parent_id, child_id)
    UpsertEdge(Edge),
    /// Remove a node row
    DeleteNode(String),
    /// Remove the edge keyed by (parent_id, child_id)
    DeleteEdge { parent_id: String, child_id: String },
}

impl StoreOp {
    /// Short operation name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::InsertNode(_) => "insert_node",
            StoreOp::UpsertNode(_) => "upsert_node",
            StoreOp::UpdateNode(_) => "update_node",
            StoreOp::UpsertEdge(_) => "upsert_edge",
            StoreOp::DeleteNode(_) => "delete_node",
            StoreOp::DeleteEdge { .. } => "delete_edge",
        }
    }
}

/// Abstraction over node/edge persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the engine can share one store
/// across tasks.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Get a committed node by ID
    async fn get_node(&self, id: &str) -> StoreResult<Option<Node>>;

    /// Every committed node of the document rooted at `root_id`, root included.
    ///
    /// Returns an empty list when the root does not exist.
    async fn get_nodes_for_root(&self, root_id: &str) -> StoreResult<Vec<Node>>;

    /// Every committed edge of the document rooted at `root_id`
    async fn get_edges_for_root(&self, root_id: &str) -> StoreResult<Vec<Edge>>;

    /// Nodes and edges of one document, read from a single committed state
    ///
    /// The default makes the two bulk reads back to back, so a commit can land
    /// between them. Backends that can read both under one snapshot override it.
    async fn get_document(&self, root_id: &str) -> StoreResult<(Vec<Node>, Vec<Edge>)> {
        let nodes = self.get_nodes_for_root(root_id).await?;
        if nodes.is_empty() {
            return Ok((nodes, Vec::new()));
        }
        let edges = self.get_edges_for_root(root_id).await?;
        Ok((nodes, edges))
    }

    /// The committed edge pointing at `child_id`, if any (used to find a node's root)
    async fn get_parent_edge(&self, child_id: &str) -> StoreResult<Option<Edge>>;

    /// Insert a node, failing with `DuplicateKey` if the ID already exists
    async fn insert_node(&self, txn: Option<TxnId>, node: Node) -> StoreResult<()>;

    /// Insert or overwrite a node
    async fn upsert_node(&self, txn: Option<TxnId>, node: Node) -> StoreResult<()>;

    /// Overwrite an existing node, failing with `NotFound` if the row is gone.
    ///
    /// The existence check and the write are one atomic step, so a content
    /// write racing a delete can never bring the row back.
    async fn update_node(&self, txn: Option<TxnId>, node: Node) -> StoreResult<()>;

    /// Insert or overwrite an edge
    async fn upsert_edge(&self, txn: Option<TxnId>, edge: Edge) -> StoreResult<()>;

    /// Delete a node row (edges are the caller's responsibility)
    async fn delete_node(&self, txn: Option<TxnId>, id: &str) -> StoreResult<()>;

    /// Delete the edge between `parent_id` and `child_id`
    async fn delete_edge(
        &self,
        txn: Option<TxnId>,
        parent_id: &str,
        child_id: &str,
    ) -> StoreResult<()>;

    /// Open a transaction spanning node and edge writes
    async fn begin(&self) -> StoreResult<TxnId>;

    /// Atomically apply every write staged in `txn`
    async fn commit(&self, txn: TxnId) -> StoreResult<()>;

    /// Discard every write staged in `txn`
    async fn rollback(&self, txn: TxnId) -> StoreResult<()>;

    /// Whether `begin`/`commit`/`rollback` are real transactions.
    ///
    /// When false the engine applies writes one by one and undoes the applied
    /// prefix with compensating writes on failure.
    fn supports_transactions(&self) -> bool {
        true
    }

    /// Apply a single [`StoreOp`]
    async fn apply(&self, txn: Option<TxnId>, op: StoreOp) -> StoreResult<()> {
        match op {
            StoreOp::InsertNode(node) => self.insert_node(txn, node).await,
            StoreOp::UpsertNode(node) => self.upsert_node(txn, node).await,
            StoreOp::UpdateNode(node) => self.update_node(txn, node).await,
            StoreOp::UpsertEdge(edge) => self.upsert_edge(txn, edge).await,
            StoreOp::DeleteNode(id) => self.delete_node(txn, &id).await,
            StoreOp::DeleteEdge {
                parent_id,
                child_id,
            } => self.delete_edge(txn, &parent_id, &child_id).await,
        }
    }
}
