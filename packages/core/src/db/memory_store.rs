//! In-Memory NodeStore
//!
//! `MemoryStore` keeps committed nodes and edges in hash maps and stages
//! transactional writes per `TxnId` until commit. It backs the test suite and
//! embedded use where durability is handled elsewhere.
//!
//! Commit validates the whole staged batch against committed state before
//! applying anything, then applies it under one write lock, so concurrent
//! readers see either the state before the commit or after it. `get_document`
//! reads nodes and edges under one read lock.
//!
//! Test knobs:
//!
//! - `with_latency` delays every call (exercises timeouts)
//! - `without_transactions` makes `supports_transactions()` return false
//! - `fail_next` injects a one-shot failure for a write kind or the edge read

use crate::db::node_store::{NodeStore, StoreOp, StoreResult, TxnId};
use crate::db::StoreError;
use crate::models::{Edge, Node};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::time::sleep;

/// Calls that can be targeted by [`MemoryStore::fail_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// `get_edges_for_root` or `get_document` (retryable reads)
    ReadEdges,
    InsertNode,
    UpsertNode,
    UpsertEdge,
    DeleteNode,
    DeleteEdge,
    Commit,
}

impl FaultPoint {
    fn for_op(op: &StoreOp) -> Self {
        match op {
            StoreOp::InsertNode(_) => FaultPoint::InsertNode,
            StoreOp::UpsertNode(_) | StoreOp::UpdateNode(_) => FaultPoint::UpsertNode,
            StoreOp::UpsertEdge(_) => FaultPoint::UpsertEdge,
            StoreOp::DeleteNode(_) => FaultPoint::DeleteNode,
            StoreOp::DeleteEdge { .. } => FaultPoint::DeleteEdge,
        }
    }
}

/// Call counters, for asserting access patterns in tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub node_reads: u64,
    pub edge_reads: u64,
    pub writes: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
struct Committed {
    nodes: HashMap<String, Node>,
    // Keyed by (parent_id, child_id)
    edges: HashMap<(String, String), Edge>,
}

impl Committed {
    /// Breadth-first walk from `root_id` over parent→child edges
    fn reachable_edges(&self, root_id: &str) -> Vec<Edge> {
        let mut by_parent: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in self.edges.values() {
            by_parent.entry(edge.parent_id.as_str()).or_default().push(edge);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut out = Vec::new();
        seen.insert(root_id);
        queue.push_back(root_id);

        while let Some(parent) = queue.pop_front() {
            if let Some(children) = by_parent.get(parent) {
                for edge in children {
                    out.push((*edge).clone());
                    if seen.insert(edge.child_id.as_str()) {
                        queue.push_back(edge.child_id.as_str());
                    }
                }
            }
        }
        out
    }

    /// Reject `op` against committed state plus the batch staged before it
    /// The root and every node reachable from it; empty if the root is absent
    fn document_nodes(&self, root_id: &str) -> Vec<Node> {
        let Some(root) = self.nodes.get(root_id) else {
            return Vec::new();
        };

        let edges = self.reachable_edges(root_id);
        let mut ids: HashSet<&str> = HashSet::from([root.id.as_str()]);
        let mut nodes = vec![root.clone()];
        for edge in &edges {
            if ids.insert(edge.child_id.as_str()) {
                if let Some(node) = self.nodes.get(&edge.child_id) {
                    nodes.push(node.clone());
                }
            }
        }
        nodes
    }

    fn check(&self, op: &StoreOp, pending: &mut Pending) -> StoreResult<()> {
        match op {
            StoreOp::InsertNode(node) => {
                let exists = self.nodes.contains_key(&node.id) && !pending.deleted.contains(&node.id);
                if exists || !pending.inserted.insert(node.id.clone()) {
                    return Err(StoreError::duplicate_key(node.id.clone()));
                }
                pending.deleted.remove(&node.id);
            }
            StoreOp::UpsertNode(node) => {
                pending.deleted.remove(&node.id);
            }
            StoreOp::UpdateNode(node) => {
                let exists = pending.inserted.contains(&node.id)
                    || (self.nodes.contains_key(&node.id) && !pending.deleted.contains(&node.id));
                if !exists {
                    return Err(StoreError::not_found(node.id.clone()));
                }
            }
            StoreOp::DeleteNode(id) => {
                pending.inserted.remove(id);
                pending.deleted.insert(id.clone());
            }
            StoreOp::UpsertEdge(_) | StoreOp::DeleteEdge { .. } => {}
        }
        Ok(())
    }

    fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::InsertNode(node) | StoreOp::UpsertNode(node) | StoreOp::UpdateNode(node) => {
                self.nodes.insert(node.id.clone(), node);
            }
            StoreOp::UpsertEdge(edge) => {
                self.edges
                    .insert((edge.parent_id.clone(), edge.child_id.clone()), edge);
            }
            StoreOp::DeleteNode(id) => {
                self.nodes.remove(&id);
            }
            StoreOp::DeleteEdge {
                parent_id,
                child_id,
            } => {
                self.edges.remove(&(parent_id, child_id));
            }
        }
    }
}

/// Node ids created or removed earlier in the batch being checked
#[derive(Debug, Default)]
struct Pending {
    inserted: HashSet<String>,
    deleted: HashSet<String>,
}

/// In-memory implementation of [`NodeStore`]
pub struct MemoryStore {
    committed: RwLock<Committed>,
    staged: Mutex<HashMap<u64, Vec<StoreOp>>>,
    next_txn: AtomicU64,
    faults: Mutex<Vec<FaultPoint>>,
    latency: Option<Duration>,
    transactional: bool,
    node_reads: AtomicU64,
    edge_reads: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(operation: &'static str) -> StoreError {
    StoreError::operation_failed(operation, "store lock poisoned")
}

impl MemoryStore {
    /// Create an empty transactional store with no simulated latency
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Committed::default()),
            staged: Mutex::new(HashMap::new()),
            next_txn: AtomicU64::new(1),
            faults: Mutex::new(Vec::new()),
            latency: None,
            transactional: true,
            node_reads: AtomicU64::new(0),
            edge_reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Report no transaction support so callers fall back to compensation
    pub fn without_transactions(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Make the next write of `point` fail once
    pub fn fail_next(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(point);
        }
    }

    /// Snapshot of the call counters
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            node_reads: self.node_reads.load(Ordering::Relaxed),
            edge_reads: self.edge_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Every committed edge, regardless of root (test inspection)
    pub fn all_edges(&self) -> Vec<Edge> {
        self.committed
            .read()
            .map(|c| c.edges.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed nodes, regardless of root (test inspection)
    pub fn node_count(&self) -> usize {
        self.committed.read().map(|c| c.nodes.len()).unwrap_or(0)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
    }

    fn take_fault(&self, point: FaultPoint) -> bool {
        match self.faults.lock() {
            Ok(mut faults) => match faults.iter().position(|p| *p == point) {
                Some(pos) => {
                    faults.remove(pos);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    async fn write(&self, txn: Option<TxnId>, op: StoreOp) -> StoreResult<()> {
        self.simulate_latency().await;
        let name = op.name();
        if self.take_fault(FaultPoint::for_op(&op)) {
            return Err(StoreError::operation_failed(name, "injected failure"));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);

        match txn {
            Some(TxnId(id)) => {
                let mut staged = self.staged.lock().map_err(|_| poisoned(name))?;
                let ops = staged.get_mut(&id).ok_or(StoreError::UnknownTransaction(id))?;
                ops.push(op);
                Ok(())
            }
            None => {
                let mut committed = self.committed.write().map_err(|_| poisoned(name))?;
                committed.check(&op, &mut Pending::default())?;
                committed.apply(op);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get_node(&self, id: &str) -> StoreResult<Option<Node>> {
        self.simulate_latency().await;
        self.node_reads.fetch_add(1, Ordering::Relaxed);
        let committed = self.committed.read().map_err(|_| poisoned("get_node"))?;
        Ok(committed.nodes.get(id).cloned())
    }

    async fn get_nodes_for_root(&self, root_id: &str) -> StoreResult<Vec<Node>> {
        self.simulate_latency().await;
        self.node_reads.fetch_add(1, Ordering::Relaxed);
        let committed = self
            .committed
            .read()
            .map_err(|_| poisoned("get_nodes_for_root"))?;

        Ok(committed.document_nodes(root_id))
    }

    async fn get_edges_for_root(&self, root_id: &str) -> StoreResult<Vec<Edge>> {
        self.simulate_latency().await;
        self.edge_reads.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(FaultPoint::ReadEdges) {
            return Err(StoreError::operation_failed(
                "get_edges_for_root",
                "injected failure",
            ));
        }
        let committed = self
            .committed
            .read()
            .map_err(|_| poisoned("get_edges_for_root"))?;
        Ok(committed.reachable_edges(root_id))
    }

    async fn get_document(&self, root_id: &str) -> StoreResult<(Vec<Node>, Vec<Edge>)> {
        self.simulate_latency().await;
        self.node_reads.fetch_add(1, Ordering::Relaxed);
        self.edge_reads.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(FaultPoint::ReadEdges) {
            return Err(StoreError::operation_failed("get_document", "injected failure"));
        }
        let committed = self.committed.read().map_err(|_| poisoned("get_document"))?;
        Ok((
            committed.document_nodes(root_id),
            committed.reachable_edges(root_id),
        ))
    }

    async fn get_parent_edge(&self, child_id: &str) -> StoreResult<Option<Edge>> {
        self.simulate_latency().await;
        self.edge_reads.fetch_add(1, Ordering::Relaxed);
        let committed = self
            .committed
            .read()
            .map_err(|_| poisoned("get_parent_edge"))?;
        Ok(committed
            .edges
            .values()
            .find(|edge| edge.child_id == child_id)
            .cloned())
    }

    async fn insert_node(&self, txn: Option<TxnId>, node: Node) -> StoreResult<()> {
        self.write(txn, StoreOp::InsertNode(node)).await
    }

    async fn upsert_node(&self, txn: Option<TxnId>, node: Node) -> StoreResult<()> {
        self.write(txn, StoreOp::UpsertNode(node)).await
    }

    async fn update_node(&self, txn: Option<TxnId>, node: Node) -> StoreResult<()> {
        self.write(txn, StoreOp::UpdateNode(node)).await
    }

    async fn upsert_edge(&self, txn: Option<TxnId>, edge: Edge) -> StoreResult<()> {
        self.write(txn, StoreOp::UpsertEdge(edge)).await
    }

    async fn delete_node(&self, txn: Option<TxnId>, id: &str) -> StoreResult<()> {
        self.write(txn, StoreOp::DeleteNode(id.to_string())).await
    }

    async fn delete_edge(
        &self,
        txn: Option<TxnId>,
        parent_id: &str,
        child_id: &str,
    ) -> StoreResult<()> {
        self.write(
            txn,
            StoreOp::DeleteEdge {
                parent_id: parent_id.to_string(),
                child_id: child_id.to_string(),
            },
        )
        .await
    }

    async fn begin(&self) -> StoreResult<TxnId> {
        self.simulate_latency().await;
        let id = self.next_txn.fetch_add(1, Ordering::Relaxed);
        let mut staged = self.staged.lock().map_err(|_| poisoned("begin"))?;
        staged.insert(id, Vec::new());
        Ok(TxnId(id))
    }

    async fn commit(&self, txn: TxnId) -> StoreResult<()> {
        self.simulate_latency().await;
        let ops = {
            let mut staged = self.staged.lock().map_err(|_| poisoned("commit"))?;
            staged
                .remove(&txn.0)
                .ok_or(StoreError::UnknownTransaction(txn.0))?
        };

        if self.take_fault(FaultPoint::Commit) {
            return Err(StoreError::operation_failed("commit", "injected failure"));
        }

        let mut committed = self.committed.write().map_err(|_| poisoned("commit"))?;
        let mut pending = Pending::default();
        for op in &ops {
            committed.check(op, &mut pending)?;
        }
        for op in ops {
            committed.apply(op);
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback(&self, txn: TxnId) -> StoreResult<()> {
        self.simulate_latency().await;
        let mut staged = self.staged.lock().map_err(|_| poisoned("rollback"))?;
        staged
            .remove(&txn.0)
            .ok_or(StoreError::UnknownTransaction(txn.0))?;
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;

    fn text(id: &str) -> Node {
        Node::new_with_id(
            id.to_string(),
            NodeKind::Text,
            id.to_string(),
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let txn = store.begin().await.unwrap();
        store.insert_node(Some(txn), text("root")).await.unwrap();

        assert!(store.get_node("root").await.unwrap().is_none());
        store.commit(txn).await.unwrap();
        assert!(store.get_node("root").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = MemoryStore::new();
        let txn = store.begin().await.unwrap();
        store.insert_node(Some(txn), text("root")).await.unwrap();
        store.rollback(txn).await.unwrap();

        assert!(store.get_node("root").await.unwrap().is_none());
        assert_eq!(store.stats().rollbacks, 1);
        assert!(matches!(
            store.commit(txn).await,
            Err(StoreError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_insert_aborts_whole_commit() {
        let store = MemoryStore::new();
        store.insert_node(None, text("a")).await.unwrap();

        let txn = store.begin().await.unwrap();
        store.insert_node(Some(txn), text("b")).await.unwrap();
        store.insert_node(Some(txn), text("a")).await.unwrap();
        let err = store.commit(txn).await.unwrap_err();

        assert_eq!(err, StoreError::duplicate_key("a"));
        assert!(store.get_node("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_of_missing_node_fails() {
        let store = MemoryStore::new();
        let err = store.update_node(None, text("ghost")).await.unwrap_err();
        assert_eq!(err, StoreError::not_found("ghost"));
        assert_eq!(store.node_count(), 0);

        store.insert_node(None, text("a")).await.unwrap();
        let mut edited = text("a");
        edited.content = "edited".to_string();
        store.update_node(None, edited).await.unwrap();
        assert_eq!(store.get_node("a").await.unwrap().unwrap().content, "edited");
    }

    #[tokio::test]
    async fn test_update_after_staged_delete_aborts_commit() {
        let store = MemoryStore::new();
        store.insert_node(None, text("a")).await.unwrap();

        let txn = store.begin().await.unwrap();
        store.delete_node(Some(txn), "a").await.unwrap();
        store.update_node(Some(txn), text("a")).await.unwrap();
        assert_eq!(store.commit(txn).await.unwrap_err(), StoreError::not_found("a"));
        assert!(store.get_node("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_root_reads_follow_edges() {
        let store = MemoryStore::new();
        for id in ["r", "a", "b", "stray"] {
            store.insert_node(None, text(id)).await.unwrap();
        }
        store
            .upsert_edge(None, Edge::new("r".into(), "a".into(), None))
            .await
            .unwrap();
        store
            .upsert_edge(None, Edge::new("a".into(), "b".into(), None))
            .await
            .unwrap();

        let mut ids: Vec<String> = store
            .get_nodes_for_root("r")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "r"]);
        assert_eq!(store.get_edges_for_root("r").await.unwrap().len(), 2);
        assert!(store.get_nodes_for_root("missing").await.unwrap().is_empty());
        assert_eq!(
            store.get_parent_edge("b").await.unwrap().map(|e| e.parent_id),
            Some("a".to_string())
        );
        assert!(store.get_parent_edge("r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_snapshot_matches_bulk_reads() {
        let store = MemoryStore::new();
        for id in ["r", "a"] {
            store.insert_node(None, text(id)).await.unwrap();
        }
        store
            .upsert_edge(None, Edge::new("r".into(), "a".into(), None))
            .await
            .unwrap();

        let (nodes, edges) = store.get_document("r").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges, store.get_edges_for_root("r").await.unwrap());
        assert_eq!(store.get_document("missing").await.unwrap(), (Vec::new(), Vec::new()));
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(FaultPoint::UpsertEdge);

        let edge = Edge::new("r".into(), "a".into(), None);
        assert!(store.upsert_edge(None, edge.clone()).await.is_err());
        assert!(store.upsert_edge(None, edge).await.is_ok());
    }

    #[tokio::test]
    async fn test_without_transactions_flag() {
        let store = MemoryStore::new().without_transactions();
        assert!(!store.supports_transactions());
        assert!(MemoryStore::new().supports_transactions());
    }
}
