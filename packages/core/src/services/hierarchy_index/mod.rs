//! Hierarchy Index
//!
//! Reconstructs documents from the store and caches derived structure.
//!
//! # Architecture
//!
//! Per document root the index keeps the last committed [`Hierarchy`] arena
//! behind an `Arc`, a node→root membership map, and lazily filled caches for
//! depth, children and siblings keyed by node id.
//!
//! # Cache Invalidation
//!
//! - **Install**: the operation engine publishes each committed arena with the
//!   ids it touched; entries for those ids and their subtrees (in both the old
//!   and the new arena) are evicted
//! - **Invalidate**: `invalidate(id)` evicts `id` and its descendants and marks
//!   them dirty; the next read recomputes from the installed arena
//!
//! Both walk only the affected subtree, never the whole document.
//!
//! `get_all_nodes_for_root` is a pure read of committed state and does not
//! touch the caches.

mod arena;

pub use arena::{build_tree, Hierarchy, NodeHandle};

use crate::config::EngineConfig;
use crate::db::{with_timeout, NodeStore};
use crate::models::{Tree, ValidationError};
use crate::services::error::ServiceError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct IndexState {
    /// root_id → last committed arena
    snapshots: HashMap<String, Arc<Hierarchy>>,
    /// node_id → root_id, for every node of an installed arena
    membership: HashMap<String, String>,
    depths: HashMap<String, usize>,
    children: HashMap<String, Vec<String>>,
    siblings: HashMap<String, Vec<String>>,
    dirty: HashSet<String>,
}

impl IndexState {
    fn locate(&self, id: &str) -> Result<(Arc<Hierarchy>, NodeHandle), ServiceError> {
        let not_found = || ValidationError::NodeNotFound { id: id.to_string() };
        let arena = self
            .membership
            .get(id)
            .and_then(|root| self.snapshots.get(root))
            .cloned()
            .ok_or_else(not_found)?;
        let handle = arena.handle(id).ok_or_else(not_found)?;
        Ok((arena, handle))
    }

    fn evict(&mut self, id: &str) {
        self.depths.remove(id);
        self.children.remove(id);
        self.siblings.remove(id);
        if self.membership.contains_key(id) {
            self.dirty.insert(id.to_string());
        }
    }

    fn evict_subtree(&mut self, arena: &Hierarchy, id: &str) {
        match arena.handle(id) {
            Some(handle) => {
                for h in arena.subtree(handle) {
                    self.evict(arena.id(h));
                }
            }
            None => self.evict(id),
        }
    }

    fn forget(&mut self, id: &str) {
        self.membership.remove(id);
        self.depths.remove(id);
        self.children.remove(id);
        self.siblings.remove(id);
        self.dirty.remove(id);
    }
}

/// Cache counters (for debugging/monitoring)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Documents with an installed arena
    pub roots: usize,
    /// Nodes across installed arenas
    pub nodes: usize,
    pub cached_depths: usize,
    pub cached_children: usize,
    pub cached_siblings: usize,
    /// Invalidated ids not yet recomputed
    pub dirty: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Tree reconstruction and structural caches
pub struct HierarchyIndex {
    store: Arc<dyn NodeStore>,
    config: EngineConfig,
    state: RwLock<IndexState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HierarchyIndex {
    pub fn new(store: Arc<dyn NodeStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            state: RwLock::new(IndexState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch and reconstruct the whole document rooted at `root_id`
    ///
    /// One snapshot read per attempt (at most two store calls) regardless of
    /// depth or width.
    /// Retryable store failures are retried with exponential backoff up to
    /// `read_retries` times.
    pub async fn get_all_nodes_for_root(&self, root_id: &str) -> Result<Tree, ServiceError> {
        Ok(self.fetch(root_id).await?.to_tree())
    }

    /// Fetch the committed arena for `root_id`, bypassing the caches
    ///
    /// A store without snapshot reads answers `get_document` with two calls, so
    /// a commit landing between them can make a healthy document look broken.
    /// A structural failure is therefore re-read once before it is reported.
    pub async fn fetch(&self, root_id: &str) -> Result<Hierarchy, ServiceError> {
        let mut attempt = 0;
        let mut reread = false;
        loop {
            match self.fetch_once(root_id).await {
                Ok(hierarchy) => return Ok(hierarchy),
                Err(
                    err @ (ServiceError::BrokenChain { .. } | ServiceError::Orphaned { .. }),
                ) if !reread => {
                    tracing::debug!("Re-reading '{}' after structural failure: {}", root_id, err);
                    reread = true;
                }
                Err(err) if err.is_retryable() && attempt < self.config.read_retries => {
                    let backoff = self.config.read_backoff(attempt);
                    tracing::warn!(
                        "Bulk read of '{}' failed (attempt {}), retrying in {:?}: {}",
                        root_id,
                        attempt + 1,
                        backoff,
                        err
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, root_id: &str) -> Result<Hierarchy, ServiceError> {
        let (nodes, edges) = with_timeout(
            "get_document",
            self.config.store_timeout(),
            self.store.get_document(root_id),
        )
        .await?;
        if nodes.is_empty() {
            return Err(ServiceError::root_not_found(root_id));
        }

        tracing::debug!(
            "Fetched {} nodes and {} edges for root '{}'",
            nodes.len(),
            edges.len(),
            root_id
        );
        build_tree(root_id, nodes, &edges)
    }

    /// Installed arena for `root_id`, fetching and installing it if absent
    pub async fn load(&self, root_id: &str) -> Result<Arc<Hierarchy>, ServiceError> {
        if let Some(arena) = self.snapshot(root_id).await {
            return Ok(arena);
        }
        let hierarchy = self.fetch(root_id).await?;
        Ok(self.install(hierarchy, &[]).await)
    }

    /// Last installed arena for `root_id`
    pub async fn snapshot(&self, root_id: &str) -> Option<Arc<Hierarchy>> {
        self.state.read().await.snapshots.get(root_id).cloned()
    }

    /// Root of the installed document containing `node_id`
    pub async fn root_of(&self, node_id: &str) -> Option<String> {
        self.state.read().await.membership.get(node_id).cloned()
    }

    /// Publish a committed arena, evicting cache entries under `touched`
    pub async fn install(&self, hierarchy: Hierarchy, touched: &[String]) -> Arc<Hierarchy> {
        let root_id = hierarchy.root_id().to_string();
        let arena = Arc::new(hierarchy);

        let mut state = self.state.write().await;
        let previous = state.snapshots.insert(root_id.clone(), arena.clone());

        if let Some(old) = &previous {
            for node in old.nodes() {
                if !arena.contains(&node.id) {
                    state.forget(&node.id);
                }
            }
        }
        for node in arena.nodes() {
            state.membership.insert(node.id.clone(), root_id.clone());
        }
        for id in touched {
            if let Some(old) = &previous {
                state.evict_subtree(old, id);
            }
            state.evict_subtree(&arena, id);
        }

        tracing::debug!(
            "Installed arena for root '{}' ({} nodes, {} touched)",
            root_id,
            arena.len(),
            touched.len()
        );
        arena
    }

    /// Drop everything cached for `root_id`
    pub async fn evict_root(&self, root_id: &str) {
        let mut state = self.state.write().await;
        if let Some(old) = state.snapshots.remove(root_id) {
            for node in old.nodes() {
                state.forget(&node.id);
            }
        }
    }

    /// Mark `node_id` and its cached descendants dirty. Idempotent.
    pub async fn invalidate(&self, node_id: &str) {
        let mut state = self.state.write().await;
        let arena = state
            .membership
            .get(node_id)
            .and_then(|root| state.snapshots.get(root))
            .cloned();
        match arena {
            Some(arena) => state.evict_subtree(&arena, node_id),
            None => state.evict(node_id),
        }
    }

    pub async fn is_dirty(&self, node_id: &str) -> bool {
        self.state.read().await.dirty.contains(node_id)
    }

    /// Distance from the document root (root = 0)
    pub async fn get_depth(&self, id: &str) -> Result<usize, ServiceError> {
        if let Some(depth) = self.state.read().await.depths.get(id).copied() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(depth);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().await;
        let (arena, handle) = state.locate(id)?;
        let depth = arena.depth(handle);
        state.depths.insert(id.to_string(), depth);
        state.dirty.remove(id);
        Ok(depth)
    }

    /// Ordered children of `id`
    pub async fn get_children(&self, id: &str) -> Result<Vec<String>, ServiceError> {
        if let Some(children) = self.state.read().await.children.get(id).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(children);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().await;
        let (arena, handle) = state.locate(id)?;
        let children = arena.child_ids(handle);
        state.children.insert(id.to_string(), children.clone());
        state.dirty.remove(id);
        Ok(children)
    }

    /// Other children of `id`'s parent, in chain order (empty for a root)
    pub async fn get_siblings(&self, id: &str) -> Result<Vec<String>, ServiceError> {
        if let Some(siblings) = self.state.read().await.siblings.get(id).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(siblings);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().await;
        let (arena, handle) = state.locate(id)?;
        let siblings: Vec<String> = match arena.parent(handle) {
            Some(parent) => arena
                .children(parent)
                .iter()
                .filter(|h| **h != handle)
                .map(|h| arena.id(*h).to_string())
                .collect(),
            None => Vec::new(),
        };
        state.siblings.insert(id.to_string(), siblings.clone());
        state.dirty.remove(id);
        Ok(siblings)
    }

    /// Last child of `parent_id`, where appends attach
    pub async fn tail_of(&self, parent_id: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.get_children(parent_id).await?.last().cloned())
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            roots: state.snapshots.len(),
            nodes: state.membership.len(),
            cached_depths: state.depths.len(),
            cached_children: state.children.len(),
            cached_siblings: state.siblings.len(),
            dirty: state.dirty.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
