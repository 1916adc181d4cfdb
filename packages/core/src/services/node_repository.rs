//! Node Repository
//!
//! CRUD over node records. Durability is delegated to the [`NodeStore`]
//! collaborator; every call is bounded by the configured store timeout.
//!
//! The repository never touches edges. Structural writes are planned and
//! committed by the operation engine; the repository is the entry point for
//! node-level reads, standalone creates and content-only writes.

use crate::db::{with_timeout, NodeStore, StoreError};
use crate::models::{Node, NodeKind, ValidationError};
use crate::services::error::ServiceError;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Node-level persistence operations
#[derive(Clone)]
pub struct NodeRepository {
    store: Arc<dyn NodeStore>,
    timeout: Duration,
}

impl NodeRepository {
    pub fn new(store: Arc<dyn NodeStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Underlying persistence collaborator
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Persist a new node, returning its ID
    ///
    /// # Errors
    ///
    /// - `ValidationError::EmptyId` for an empty ID
    /// - `ValidationError::DuplicateId` if a node with this ID exists
    pub async fn create_node(
        &self,
        id: &str,
        node_type: NodeKind,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<String, ServiceError> {
        if id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        self.ensure_absent(id).await?;

        let node = Node::new_with_id(id.to_string(), node_type, content.to_string(), metadata);
        with_timeout("insert_node", self.timeout, self.store.insert_node(None, node))
            .await
            .map_err(|err| map_duplicate(err, id))?;

        tracing::debug!("Created node '{}' ({})", id, node_type);
        Ok(id.to_string())
    }

    /// Fail with `DuplicateId` if `id` already exists
    pub async fn ensure_absent(&self, id: &str) -> Result<(), ServiceError> {
        if self.get_node(id).await?.is_some() {
            return Err(ValidationError::DuplicateId { id: id.to_string() }.into());
        }
        Ok(())
    }

    /// Replace a node's content; no hierarchy side effects
    ///
    /// Runs without the root lock. The write is conditional on the row still
    /// existing, so a delete that lands between the read and the write wins
    /// and this returns `NodeNotFound`.
    pub async fn update_content(&self, id: &str, content: String) -> Result<Node, ServiceError> {
        let not_found = || ValidationError::NodeNotFound { id: id.to_string() };
        let mut node = self.get_node(id).await?.ok_or_else(not_found)?;
        node.content = content;

        with_timeout(
            "update_node",
            self.timeout,
            self.store.update_node(None, node.clone()),
        )
        .await
        .map_err(|err| match err {
            StoreError::NotFound { .. } => not_found().into(),
            other => ServiceError::from(other),
        })?;
        Ok(node)
    }

    /// Remove a node row. The caller must already have detached every edge
    /// referencing it.
    pub async fn delete_node(&self, id: &str) -> Result<(), ServiceError> {
        with_timeout("delete_node", self.timeout, self.store.delete_node(None, id)).await?;
        Ok(())
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, ServiceError> {
        let node = with_timeout("get_node", self.timeout, self.store.get_node(id)).await?;
        Ok(node)
    }
}

fn map_duplicate(err: StoreError, id: &str) -> ServiceError {
    match err {
        StoreError::DuplicateKey { .. } => {
            ValidationError::DuplicateId { id: id.to_string() }.into()
        }
        other => other.into(),
    }
}
