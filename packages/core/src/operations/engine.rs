//! Operation Engine
//!
//! The single writer of document structure. Every structural operation
//! follows the same protocol:
//!
//! 1. Resolve the node's document root and take that root's lock
//! 2. Load the committed arena (cached by the hierarchy index)
//! 3. Stage the mutation on a clone of the arena
//! 4. Re-validate the staged arena (single parent, intact chains, reachable)
//! 5. Diff into a write plan and commit it atomically, in a spawned task so a
//!    dropped caller cannot interrupt it
//! 6. Install the new arena, invalidating the touched ids, then emit events
//!
//! Validation and policy failures return before step 5, so nothing is written.
//! A staged arena that fails step 4 is `HierarchyCorruption`: the operation is
//! abandoned and the error is logged and propagated, never repaired.
//!
//! Content-only updates skip the lock: they never touch edges.

use crate::config::EngineConfig;
use crate::db::{with_timeout, DomainEvent, NodeStore, StoreError};
use crate::models::{Node, Tree, ValidationError};
use crate::operations::root_locks::{RootGuard, RootLocks};
use crate::operations::write_plan::{self, WritePlan};
use crate::operations::{CreateNodeParams, DeletePolicy, MergeOutcome, OperationError};
use crate::services::{
    build_tree, ContentDebouncer, Hierarchy, HierarchyIndex, MergePolicy, NodeHandle,
    NodeRepository,
};
use serde_json::Map;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

// Upper bound on parent hops when locating a node's root
const MAX_ANCESTOR_HOPS: usize = 10_000;

/// Structural operations over graph-backed documents
pub struct OperationEngine {
    repository: NodeRepository,
    index: Arc<HierarchyIndex>,
    policy: MergePolicy,
    config: EngineConfig,
    root_locks: RootLocks,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl OperationEngine {
    pub fn new(store: Arc<dyn NodeStore>, config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            repository: NodeRepository::new(store.clone(), config.store_timeout()),
            index: Arc::new(HierarchyIndex::new(store, config.clone())),
            policy: MergePolicy::default(),
            config,
            root_locks: RootLocks::default(),
            event_tx,
        }
    }

    /// Replace the default merge policy
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn repository(&self) -> &NodeRepository {
        &self.repository
    }

    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Debouncer writing coalesced content edits through this engine's repository
    ///
    /// Debounced writes are content-only and emit no events.
    pub fn content_debouncer(&self) -> ContentDebouncer {
        ContentDebouncer::new(
            Arc::new(self.repository.clone()),
            self.config.content_debounce(),
        )
    }

    /// Subscribe to change notifications
    ///
    /// Events are sent after the write that caused them has committed.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Change notifications as a stream; lagged events are skipped
    pub fn event_stream(&self) -> impl Stream<Item = DomainEvent> + Send + Unpin {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|event| event.ok())
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>, OperationError> {
        self.repository
            .get_node(id)
            .await
            .map_err(|err| OperationError::from_service(id, err))
    }

    /// Whole document rooted at `root_id` as a nested ordered tree
    ///
    /// Reads committed state only; may run concurrently with structural writes.
    pub async fn get_all_nodes_for_root(&self, root_id: &str) -> Result<Tree, OperationError> {
        self.index
            .get_all_nodes_for_root(root_id)
            .await
            .map_err(|err| self.log_fatal(OperationError::from_service(root_id, err)))
    }

    /// Content-only write; no structural side effects, no root lock
    pub async fn update_content(
        &self,
        node_id: &str,
        content: impl Into<String>,
    ) -> Result<Node, OperationError> {
        let node = self
            .repository
            .update_content(node_id, content.into())
            .await
            .map_err(|err| OperationError::from_service(node_id, err))?;
        send_events(&self.event_tx, vec![DomainEvent::NodeUpdated { node: node.clone() }]);
        Ok(node)
    }

    /// Create a node, attaching it under its parent in the same atomic step
    ///
    /// # Errors
    ///
    /// - `ValidationError::UnknownParent` if the parent (or container) does not exist
    /// - `ValidationError::ContainerMismatch` if `container_id` is not the parent's root
    /// - `ValidationError::DuplicateId` if the supplied id is taken
    ///
    /// A failed create leaves no trace: either the transaction rolls back or a
    /// compensating delete removes the node.
    pub async fn create_node(&self, params: CreateNodeParams) -> Result<String, OperationError> {
        let CreateNodeParams {
            id,
            node_type,
            content,
            metadata,
            parent_id,
            container_id,
        } = params;

        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if id.is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        let node = Node::new_with_id(id.clone(), node_type, content, metadata);

        let Some(parent_id) = parent_id.or_else(|| container_id.clone()) else {
            return self.create_root(node).await;
        };

        let root_id = match self.resolve_root(&parent_id).await {
            Ok(root_id) => root_id,
            Err(OperationError::Validation(ValidationError::NodeNotFound { .. })) => {
                return Err(ValidationError::UnknownParent { parent_id }.into());
            }
            Err(err) => return Err(err),
        };
        if let Some(container_id) = container_id {
            if container_id != root_id {
                return Err(ValidationError::ContainerMismatch {
                    container_id,
                    parent_root: root_id,
                }
                .into());
            }
        }

        let guard = self.root_locks.acquire(&root_id).await;
        let base = self.load(&root_id).await?;
        let parent = base.handle(&parent_id).ok_or_else(|| ValidationError::UnknownParent {
            parent_id: parent_id.clone(),
        })?;
        if base.contains(&id) {
            return Err(ValidationError::DuplicateId { id }.into());
        }
        self.repository
            .ensure_absent(&id)
            .await
            .map_err(|err| OperationError::from_service(&root_id, err))?;

        let tail = self
            .index
            .tail_of(&parent_id)
            .await
            .map_err(|err| OperationError::from_service(&root_id, err))?;
        let at = tail
            .and_then(|tail| base.handle(&tail))
            .and_then(|tail| base.position(tail))
            .map_or(0, |pos| pos + 1);

        let mut staged = (*base).clone();
        let handle = staged.insert(node.clone())?;
        staged.attach(handle, parent, at);

        self.commit(
            guard,
            &root_id,
            &base,
            staged,
            &[parent_id.clone()],
            vec![DomainEvent::NodeCreated {
                node,
                parent_id: Some(parent_id.clone()),
            }],
        )
        .await?;

        tracing::debug!("Created node '{}' under '{}'", id, parent_id);
        Ok(id)
    }

    async fn create_root(&self, node: Node) -> Result<String, OperationError> {
        let id = node.id.clone();
        let guard = self.root_locks.acquire(&id).await;
        self.repository
            .ensure_absent(&id)
            .await
            .map_err(|err| OperationError::from_service(&id, err))?;

        let arena = build_tree(&id, vec![node.clone()], &[])
            .map_err(|err| OperationError::from_service(&id, err))?;
        let events = vec![DomainEvent::NodeCreated {
            node: node.clone(),
            parent_id: None,
        }];
        self.finish(
            guard,
            &id,
            WritePlan::create_document(node),
            Publish::Install {
                arena,
                touched: Vec::new(),
            },
            events,
        )
        .await
        .map_err(|err| match err {
            OperationError::Persistence(StoreError::DuplicateKey { .. }) => {
                ValidationError::DuplicateId { id: id.clone() }.into()
            }
            other => other,
        })?;

        tracing::debug!("Created document root '{}'", id);
        Ok(id)
    }

    /// Make the node the last child of its preceding sibling, subtree intact
    ///
    /// A first child returns `NoPrecedingSibling` and nothing changes.
    pub async fn indent(&self, node_id: &str) -> Result<(), OperationError> {
        let root_id = self.resolve_root(node_id).await?;
        let guard = self.root_locks.acquire(&root_id).await;
        let base = self.load(&root_id).await?;
        let handle = locate(&base, node_id)?;

        let new_parent = base
            .preceding_sibling(handle)
            .ok_or_else(|| OperationError::no_preceding_sibling(node_id))?;
        let old_parent = base.parent(handle);

        let mut staged = (*base).clone();
        staged.detach(handle);
        staged.append(handle, new_parent);

        let old_parent_id = old_parent.map(|p| base.id(p).to_string());
        let new_parent_id = base.id(new_parent).to_string();
        let mut touched = vec![new_parent_id.clone(), node_id.to_string()];
        touched.extend(old_parent_id.clone());

        self.commit(
            guard,
            &root_id,
            &base,
            staged,
            &touched,
            vec![DomainEvent::NodeReparented {
                node_id: node_id.to_string(),
                old_parent_id,
                new_parent_id: Some(new_parent_id),
            }],
        )
        .await
    }

    /// Make the node the next sibling of its parent, adopting its following siblings
    ///
    /// The adopted siblings are appended after the node's existing children in
    /// their original order; a last child adopts nothing. A top-level node stays
    /// under the document root and only adopts. A root returns `NoParent` and
    /// nothing changes.
    pub async fn outdent(&self, node_id: &str) -> Result<(), OperationError> {
        let root_id = self.resolve_root(node_id).await?;
        let guard = self.root_locks.acquire(&root_id).await;
        let base = self.load(&root_id).await?;
        let handle = locate(&base, node_id)?;

        let parent = base
            .parent(handle)
            .ok_or_else(|| OperationError::no_parent(node_id))?;
        let adopted = base.following_siblings(handle);
        let parent_id = base.id(parent).to_string();

        let mut staged = (*base).clone();
        let mut events = Vec::new();
        let touched = match base.parent(parent) {
            Some(grandparent) => {
                let parent_pos = base.position(parent).ok_or_else(|| {
                    OperationError::corruption(&root_id, "parent missing from its chain")
                })?;
                staged.detach(handle);
                for sibling in &adopted {
                    staged.detach(*sibling);
                    staged.append(*sibling, handle);
                }
                staged.attach(handle, grandparent, parent_pos + 1);

                let grandparent_id = base.id(grandparent).to_string();
                events.push(DomainEvent::NodeReparented {
                    node_id: node_id.to_string(),
                    old_parent_id: Some(parent_id.clone()),
                    new_parent_id: Some(grandparent_id.clone()),
                });
                grandparent_id
            }
            None => {
                if adopted.is_empty() {
                    tracing::debug!("Outdent of '{}' is a no-op: last top-level node", node_id);
                    return Ok(());
                }
                for sibling in &adopted {
                    staged.detach(*sibling);
                    staged.append(*sibling, handle);
                }
                parent_id.clone()
            }
        };
        events.extend(adopted.iter().map(|sibling| DomainEvent::NodeReparented {
            node_id: base.id(*sibling).to_string(),
            old_parent_id: Some(parent_id.clone()),
            new_parent_id: Some(node_id.to_string()),
        }));

        tracing::debug!(
            "Outdenting '{}' (adopting {} siblings)",
            node_id,
            adopted.len()
        );
        self.commit(guard, &root_id, &base, staged, &[touched], events)
            .await
    }

    /// Append the node's content to the previous node and remove the node
    ///
    /// The previous node is the preceding sibling, or the parent for a first
    /// child (never the document root). Returns `Skipped` with nothing changed
    /// when there is no previous node or it refuses merges.
    pub async fn merge_with_previous(&self, node_id: &str) -> Result<MergeOutcome, OperationError> {
        let root_id = self.resolve_root(node_id).await?;
        let guard = self.root_locks.acquire(&root_id).await;
        let committed = self.load(&root_id).await?;
        let handle = locate(&committed, node_id)?;

        let parent = committed.parent(handle);
        let target = committed.preceding_sibling(handle).or_else(|| {
            parent.filter(|p| committed.parent(*p).is_some())
        });
        let Some(target) = target else {
            tracing::debug!("Merge of '{}' skipped: nothing precedes it", node_id);
            return Ok(MergeOutcome::Skipped);
        };
        if !self.policy.can_merge_into(committed.node(target)) {
            tracing::warn!(
                "Merge of '{}' skipped: '{}' ({}) does not accept merges",
                node_id,
                committed.id(target),
                committed.node(target).node_type
            );
            return Ok(MergeOutcome::Skipped);
        }

        // The arena may lag content-only writes; merge the persisted content
        let mut base = (*committed).clone();
        let target_id = base.id(target).to_string();
        self.refresh_content(&root_id, &mut base, &[target_id.as_str(), node_id])
            .await?;

        let source = base.node(handle).clone();
        let target_node = base.node(target).clone();
        let appended = if source.node_type == target_node.node_type {
            source.content.clone()
        } else {
            source.node_type.strip_line_syntax(&source.content)
        };

        let mut staged = base.clone();
        staged.node_mut(target).content = format!("{}{}", target_node.content, appended);

        let children = base.children(handle).to_vec();
        let into_parent = Some(target) == parent;
        let pos = base.position(handle).unwrap_or(0);
        for (i, child) in children.iter().enumerate() {
            staged.detach(*child);
            if into_parent {
                staged.attach(*child, target, pos + 1 + i);
            } else {
                staged.append(*child, target);
            }
        }
        staged.remove(handle);

        let mut events = vec![DomainEvent::NodeUpdated {
            node: staged.node(target).clone(),
        }];
        events.extend(children.iter().map(|child| DomainEvent::NodeReparented {
            node_id: base.id(*child).to_string(),
            old_parent_id: Some(node_id.to_string()),
            new_parent_id: Some(target_id.clone()),
        }));
        events.push(DomainEvent::NodeDeleted {
            id: node_id.to_string(),
        });

        let mut touched = vec![target_id.clone(), node_id.to_string()];
        touched.extend(parent.map(|p| base.id(p).to_string()));
        self.commit(guard, &root_id, &base, staged, &touched, events)
            .await?;

        tracing::debug!("Merged '{}' into '{}'", node_id, target_id);
        Ok(MergeOutcome::Merged)
    }

    /// Split the node's content at char `offset` into a new following sibling
    ///
    /// The node keeps `[..offset]`; the new node (same kind, no children)
    /// holds the rest. Returns the new node's id.
    pub async fn split_at(&self, node_id: &str, offset: usize) -> Result<String, OperationError> {
        let root_id = self.resolve_root(node_id).await?;
        let guard = self.root_locks.acquire(&root_id).await;
        let committed = self.load(&root_id).await?;
        let handle = locate(&committed, node_id)?;

        let parent = committed
            .parent(handle)
            .ok_or_else(|| OperationError::no_parent(node_id))?;

        let mut base = (*committed).clone();
        self.refresh_content(&root_id, &mut base, &[node_id]).await?;
        let node = base.node(handle).clone();

        let length = node.char_len();
        if offset > length {
            return Err(ValidationError::InvalidOffset {
                node_id: node_id.to_string(),
                offset,
                length,
            }
            .into());
        }
        let byte = node
            .content
            .char_indices()
            .nth(offset)
            .map_or(node.content.len(), |(byte, _)| byte);
        let (head, tail) = node.content.split_at(byte);

        let new_node = Node::new_with_id(
            Uuid::new_v4().to_string(),
            node.node_type,
            tail.to_string(),
            Map::new(),
        );
        let new_id = new_node.id.clone();
        let pos = base.position(handle).unwrap_or(0);

        let mut staged = base.clone();
        staged.node_mut(handle).content = head.to_string();
        let new_handle = staged.insert(new_node.clone())?;
        staged.attach(new_handle, parent, pos + 1);

        let parent_id = base.id(parent).to_string();
        let events = vec![
            DomainEvent::NodeUpdated {
                node: staged.node(handle).clone(),
            },
            DomainEvent::NodeCreated {
                node: new_node,
                parent_id: Some(parent_id.clone()),
            },
        ];
        self.commit(guard, &root_id, &base, staged, &[parent_id], events)
            .await?;

        tracing::debug!("Split '{}' at {} into '{}'", node_id, offset, new_id);
        Ok(new_id)
    }

    /// Delete a node
    ///
    /// - `Cascade` removes the whole subtree (a root takes its document with it)
    /// - `PromoteChildren` moves the children into the node's position under
    ///   its parent, in order; invalid for a root
    pub async fn delete_node(&self, node_id: &str, policy: DeletePolicy) -> Result<(), OperationError> {
        let root_id = self.resolve_root(node_id).await?;
        let guard = self.root_locks.acquire(&root_id).await;
        let base = self.load(&root_id).await?;
        let handle = locate(&base, node_id)?;

        let Some(parent) = base.parent(handle) else {
            return match policy {
                DeletePolicy::Cascade => self.delete_document(guard, &root_id, &base).await,
                DeletePolicy::PromoteChildren => Err(ValidationError::InvalidDelete {
                    node_id: node_id.to_string(),
                    reason: "a document root has no parent to promote children into".to_string(),
                }
                .into()),
            };
        };
        let parent_id = base.id(parent).to_string();

        let mut staged = (*base).clone();
        let mut events = Vec::new();
        match policy {
            DeletePolicy::Cascade => {
                let subtree = base.subtree(handle);
                for h in subtree.iter().rev() {
                    staged.remove(*h);
                }
                events.extend(subtree.iter().map(|h| DomainEvent::NodeDeleted {
                    id: base.id(*h).to_string(),
                }));
            }
            DeletePolicy::PromoteChildren => {
                let pos = base.position(handle).unwrap_or(0);
                let children = base.children(handle).to_vec();
                for (i, child) in children.iter().enumerate() {
                    staged.detach(*child);
                    staged.attach(*child, parent, pos + 1 + i);
                }
                staged.remove(handle);
                events.extend(children.iter().map(|child| DomainEvent::NodeReparented {
                    node_id: base.id(*child).to_string(),
                    old_parent_id: Some(node_id.to_string()),
                    new_parent_id: Some(parent_id.clone()),
                }));
                events.push(DomainEvent::NodeDeleted {
                    id: node_id.to_string(),
                });
            }
        }

        tracing::debug!("Deleting '{}' ({:?})", node_id, policy);
        self.commit(
            guard,
            &root_id,
            &base,
            staged,
            &[parent_id, node_id.to_string()],
            events,
        )
        .await
    }

    async fn delete_document(
        &self,
        guard: RootGuard,
        root_id: &str,
        base: &Hierarchy,
    ) -> Result<(), OperationError> {
        let events = base
            .subtree(base.root())
            .into_iter()
            .map(|h| DomainEvent::NodeDeleted {
                id: base.id(h).to_string(),
            })
            .collect();

        let plan = WritePlan::between(base, None);
        self.finish(guard, root_id, plan, Publish::EvictRoot, events)
            .await?;
        tracing::debug!("Deleted document '{}' ({} nodes)", root_id, base.len());
        Ok(())
    }

    /// Validate, persist and publish a staged arena
    async fn commit(
        &self,
        guard: RootGuard,
        root_id: &str,
        base: &Hierarchy,
        staged: Hierarchy,
        touched: &[String],
        events: Vec<DomainEvent>,
    ) -> Result<(), OperationError> {
        if let Err(err) = staged.validate() {
            return Err(self.log_fatal(OperationError::from_service(root_id, err)));
        }

        let plan = WritePlan::between(base, Some(&staged));
        let publish = Publish::Install {
            arena: staged,
            touched: touched.to_vec(),
        };
        self.finish(guard, root_id, plan, publish, events).await
    }

    /// Persist `plan`, then publish, in a task of its own
    ///
    /// The task owns the root lock, so a caller dropping its future neither
    /// interrupts the commit nor lets another operation see a stale arena.
    async fn finish(
        &self,
        guard: RootGuard,
        root_id: &str,
        plan: WritePlan,
        publish: Publish,
        events: Vec<DomainEvent>,
    ) -> Result<(), OperationError> {
        tracing::debug!("Committing {} writes for root '{}'", plan.len(), root_id);
        let store = self.repository.store().clone();
        let timeout = self.config.store_timeout();
        let index = self.index.clone();
        let event_tx = self.event_tx.clone();
        let root_id = root_id.to_string();

        let task = tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = write_plan::execute(store, timeout, plan).await {
                tracing::warn!("Commit for root '{}' failed: {}", root_id, err);
                // Force a reload; compensation may not have restored everything
                index.evict_root(&root_id).await;
                return Err(err);
            }
            match publish {
                Publish::Install { arena, touched } => {
                    index.install(arena, &touched).await;
                }
                Publish::EvictRoot => index.evict_root(&root_id).await,
            }
            send_events(&event_tx, events);
            Ok(())
        });

        task.await
            .unwrap_or_else(|err| Err(StoreError::operation_failed("commit", err.to_string())))
            .map_err(OperationError::from)
    }

    async fn load(&self, root_id: &str) -> Result<Arc<Hierarchy>, OperationError> {
        self.index
            .load(root_id)
            .await
            .map_err(|err| self.log_fatal(OperationError::from_service(root_id, err)))
    }

    /// Overwrite arena content for `ids` with the persisted content
    async fn refresh_content(
        &self,
        root_id: &str,
        arena: &mut Hierarchy,
        ids: &[&str],
    ) -> Result<(), OperationError> {
        for id in ids {
            let fresh = self
                .repository
                .get_node(id)
                .await
                .map_err(|err| OperationError::from_service(root_id, err))?
                .ok_or_else(|| OperationError::node_not_found(*id))?;
            if let Some(handle) = arena.handle(id) {
                *arena.node_mut(handle) = fresh;
            }
        }
        Ok(())
    }

    /// Document root of `node_id`
    ///
    /// Answered from the index when the document is loaded, otherwise by
    /// following parent edges in the store.
    async fn resolve_root(&self, node_id: &str) -> Result<String, OperationError> {
        if let Some(root_id) = self.index.root_of(node_id).await {
            return Ok(root_id);
        }

        let store = self.repository.store();
        let timeout = self.config.store_timeout();
        let mut current = node_id.to_string();
        for _ in 0..MAX_ANCESTOR_HOPS {
            match with_timeout("get_parent_edge", timeout, store.get_parent_edge(&current)).await? {
                Some(edge) => current = edge.parent_id,
                None => {
                    let root = self
                        .repository
                        .get_node(&current)
                        .await
                        .map_err(|err| OperationError::from_service(&current, err))?;
                    return match root {
                        Some(_) => Ok(current),
                        None => Err(OperationError::node_not_found(node_id)),
                    };
                }
            }
        }
        Err(self.log_fatal(OperationError::corruption(
            current,
            format!("parent chain above '{}' does not terminate", node_id),
        )))
    }

    fn log_fatal(&self, err: OperationError) -> OperationError {
        if err.is_fatal() {
            tracing::error!("{}", err);
        }
        err
    }
}

fn locate(arena: &Hierarchy, node_id: &str) -> Result<NodeHandle, OperationError> {
    arena
        .handle(node_id)
        .ok_or_else(|| OperationError::node_not_found(node_id))
}

enum Publish {
    /// Install the committed arena, evicting caches under `touched`
    Install {
        arena: Hierarchy,
        touched: Vec<String>,
    },
    /// The document no longer exists
    EvictRoot,
}

fn send_events(event_tx: &broadcast::Sender<DomainEvent>, events: Vec<DomainEvent>) {
    for event in events {
        tracing::trace!("Emitting {} for '{}'", event.event_type(), event.node_id());
        // No subscribers is fine
        let _ = event_tx.send(event);
    }
}
