//! Write Plans
//!
//! A structural operation never writes while it is deciding what to do. It
//! stages its mutation on a copy of the committed arena; the difference
//! between the two arenas becomes a [`WritePlan`]: the store writes to apply,
//! plus for each write the inverse that undoes it against the committed state.
//!
//! # Execution
//!
//! - **Transactional store**: begin, apply every write inside the
//!   transaction, commit; any failure rolls back
//! - **Store without transactions**: apply writes one by one; on failure the
//!   inverses of the applied prefix run in reverse order (compensation)
//!
//! Writes are never retried: reapplying a structural write after an unknown
//! outcome could apply it twice.

use crate::db::{with_timeout, NodeStore, StoreError, StoreOp, TxnId};
use crate::models::{Edge, Node};
use crate::services::Hierarchy;
use std::collections::HashMap;
use std::time::Duration;

type EdgeKey = (String, String);

fn key(edge: &Edge) -> EdgeKey {
    (edge.parent_id.clone(), edge.child_id.clone())
}

/// Ordered store writes and their inverses (`undo[i]` reverts `ops[i]`)
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct WritePlan {
    ops: Vec<StoreOp>,
    undo: Vec<StoreOp>,
}

impl WritePlan {
    /// Writes that turn `before` into `after` (`None`: delete the whole document)
    ///
    /// Order: node inserts and updates, edge deletes, edge upserts, node deletes.
    pub(crate) fn between(before: &Hierarchy, after: Option<&Hierarchy>) -> Self {
        let mut plan = Self::default();

        let before_nodes: HashMap<&str, &Node> =
            before.nodes().map(|n| (n.id.as_str(), n)).collect();
        let before_edges: HashMap<EdgeKey, Edge> =
            before.edges().into_iter().map(|e| (key(&e), e)).collect();
        let after_edges: Vec<Edge> = after.map(|a| a.edges()).unwrap_or_default();
        let after_keys: HashMap<EdgeKey, &Edge> =
            after_edges.iter().map(|e| (key(e), e)).collect();

        if let Some(after) = after {
            for node in after.nodes() {
                match before_nodes.get(node.id.as_str()) {
                    None => plan.push(
                        StoreOp::InsertNode(node.clone()),
                        StoreOp::DeleteNode(node.id.clone()),
                    ),
                    Some(old) if *old != node => plan.push(
                        StoreOp::UpsertNode(node.clone()),
                        StoreOp::UpsertNode((*old).clone()),
                    ),
                    Some(_) => {}
                }
            }
        }

        for edge in before.edges() {
            if !after_keys.contains_key(&key(&edge)) {
                plan.push(
                    StoreOp::DeleteEdge {
                        parent_id: edge.parent_id.clone(),
                        child_id: edge.child_id.clone(),
                    },
                    StoreOp::UpsertEdge(edge),
                );
            }
        }

        for edge in after_edges {
            match before_edges.get(&key(&edge)) {
                None => {
                    let inverse = StoreOp::DeleteEdge {
                        parent_id: edge.parent_id.clone(),
                        child_id: edge.child_id.clone(),
                    };
                    plan.push(StoreOp::UpsertEdge(edge), inverse);
                }
                Some(old) if *old != edge => {
                    plan.push(StoreOp::UpsertEdge(edge), StoreOp::UpsertEdge(old.clone()))
                }
                Some(_) => {}
            }
        }

        for node in before.nodes() {
            let kept = after.map(|a| a.contains(&node.id)).unwrap_or(false);
            if !kept {
                plan.push(
                    StoreOp::DeleteNode(node.id.clone()),
                    StoreOp::UpsertNode(node.clone()),
                );
            }
        }

        plan
    }

    /// The single write that creates a document root
    pub(crate) fn create_document(root: Node) -> Self {
        let mut plan = Self::default();
        let id = root.id.clone();
        plan.push(StoreOp::InsertNode(root), StoreOp::DeleteNode(id));
        plan
    }

    fn push(&mut self, op: StoreOp, undo: StoreOp) {
        self.ops.push(op);
        self.undo.push(undo);
    }

    #[cfg(test)]
    pub(crate) fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Apply `plan` atomically against `store`
pub(crate) async fn execute(
    store: std::sync::Arc<dyn NodeStore>,
    timeout: Duration,
    plan: WritePlan,
) -> Result<(), StoreError> {
    if plan.is_empty() {
        return Ok(());
    }
    if store.supports_transactions() {
        apply_in_transaction(&*store, timeout, plan.ops).await
    } else {
        apply_with_compensation(&*store, timeout, plan).await
    }
}

async fn apply_in_transaction(
    store: &dyn NodeStore,
    timeout: Duration,
    ops: Vec<StoreOp>,
) -> Result<(), StoreError> {
    let txn = with_timeout("begin", timeout, store.begin()).await?;
    let count = ops.len();

    for op in ops {
        let name = op.name();
        if let Err(err) = with_timeout(name, timeout, store.apply(Some(txn), op)).await {
            rollback(store, timeout, txn).await;
            return Err(err);
        }
    }

    if let Err(err) = with_timeout("commit", timeout, store.commit(txn)).await {
        rollback(store, timeout, txn).await;
        return Err(err);
    }

    tracing::debug!("Committed {} writes in {}", count, txn);
    Ok(())
}

async fn rollback(store: &dyn NodeStore, timeout: Duration, txn: TxnId) {
    match with_timeout("rollback", timeout, store.rollback(txn)).await {
        Ok(()) => tracing::debug!("Rolled back {}", txn),
        // Commit already consumed the transaction
        Err(StoreError::UnknownTransaction(_)) => {}
        Err(err) => tracing::error!("Rollback of {} failed: {}", txn, err),
    }
}

async fn apply_with_compensation(
    store: &dyn NodeStore,
    timeout: Duration,
    plan: WritePlan,
) -> Result<(), StoreError> {
    let WritePlan { ops, undo } = plan;

    for (applied, op) in ops.into_iter().enumerate() {
        let name = op.name();
        if let Err(err) = with_timeout(name, timeout, store.apply(None, op)).await {
            tracing::warn!(
                "Write '{}' failed after {} applied, compensating: {}",
                name,
                applied,
                err
            );
            for inverse in undo[..applied].iter().rev() {
                let inverse_name = inverse.name();
                if let Err(undo_err) =
                    with_timeout(inverse_name, timeout, store.apply(None, inverse.clone())).await
                {
                    tracing::error!(
                        "Compensating write '{}' failed: {}",
                        inverse_name,
                        undo_err
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}
