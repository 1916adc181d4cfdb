//! Hierarchy Arena
//!
//! A document reconstructed from its flat node and edge lists. Nodes live in a
//! dense `Vec` of slots addressed by [`NodeHandle`]; parent and child links are
//! handles, never references, so the arena can be cloned, mutated and
//! re-validated without any shared mutable state.
//!
//! # Chain Reconstruction
//!
//! Edges store only a `before_sibling_id` pointer. For each parent,
//! [`build_tree`] finds the single child with no predecessor (the head), then
//! follows the inverse of the pointer until the chain is exhausted:
//!
//! ```text
//! edges:  (P, A, -)  (P, B, A)  (P, C, B)
//! head:   A
//! walk:   A -> B -> C          (3 of 3 children: ok)
//! ```
//!
//! More than one head, a pointer to a non-sibling, two siblings claiming the
//! same predecessor, or a walk that visits fewer children than there are edges
//! all fail with `BrokenChain`.

use crate::models::{Edge, Node, Tree, TreeNode, ValidationError};
use crate::services::error::ServiceError;
use std::collections::{HashMap, HashSet};

/// Stable index of a node slot within one [`Hierarchy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    removed: bool,
}

impl Slot {
    fn new(node: Node) -> Self {
        Self {
            node,
            parent: None,
            children: Vec::new(),
            removed: false,
        }
    }
}

/// Arena-backed ordered tree of one document
#[derive(Debug, Clone)]
pub struct Hierarchy {
    root: NodeHandle,
    slots: Vec<Slot>,
    handles: HashMap<String, NodeHandle>,
}

/// Reconstruct the ordered tree rooted at `root_id` from flat nodes and edges.
///
/// # Errors
///
/// - `RootNotFound` if `root_id` is not among `nodes`
/// - `BrokenChain` for edges to unknown nodes, a node with two parent edges,
///   an edge into the root, or any malformed sibling chain
/// - `Orphaned` for a node unreachable from the root (this also catches
///   cycles in the parent relation)
pub fn build_tree(root_id: &str, nodes: Vec<Node>, edges: &[Edge]) -> Result<Hierarchy, ServiceError> {
    let mut slots: Vec<Slot> = Vec::with_capacity(nodes.len());
    let mut handles: HashMap<String, NodeHandle> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if handles.contains_key(&node.id) {
            continue;
        }
        handles.insert(node.id.clone(), NodeHandle(slots.len() as u32));
        slots.push(Slot::new(node));
    }

    let root = *handles
        .get(root_id)
        .ok_or_else(|| ServiceError::root_not_found(root_id))?;

    let mut by_parent: HashMap<NodeHandle, Vec<&Edge>> = HashMap::new();
    for edge in edges {
        let lookup = |id: &str| {
            handles.get(id).copied().ok_or_else(|| {
                ServiceError::broken_chain(
                    edge.parent_id.as_str(),
                    format!("edge references unknown node '{}'", id),
                )
            })
        };
        let parent = lookup(&edge.parent_id)?;
        let child = lookup(&edge.child_id)?;

        if child == root {
            return Err(ServiceError::broken_chain(
                edge.parent_id.as_str(),
                format!("root '{}' cannot have a parent edge", root_id),
            ));
        }
        if slots[child.index()].parent.is_some() {
            return Err(ServiceError::broken_chain(
                edge.parent_id.as_str(),
                format!("node '{}' has more than one parent edge", edge.child_id),
            ));
        }
        slots[child.index()].parent = Some(parent);
        by_parent.entry(parent).or_default().push(edge);
    }

    for (parent, chain) in by_parent {
        let parent_id = slots[parent.index()].node.id.clone();
        let order = reconstruct_chain(&parent_id, &chain)?;
        slots[parent.index()].children = order.iter().map(|id| handles[*id]).collect();
    }

    let hierarchy = Hierarchy {
        root,
        slots,
        handles,
    };
    hierarchy.check_reachable()?;
    Ok(hierarchy)
}

/// Order one parent's children by walking the inverse `before_sibling_id` pointer
fn reconstruct_chain<'a>(parent_id: &str, edges: &[&'a Edge]) -> Result<Vec<&'a str>, ServiceError> {
    let members: HashSet<&str> = edges.iter().map(|e| e.child_id.as_str()).collect();
    let mut head: Option<&str> = None;
    let mut successor: HashMap<&str, &str> = HashMap::with_capacity(edges.len());

    for edge in edges {
        let child = edge.child_id.as_str();
        match edge.before_sibling_id.as_deref() {
            None => {
                if head.replace(child).is_some() {
                    return Err(ServiceError::broken_chain(
                        parent_id,
                        "more than one chain head",
                    ));
                }
            }
            Some(before) => {
                if !members.contains(before) {
                    return Err(ServiceError::broken_chain(
                        parent_id,
                        format!("'{}' points to '{}' which is not a sibling", child, before),
                    ));
                }
                if successor.insert(before, child).is_some() {
                    return Err(ServiceError::broken_chain(
                        parent_id,
                        format!("two siblings follow '{}'", before),
                    ));
                }
            }
        }
    }

    let head = head.ok_or_else(|| ServiceError::broken_chain(parent_id, "no chain head"))?;
    let mut order = Vec::with_capacity(edges.len());
    let mut current = Some(head);
    while let Some(id) = current {
        if order.len() == edges.len() {
            break;
        }
        order.push(id);
        current = successor.get(id).copied();
    }

    if order.len() != edges.len() {
        return Err(ServiceError::broken_chain(
            parent_id,
            format!("reconstructed {} of {} children", order.len(), edges.len()),
        ));
    }
    Ok(order)
}

impl Hierarchy {
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn root_id(&self) -> &str {
        &self.slots[self.root.index()].node.id
    }

    pub fn handle(&self, id: &str) -> Option<NodeHandle> {
        self.handles.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn node(&self, handle: NodeHandle) -> &Node {
        &self.slots[handle.index()].node
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> &mut Node {
        &mut self.slots[handle.index()].node
    }

    pub fn id(&self, handle: NodeHandle) -> &str {
        &self.slots[handle.index()].node.id
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.slots[handle.index()].parent
    }

    pub fn children(&self, handle: NodeHandle) -> &[NodeHandle] {
        &self.slots[handle.index()].children
    }

    pub fn child_ids(&self, handle: NodeHandle) -> Vec<String> {
        self.children(handle)
            .iter()
            .map(|c| self.id(*c).to_string())
            .collect()
    }

    /// Position of `handle` within its parent's chain
    pub fn position(&self, handle: NodeHandle) -> Option<usize> {
        let parent = self.parent(handle)?;
        self.children(parent).iter().position(|c| *c == handle)
    }

    pub fn preceding_sibling(&self, handle: NodeHandle) -> Option<NodeHandle> {
        let parent = self.parent(handle)?;
        let pos = self.position(handle)?;
        pos.checked_sub(1).map(|p| self.children(parent)[p])
    }

    /// Siblings after `handle`, in chain order
    pub fn following_siblings(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        match (self.parent(handle), self.position(handle)) {
            (Some(parent), Some(pos)) => self.children(parent)[pos + 1..].to_vec(),
            _ => Vec::new(),
        }
    }

    /// Distance from the root (root = 0)
    pub fn depth(&self, handle: NodeHandle) -> usize {
        let mut depth = 0;
        let mut current = self.parent(handle);
        while let Some(parent) = current {
            depth += 1;
            if depth > self.slots.len() {
                break;
            }
            current = self.parent(parent);
        }
        depth
    }

    /// Whether `ancestor` is `node` or lies on its parent path
    pub fn is_ancestor_or_self(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = Some(node);
        let mut steps = 0;
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.slots.len() {
                return false;
            }
            current = self.parent(h);
        }
        false
    }

    /// `handle` and all its descendants, pre-order
    pub fn subtree(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            out.push(h);
            stack.extend(self.children(h).iter().rev().copied());
        }
        out
    }

    /// Add a detached node to the arena
    pub fn insert(&mut self, node: Node) -> Result<NodeHandle, ValidationError> {
        if self.handles.contains_key(&node.id) {
            return Err(ValidationError::DuplicateId { id: node.id });
        }
        let handle = NodeHandle(self.slots.len() as u32);
        self.handles.insert(node.id.clone(), handle);
        self.slots.push(Slot::new(node));
        Ok(handle)
    }

    /// Link `child` under `parent` at chain position `index` (clamped to the tail)
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle, index: usize) {
        let siblings = &mut self.slots[parent.index()].children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.slots[child.index()].parent = Some(parent);
    }

    /// Link `child` as the last child of `parent`
    pub fn append(&mut self, child: NodeHandle, parent: NodeHandle) {
        let tail = self.children(parent).len();
        self.attach(child, parent, tail);
    }

    /// Unlink `child` from its parent's chain, closing the gap.
    ///
    /// Returns the former parent and position.
    pub fn detach(&mut self, child: NodeHandle) -> Option<(NodeHandle, usize)> {
        let parent = self.slots[child.index()].parent.take()?;
        let siblings = &mut self.slots[parent.index()].children;
        let pos = siblings.iter().position(|c| *c == child)?;
        siblings.remove(pos);
        Some((parent, pos))
    }

    /// Detach and drop a node from the arena, returning its record.
    ///
    /// Its children are left in place; callers move or remove them first.
    pub fn remove(&mut self, handle: NodeHandle) -> Node {
        self.detach(handle);
        let slot = &mut self.slots[handle.index()];
        slot.removed = true;
        self.handles.remove(&slot.node.id);
        slot.node.clone()
    }

    /// Live nodes in slot order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter(|s| !s.removed).map(|s| &s.node)
    }

    /// Edge set encoded by the current children lists
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::with_capacity(self.len().saturating_sub(1));
        for slot in self.slots.iter().filter(|s| !s.removed) {
            let mut before: Option<&str> = None;
            for child in &slot.children {
                let child_id = self.id(*child);
                edges.push(Edge::new(
                    slot.node.id.clone(),
                    child_id.to_string(),
                    before.map(str::to_string),
                ));
                before = Some(child_id);
            }
        }
        edges
    }

    /// Re-run the full structural check against the current state
    pub fn validate(&self) -> Result<(), ServiceError> {
        let nodes: Vec<Node> = self.nodes().cloned().collect();
        build_tree(self.root_id(), nodes, &self.edges()).map(|_| ())
    }

    /// Nested ordered view for the editor layer
    pub fn to_tree(&self) -> Tree {
        // Children follow their parent in pre-order, so the reverse order
        // builds every child before the node that owns it
        let mut built: Vec<Option<TreeNode>> = (0..self.slots.len()).map(|_| None).collect();
        for handle in self.subtree(self.root).into_iter().rev() {
            let children = self
                .children(handle)
                .iter()
                .filter_map(|child| built[child.index()].take())
                .collect();
            built[handle.index()] = Some(TreeNode {
                node: self.node(handle).clone(),
                children,
            });
        }
        let root = built[self.root.index()]
            .take()
            .unwrap_or_else(|| TreeNode::new(self.node(self.root).clone()));
        Tree { root }
    }

    fn check_reachable(&self) -> Result<(), ServiceError> {
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![self.root];
        while let Some(h) = stack.pop() {
            if std::mem::replace(&mut visited[h.index()], true) {
                continue;
            }
            stack.extend(self.children(h).iter().copied());
        }

        match self
            .slots
            .iter()
            .enumerate()
            .find(|(i, slot)| !slot.removed && !visited[*i])
        {
            Some((_, slot)) => Err(ServiceError::Orphaned {
                node_id: slot.node.id.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;

    fn node(id: &str) -> Node {
        Node::new_with_id(id.to_string(), NodeKind::Text, id.to_string(), Default::default())
    }

    fn edge(parent: &str, child: &str, before: Option<&str>) -> Edge {
        Edge::new(parent.to_string(), child.to_string(), before.map(str::to_string))
    }

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| node(id)).collect()
    }

    #[test]
    fn test_chain_order_independent_of_edge_order() {
        let edges = vec![
            edge("r", "c", Some("b")),
            edge("r", "a", None),
            edge("r", "b", Some("a")),
        ];
        let tree = build_tree("r", nodes(&["r", "a", "b", "c"]), &edges).unwrap();
        assert_eq!(tree.child_ids(tree.root()), vec!["a", "b", "c"]);
        assert_eq!(tree.to_tree().outline(), "a, b, c");
    }

    #[test]
    fn test_deep_document_builds_without_recursion() {
        const DEPTH: usize = 100_000;
        let ids: Vec<String> = (0..=DEPTH).map(|i| format!("n{}", i)).collect();
        let nodes = ids.iter().map(|id| node(id)).collect();
        let edges: Vec<Edge> = ids
            .windows(2)
            .map(|pair| edge(&pair[0], &pair[1], None))
            .collect();

        let arena = build_tree("n0", nodes, &edges).unwrap();
        let deepest = arena.handle(&ids[DEPTH]).unwrap();
        assert_eq!(arena.depth(deepest), DEPTH);

        let tree = arena.to_tree();
        assert_eq!(tree.node_count(), DEPTH + 1);
        assert!(tree.find(&ids[DEPTH]).is_some());
        assert!(tree.outline().ends_with(&format!("n{}{}", DEPTH, "}".repeat(DEPTH - 1))));
    }

    #[test]
    fn test_two_heads_rejected() {
        let edges = vec![edge("r", "a", None), edge("r", "b", None)];
        let err = build_tree("r", nodes(&["r", "a", "b"]), &edges).unwrap_err();
        assert_eq!(err, ServiceError::broken_chain("r", "more than one chain head"));
    }

    #[test]
    fn test_dangling_pointer_rejected() {
        let edges = vec![edge("r", "a", None), edge("r", "b", Some("ghost"))];
        let err = build_tree("r", nodes(&["r", "a", "b"]), &edges).unwrap_err();
        assert!(matches!(err, ServiceError::BrokenChain { .. }));
    }

    #[test]
    fn test_cycle_detected_by_count() {
        // a is head; b and c point at each other and are never reached
        let edges = vec![
            edge("r", "a", None),
            edge("r", "b", Some("c")),
            edge("r", "c", Some("b")),
        ];
        let err = build_tree("r", nodes(&["r", "a", "b", "c"]), &edges).unwrap_err();
        assert_eq!(
            err,
            ServiceError::broken_chain("r", "reconstructed 1 of 3 children")
        );
    }

    #[test]
    fn test_fork_rejected() {
        let edges = vec![
            edge("r", "a", None),
            edge("r", "b", Some("a")),
            edge("r", "c", Some("a")),
        ];
        let err = build_tree("r", nodes(&["r", "a", "b", "c"]), &edges).unwrap_err();
        assert_eq!(err, ServiceError::broken_chain("r", "two siblings follow 'a'"));
    }

    #[test]
    fn test_second_parent_edge_rejected() {
        let edges = vec![
            edge("r", "a", None),
            edge("r", "b", Some("a")),
            edge("a", "b", None),
        ];
        let err = build_tree("r", nodes(&["r", "a", "b"]), &edges).unwrap_err();
        assert!(matches!(err, ServiceError::BrokenChain { .. }));
    }

    #[test]
    fn test_orphan_detected() {
        let edges = vec![edge("r", "a", None)];
        let err = build_tree("r", nodes(&["r", "a", "lost"]), &edges).unwrap_err();
        assert_eq!(
            err,
            ServiceError::Orphaned {
                node_id: "lost".to_string()
            }
        );
    }

    #[test]
    fn test_parent_cycle_detected_as_orphans() {
        let edges = vec![edge("x", "y", None), edge("y", "x", None)];
        let err = build_tree("r", nodes(&["r", "x", "y"]), &edges).unwrap_err();
        assert!(matches!(err, ServiceError::Orphaned { .. }));
    }

    #[test]
    fn test_missing_root() {
        let err = build_tree("r", nodes(&["a"]), &[]).unwrap_err();
        assert_eq!(err, ServiceError::root_not_found("r"));
    }

    #[test]
    fn test_depth_and_siblings() {
        let edges = vec![
            edge("r", "a", None),
            edge("r", "b", Some("a")),
            edge("b", "c", None),
        ];
        let tree = build_tree("r", nodes(&["r", "a", "b", "c"]), &edges).unwrap();
        let b = tree.handle("b").unwrap();
        let c = tree.handle("c").unwrap();

        assert_eq!(tree.depth(tree.root()), 0);
        assert_eq!(tree.depth(c), 2);
        assert_eq!(tree.preceding_sibling(b), tree.handle("a"));
        assert!(tree.following_siblings(tree.handle("a").unwrap()).contains(&b));
        assert!(tree.is_ancestor_or_self(b, c));
        assert!(!tree.is_ancestor_or_self(c, b));
    }

    #[test]
    fn test_mutation_round_trips_through_edges() {
        let edges = vec![
            edge("r", "a", None),
            edge("r", "b", Some("a")),
            edge("r", "c", Some("b")),
        ];
        let mut tree = build_tree("r", nodes(&["r", "a", "b", "c"]), &edges).unwrap();
        let a = tree.handle("a").unwrap();
        let b = tree.handle("b").unwrap();

        // Move b under a; c must now follow a directly
        tree.detach(b);
        tree.append(b, a);
        tree.validate().unwrap();

        let edges = tree.edges();
        assert!(edges.contains(&edge("r", "c", Some("a"))));
        assert!(edges.contains(&edge("a", "b", None)));

        let rebuilt = build_tree("r", tree.nodes().cloned().collect(), &edges).unwrap();
        assert_eq!(rebuilt.to_tree().outline(), "a{b}, c");
    }

    #[test]
    fn test_removed_parent_orphans_children() {
        let edges = vec![edge("r", "a", None), edge("a", "b", None)];
        let mut tree = build_tree("r", nodes(&["r", "a", "b"]), &edges).unwrap();
        let a = tree.handle("a").unwrap();
        tree.remove(a);

        assert!(!tree.contains("a"));
        assert!(matches!(
            tree.validate(),
            Err(ServiceError::Orphaned { .. })
        ));
    }
}
