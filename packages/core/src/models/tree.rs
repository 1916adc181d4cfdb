//! Nested Tree Output
//!
//! The ordered, nested view of one document returned to the editor layer by
//! `get_all_nodes_for_root`. Built from the arena in a single pass; the root
//! node is included with its ordered children.
//!
//! Walks over the tree use explicit stacks, so document depth is bounded by
//! memory rather than the call stack.

use crate::models::Node;
use serde::{Deserialize, Serialize};

/// A node together with its ordered children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    fn count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    fn find(&self, id: &str) -> Option<&TreeNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.node.id == id {
                return Some(node);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }
}

enum Step<'a> {
    Node(&'a TreeNode),
    Text(&'static str),
}

fn push_siblings<'a>(nodes: &'a [TreeNode], stack: &mut Vec<Step<'a>>) {
    for (i, node) in nodes.iter().enumerate().rev() {
        stack.push(Step::Node(node));
        if i > 0 {
            stack.push(Step::Text(", "));
        }
    }
}

fn write_outline(nodes: &[TreeNode], out: &mut String) {
    let mut stack = Vec::new();
    push_siblings(nodes, &mut stack);
    while let Some(step) = stack.pop() {
        match step {
            Step::Text(text) => out.push_str(text),
            Step::Node(node) => {
                out.push_str(&node.node.content);
                if !node.children.is_empty() {
                    out.push('{');
                    stack.push(Step::Text("}"));
                    push_siblings(&node.children, &mut stack);
                }
            }
        }
    }
}

/// Complete ordered tree of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub root: TreeNode,
}

impl Tree {
    pub fn root_id(&self) -> &str {
        &self.root.node.id
    }

    /// Ordered children of the document root
    pub fn top_level(&self) -> &[TreeNode] {
        &self.root.children
    }

    /// Number of nodes in the tree, root included
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.root.find(id)
    }

    /// Compact content outline of the root's children, e.g. `A, B{C, D}`
    ///
    /// Handy in logs and assertions; the root's own content is omitted.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        write_outline(&self.root.children, &mut out);
        out
    }
}

impl Drop for Tree {
    // Unnest before dropping so a deep document does not recurse per level
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.root.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;

    fn leaf(content: &str) -> TreeNode {
        TreeNode::new(Node::new(NodeKind::Text, content.to_string()))
    }

    #[test]
    fn test_outline_renders_nesting() {
        let mut b = leaf("B");
        b.children.push(leaf("C"));
        let mut root = leaf("R");
        root.children.push(leaf("A"));
        root.children.push(b);

        let tree = Tree { root };
        assert_eq!(tree.outline(), "A, B{C}");
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.top_level().len(), 2);
    }

    #[test]
    fn test_outline_keeps_sibling_order_at_every_level() {
        let mut a = leaf("A");
        a.children.push(leaf("A1"));
        a.children.push(leaf("A2"));
        let mut b = leaf("B");
        let mut b1 = leaf("B1");
        b1.children.push(leaf("B11"));
        b.children.push(b1);
        let mut root = leaf("R");
        root.children.extend([a, b, leaf("C")]);

        let tree = Tree { root };
        assert_eq!(tree.outline(), "A{A1, A2}, B{B1{B11}}, C");
        assert_eq!(tree.node_count(), 8);
    }

    #[test]
    fn test_find_descends() {
        let mut a = leaf("A");
        let c = leaf("C");
        let c_id = c.node.id.clone();
        a.children.push(c);
        let mut root = leaf("R");
        root.children.push(a);

        let tree = Tree { root };
        assert_eq!(tree.find(&c_id).unwrap().node.content, "C");
        assert!(tree.find("missing").is_none());
    }
}
