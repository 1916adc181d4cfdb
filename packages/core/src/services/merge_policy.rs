//! Merge Policy
//!
//! Decides whether a node may be the destination of `merge_with_previous`.
//!
//! Two independent checks must both pass:
//!
//! - **Capability table**: per-kind [`NodeCapabilities`], defaulting to
//!   mergeable for a kind without an entry
//! - **Structured registry**: kinds whose content follows an external syntax
//!   (code fences, quotes, list numbering, dates, schemas) are never merge
//!   targets, even when their capability entry says otherwise

use crate::models::{Node, NodeKind};
use std::collections::{HashMap, HashSet};

/// Per-kind structural capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCapabilities {
    /// Another node's content may be appended to this one
    pub allow_merge_into: bool,
}

impl Default for NodeCapabilities {
    fn default() -> Self {
        Self {
            allow_merge_into: true,
        }
    }
}

const STRUCTURED_KINDS: [NodeKind; 5] = [
    NodeKind::CodeBlock,
    NodeKind::QuoteBlock,
    NodeKind::OrderedList,
    NodeKind::Date,
    NodeKind::Schema,
];

/// Capability table plus structured-kind registry
#[derive(Debug, Clone)]
pub struct MergePolicy {
    capabilities: HashMap<NodeKind, NodeCapabilities>,
    structured: HashSet<NodeKind>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl MergePolicy {
    /// Default table: structured kinds refuse merges, everything else accepts
    pub fn new() -> Self {
        let structured: HashSet<NodeKind> = STRUCTURED_KINDS.into_iter().collect();
        let capabilities = NodeKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    NodeCapabilities {
                        allow_merge_into: !structured.contains(&kind),
                    },
                )
            })
            .collect();

        Self {
            capabilities,
            structured,
        }
    }

    /// Policy with an empty capability table (every kind defaults to mergeable)
    pub fn registry_only() -> Self {
        Self {
            capabilities: HashMap::new(),
            structured: STRUCTURED_KINDS.into_iter().collect(),
        }
    }

    /// Override the capability entry for `kind`
    ///
    /// The structured registry is unaffected.
    pub fn with_capability(mut self, kind: NodeKind, capabilities: NodeCapabilities) -> Self {
        self.capabilities.insert(kind, capabilities);
        self
    }

    pub fn capabilities(&self, kind: NodeKind) -> NodeCapabilities {
        self.capabilities.get(&kind).copied().unwrap_or_default()
    }

    /// Whether `target` may receive merged content
    pub fn can_merge_into(&self, target: &Node) -> bool {
        self.capabilities(target.node_type).allow_merge_into
            && !self.is_structured_type(target.node_type)
    }

    pub fn is_structured_type(&self, kind: NodeKind) -> bool {
        self.structured.contains(&kind)
    }
}
