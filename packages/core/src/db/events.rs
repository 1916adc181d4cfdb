//! Domain Events
//!
//! Change notifications emitted by the operation engine after a mutation
//! commits. They follow the observer pattern: reactive consumers (the editor
//! layer, sync forwarders) subscribe without coupling to the engine.
//!
//! # Event Flow
//!
//! 1. The engine commits a structural or content write
//! 2. One event per affected node is sent on a tokio broadcast channel
//! 3. Every subscriber receives the events asynchronously
//!
//! Events are never sent for an operation that rolled back.

use crate::models::Node;
use serde::Serialize;

/// Domain events emitted by the operation engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A new node was created (and attached under `parent_id`, if any)
    #[serde(rename_all = "camelCase")]
    NodeCreated {
        node: Node,
        parent_id: Option<String>,
    },

    /// A node's content changed
    NodeUpdated { node: Node },

    /// A node was deleted
    NodeDeleted { id: String },

    /// A node moved to a different parent
    #[serde(rename_all = "camelCase")]
    NodeReparented {
        node_id: String,
        old_parent_id: Option<String>,
        new_parent_id: Option<String>,
    },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NodeCreated { .. } => "node:created",
            DomainEvent::NodeUpdated { .. } => "node:updated",
            DomainEvent::NodeDeleted { .. } => "node:deleted",
            DomainEvent::NodeReparented { .. } => "node:reparented",
        }
    }

    /// ID of the node the event is about
    pub fn node_id(&self) -> &str {
        match self {
            DomainEvent::NodeCreated { node, .. } | DomainEvent::NodeUpdated { node } => &node.id,
            DomainEvent::NodeDeleted { id } => id,
            DomainEvent::NodeReparented { node_id, .. } => node_id,
        }
    }
}
