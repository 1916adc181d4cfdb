//! Persistence Layer
//!
//! This module holds the seam between the hierarchy engine and durable storage:
//!
//! - `NodeStore` - async trait the engine consumes (bulk per-root reads,
//!   node/edge writes, transactions)
//! - `MemoryStore` - in-process implementation with staged transactions
//! - `DomainEvent` - change notifications emitted after commits
//! - `StoreError` - collaborator failures, including timeouts
//!
//! The concrete storage schema is the backend's concern; nothing here assumes
//! SQL, a graph database or a key-value engine.

mod error;
pub mod events;
mod memory_store;
mod node_store;

pub use error::StoreError;
pub use events::DomainEvent;
pub use memory_store::{FaultPoint, MemoryStore, MemoryStoreStats};
pub use node_store::{with_timeout, NodeStore, StoreOp, StoreResult, TxnId};
