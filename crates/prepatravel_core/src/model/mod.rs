//! Domain model for map annotations.
//!
//! # Responsibility
//! - Define canonical data structures used by persistence and state layers.
//!
//! # Invariants
//! - Every persisted map node is identified by a storage-assigned `MapNodeId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod map_node;
