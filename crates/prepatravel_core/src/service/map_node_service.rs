//! Map node use-case service.
//!
//! # Responsibility
//! - Provide stable CRUD entry points for UI-facing callers.
//! - Delegate persistence to repository implementations.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.

use crate::model::map_node::{MapNode, MapNodeId, MapNodePatch, NewMapNode};
use crate::repo::map_node_repo::{
    MapNodeListQuery, MapNodeRepository, NodeCursor, NodeFilter, RepoResult,
};

/// Use-case service wrapper for map node operations.
pub struct MapNodeService<R: MapNodeRepository> {
    repo: R,
}

impl<R: MapNodeRepository> MapNodeService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Creates a node and returns its assigned id.
    pub fn create_node(&self, node: &NewMapNode) -> RepoResult<MapNodeId> {
        self.repo.create_node(node)
    }

    /// Drops a pin at `lat`/`lng` with empty description.
    pub fn drop_pin(&self, name: impl Into<String>, lat: f64, lng: f64) -> RepoResult<MapNodeId> {
        self.repo
            .create_node(&NewMapNode::new(name, lat, lng, String::new()))
    }

    pub fn get_node(&self, id: MapNodeId) -> RepoResult<Option<MapNode>> {
        self.repo.get_node(id)
    }

    /// Returns `NotFound` instead of `None` for a missing id.
    pub fn require_node(&self, id: MapNodeId) -> RepoResult<MapNode> {
        self.repo.require_node(id)
    }

    pub fn update_node(&self, id: MapNodeId, patch: &MapNodePatch) -> RepoResult<MapNode> {
        self.repo.update_node(id, patch)
    }

    pub fn rename_node(&self, id: MapNodeId, name: impl Into<String>) -> RepoResult<MapNode> {
        self.repo
            .update_node(id, &MapNodePatch::default().name(name))
    }

    pub fn move_node(&self, id: MapNodeId, lat: f64, lng: f64) -> RepoResult<MapNode> {
        self.repo
            .update_node(id, &MapNodePatch::default().position(lat, lng))
    }

    pub fn delete_node(&self, id: MapNodeId) -> RepoResult<()> {
        self.repo.delete_node(id)
    }

    /// Starts a lazy query; iterate or `restart()` the returned cursor.
    pub fn query_nodes(&self, filter: NodeFilter) -> NodeCursor<'_, R> {
        NodeCursor::new(&self.repo, filter)
    }

    pub fn list_nodes(&self, query: &MapNodeListQuery) -> RepoResult<Vec<MapNode>> {
        self.repo.list_nodes(query)
    }

    pub fn count_nodes(&self) -> RepoResult<u64> {
        self.repo.count_nodes()
    }
}
