//! Core persistence and UI state for map annotations.
//! This crate is the single source of truth for map node invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::map_node::{
    CoordinateField, MapNode, MapNodeId, MapNodePatch, MapNodeValidationError, NewMapNode,
};
pub use repo::map_node_repo::{
    MapNodeListQuery, MapNodeRepository, NodeCursor, NodeFilter, NodeOrder, NumericRange,
    QueryHorizon, RepoError, RepoResult, SqliteMapNodeRepository,
};
pub use service::async_store::{AsyncMapNodeStore, StoreError, StoreResult};
pub use service::map_node_service::MapNodeService;
pub use state::selection::{
    SelectionChange, SelectionField, SelectionSnapshot, SelectionStore, Subscription,
};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
