//! Asynchronous map node store.
//!
//! # Responsibility
//! - Expose map node CRUD as `async` operations for UI event loops.
//! - Run SQLite work on the blocking pool so callers suspend without
//!   stalling other tasks.
//!
//! # Invariants
//! - All access to the connection is serialized by one mutex, so writes to
//!   the same record are applied one after another (last write wins).
//! - Schema readiness is verified once, at construction.
//! - Failures surface as `StoreError`; nothing here panics on storage errors.

use crate::clock::{Clock, SystemClock};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::map_node::{MapNode, MapNodeId, MapNodePatch, NewMapNode};
use crate::repo::map_node_repo::{
    ensure_ready, MapNodeListQuery, MapNodeRepository, NodeFilter, QueryHorizon, RepoError,
    RepoResult, SqliteMapNodeRepository,
};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the asynchronous store.
#[derive(Debug)]
pub enum StoreError {
    /// Storage cannot be opened or is no longer usable.
    StorageUnavailable(String),
    Repo(RepoError),
    /// The blocking task panicked or was cancelled.
    TaskFailed(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_not_found())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StorageUnavailable(message) => write!(f, "storage unavailable: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::TaskFailed(message) => write!(f, "storage task failed: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::StorageUnavailable(_) | Self::TaskFailed(_) => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::StorageUnavailable(value.to_string())
    }
}

type SharedClock = Arc<dyn Clock>;

/// Cloneable handle to a connection shared by async callers.
#[derive(Clone)]
pub struct AsyncMapNodeStore {
    conn: Arc<Mutex<Connection>>,
    clock: SharedClock,
}

impl AsyncMapNodeStore {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection) -> StoreResult<Self> {
        Self::with_clock(conn, Arc::new(SystemClock))
    }

    pub fn with_clock(conn: Connection, clock: SharedClock) -> StoreResult<Self> {
        ensure_ready(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Opens the database file on the blocking pool.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let conn = tokio::task::spawn_blocking(move || open_db(path))
            .await
            .map_err(|err| StoreError::TaskFailed(err.to_string()))??;
        Self::new(conn)
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = tokio::task::spawn_blocking(open_db_in_memory)
            .await
            .map_err(|err| StoreError::TaskFailed(err.to_string()))??;
        Self::new(conn)
    }

    pub async fn create_node(&self, node: NewMapNode) -> StoreResult<MapNodeId> {
        self.run(move |repo| repo.create_node(&node)).await
    }

    pub async fn get_node(&self, id: MapNodeId) -> StoreResult<Option<MapNode>> {
        self.run(move |repo| repo.get_node(id)).await
    }

    pub async fn require_node(&self, id: MapNodeId) -> StoreResult<MapNode> {
        self.run(move |repo| repo.require_node(id)).await
    }

    pub async fn update_node(&self, id: MapNodeId, patch: MapNodePatch) -> StoreResult<MapNode> {
        self.run(move |repo| repo.update_node(id, &patch)).await
    }

    pub async fn delete_node(&self, id: MapNodeId) -> StoreResult<()> {
        self.run(move |repo| repo.delete_node(id)).await
    }

    /// Runs `filter` to completion and returns every match.
    ///
    /// A cursor cannot outlive the connection lock, so results are collected
    /// on the blocking pool. Use `query_page` to stream large result sets.
    pub async fn query_nodes(&self, filter: NodeFilter) -> StoreResult<Vec<MapNode>> {
        self.run(move |repo| repo.query_nodes(filter).collect())
            .await
    }

    /// Pins the end of a paged run over `filter`; `None` means no matches.
    pub async fn query_horizon(&self, filter: NodeFilter) -> StoreResult<Option<QueryHorizon>> {
        self.run(move |repo| repo.query_horizon(&filter)).await
    }

    /// Returns one keyset page; pass the last row of the previous page as
    /// `after` to continue, and the same `horizon` for every page of a run.
    pub async fn query_page(
        &self,
        filter: NodeFilter,
        after: Option<MapNode>,
        horizon: Option<QueryHorizon>,
        limit: u32,
    ) -> StoreResult<Vec<MapNode>> {
        self.run(move |repo| repo.query_page(&filter, after.as_ref(), horizon.as_ref(), limit))
            .await
    }

    pub async fn list_nodes(&self, query: MapNodeListQuery) -> StoreResult<Vec<MapNode>> {
        self.run(move |repo| repo.list_nodes(&query)).await
    }

    pub async fn count_nodes(&self) -> StoreResult<u64> {
        self.run(|repo| repo.count_nodes()).await
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteMapNodeRepository<'_, SharedClock>) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let clock = Arc::clone(&self.clock);

        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| {
                StoreError::StorageUnavailable("connection lock poisoned".to_string())
            })?;
            let repo = SqliteMapNodeRepository::assume_ready(&guard, clock);
            op(&repo).map_err(StoreError::from)
        })
        .await
        .map_err(|err| StoreError::TaskFailed(err.to_string()))?
    }
}
