//! Map node repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and indexed lookup over the `map_nodes` table.
//! - Own timestamp assignment (`created_at`, `updated_at`).
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate input before any SQL mutation.
//! - `updated_at` strictly increases on every successful update.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Deletes are permanent; a second delete of the same id is `NotFound`.

use crate::clock::{Clock, SystemClock};
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::map_node::{MapNode, MapNodeId, MapNodePatch, MapNodeValidationError, NewMapNode};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAP_NODE_SELECT_SQL: &str = "SELECT
    id,
    name,
    lat,
    lng,
    description,
    created_at,
    updated_at
FROM map_nodes";

const REQUIRED_COLUMNS: [&str; 7] = [
    "id",
    "name",
    "lat",
    "lng",
    "description",
    "created_at",
    "updated_at",
];

/// Default number of rows fetched per cursor page.
pub const DEFAULT_PAGE_SIZE: u32 = 64;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for map node persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Input rejected before any write was attempted.
    Validation(MapNodeValidationError),
    /// Storage layer failure (open, I/O, quota, constraint).
    Db(DbError),
    NotFound(MapNodeId),
    /// Persisted row violates model invariants.
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns whether the failure originates in storage rather than input.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Db(_)
                | Self::UninitializedConnection { .. }
                | Self::MissingRequiredTable(_)
                | Self::MissingRequiredColumn { .. }
        )
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "map node not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted map node data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MapNodeValidationError> for RepoError {
    fn from(value: MapNodeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Inclusive numeric bounds. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericRange<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: Copy> NumericRange<T> {
    pub fn exact(value: T) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn between(min: T, max: T) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: T) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: T) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }
}

/// Indexed-field filter for lazy queries.
///
/// Text filters match exactly and yield insertion order. Numeric and time
/// filters match inclusive ranges and yield rows ordered by that field.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeFilter {
    All,
    Name(String),
    Description(String),
    Lat(NumericRange<f64>),
    Lng(NumericRange<f64>),
    CreatedAt(NumericRange<i64>),
    UpdatedAt(NumericRange<i64>),
}

impl NodeFilter {
    /// Column providing natural ordering, or `None` for insertion order.
    fn sort_column(&self) -> Option<&'static str> {
        match self {
            Self::All | Self::Name(_) | Self::Description(_) => None,
            Self::Lat(_) => Some("lat"),
            Self::Lng(_) => Some("lng"),
            Self::CreatedAt(_) => Some("created_at"),
            Self::UpdatedAt(_) => Some("updated_at"),
        }
    }

    fn sort_value(&self, node: &MapNode) -> Option<Value> {
        match self {
            Self::All | Self::Name(_) | Self::Description(_) => None,
            Self::Lat(_) => Some(Value::Real(node.lat)),
            Self::Lng(_) => Some(Value::Real(node.lng)),
            Self::CreatedAt(_) => Some(Value::Integer(node.created_at)),
            Self::UpdatedAt(_) => Some(Value::Integer(node.updated_at)),
        }
    }
}

/// Ordering for full-table listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeOrder {
    /// `id` ascending.
    #[default]
    Insertion,
    /// `updated_at` descending, ties by `id` ascending.
    RecentlyUpdated,
}

/// Query options for listing map nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapNodeListQuery {
    pub order: NodeOrder,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Upper edge of one cursor run, captured before its first page.
///
/// Pages never yield rows past `last` in filter order, nor rows with an id
/// above `max_id`, so inserts and sort-key bumps made during iteration cannot
/// extend the run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHorizon {
    pub max_id: MapNodeId,
    /// Last matching row in filter order when the run started.
    pub last: MapNode,
}

/// Repository interface for map node CRUD and lookup.
pub trait MapNodeRepository {
    /// Inserts a node and returns its freshly assigned id.
    fn create_node(&self, node: &NewMapNode) -> RepoResult<MapNodeId>;
    /// Returns `Ok(None)` when no node has `id`.
    fn get_node(&self, id: MapNodeId) -> RepoResult<Option<MapNode>>;
    /// Merges `patch`, refreshes `updated_at` and returns the stored record.
    fn update_node(&self, id: MapNodeId, patch: &MapNodePatch) -> RepoResult<MapNode>;
    fn delete_node(&self, id: MapNodeId) -> RepoResult<()>;
    /// Returns the current horizon for `filter`, or `None` when nothing
    /// matches.
    fn query_horizon(&self, filter: &NodeFilter) -> RepoResult<Option<QueryHorizon>>;
    /// Returns up to `limit` rows matching `filter` that sort after `after`
    /// and not past `horizon`.
    fn query_page(
        &self,
        filter: &NodeFilter,
        after: Option<&MapNode>,
        horizon: Option<&QueryHorizon>,
        limit: u32,
    ) -> RepoResult<Vec<MapNode>>;
    fn list_nodes(&self, query: &MapNodeListQuery) -> RepoResult<Vec<MapNode>>;
    fn count_nodes(&self) -> RepoResult<u64>;

    /// Like `get_node`, but absence is an error.
    fn require_node(&self, id: MapNodeId) -> RepoResult<MapNode> {
        self.get_node(id)?.ok_or(RepoError::NotFound(id))
    }

    /// Starts a lazy query over current state.
    fn query_nodes(&self, filter: NodeFilter) -> NodeCursor<'_, Self>
    where
        Self: Sized,
    {
        NodeCursor::new(self, filter)
    }
}

/// Lazy, finite, restartable sequence of query results.
///
/// Rows are fetched page by page with keyset pagination. The first read pins
/// a `QueryHorizon`; later pages see deletes and in-place edits but never run
/// past it.
pub struct NodeCursor<'r, R: ?Sized> {
    repo: &'r R,
    filter: NodeFilter,
    page_size: u32,
    buffer: VecDeque<MapNode>,
    last: Option<MapNode>,
    horizon: Option<QueryHorizon>,
    started: bool,
    exhausted: bool,
}

impl<'r, R: MapNodeRepository + ?Sized> NodeCursor<'r, R> {
    pub fn new(repo: &'r R, filter: NodeFilter) -> Self {
        Self {
            repo,
            filter,
            page_size: DEFAULT_PAGE_SIZE,
            buffer: VecDeque::new(),
            last: None,
            horizon: None,
            started: false,
            exhausted: false,
        }
    }

    /// Sets rows fetched per page. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn filter(&self) -> &NodeFilter {
        &self.filter
    }

    /// Rewinds to the first row; the next read re-executes the query.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.last = None;
        self.horizon = None;
        self.started = false;
        self.exhausted = false;
    }

    fn fill(&mut self) -> RepoResult<()> {
        if !self.started {
            self.started = true;
            self.horizon = self.repo.query_horizon(&self.filter)?;
            if self.horizon.is_none() {
                self.exhausted = true;
                return Ok(());
            }
        }

        let page = self.repo.query_page(
            &self.filter,
            self.last.as_ref(),
            self.horizon.as_ref(),
            self.page_size,
        )?;
        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<R: MapNodeRepository + ?Sized> Iterator for NodeCursor<'_, R> {
    type Item = RepoResult<MapNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }

        let node = self.buffer.pop_front()?;
        self.last = Some(node.clone());
        Some(Ok(node))
    }
}

/// SQLite-backed map node repository.
pub struct SqliteMapNodeRepository<'conn, C: Clock = SystemClock> {
    conn: &'conn Connection,
    clock: C,
}

impl<'conn> SqliteMapNodeRepository<'conn, SystemClock> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        Self::with_clock(conn, SystemClock)
    }
}

impl<'conn, C: Clock> SqliteMapNodeRepository<'conn, C> {
    /// Constructs a repository that stamps records using `clock`.
    pub fn with_clock(conn: &'conn Connection, clock: C) -> RepoResult<Self> {
        ensure_ready(conn)?;
        Ok(Self { conn, clock })
    }

    /// Skips readiness checks for connections already verified by the caller.
    pub(crate) fn assume_ready(conn: &'conn Connection, clock: C) -> Self {
        Self { conn, clock }
    }
}

impl<C: Clock> MapNodeRepository for SqliteMapNodeRepository<'_, C> {
    fn create_node(&self, node: &NewMapNode) -> RepoResult<MapNodeId> {
        node.validate()?;

        let now = self.clock.now_ms();
        self.conn.execute(
            "INSERT INTO map_nodes (
                name,
                lat,
                lng,
                description,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
            params![
                node.name.as_str(),
                node.lat,
                node.lng,
                node.description.as_str(),
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        info!("event=map_node_create module=repo status=ok id={id}");
        Ok(id)
    }

    fn get_node(&self, id: MapNodeId) -> RepoResult<Option<MapNode>> {
        get_node_on(self.conn, id)
    }

    fn update_node(&self, id: MapNodeId, patch: &MapNodePatch) -> RepoResult<MapNode> {
        let tx = self.conn.unchecked_transaction()?;

        let mut node = get_node_on(&tx, id)?.ok_or(RepoError::NotFound(id))?;
        node.apply_patch(patch);
        node.to_new().validate()?;
        // Never let the stored value stand still or move backwards.
        node.updated_at = self
            .clock
            .now_ms()
            .max(node.updated_at.saturating_add(1));

        tx.execute(
            "UPDATE map_nodes
             SET
                name = ?1,
                lat = ?2,
                lng = ?3,
                description = ?4,
                updated_at = ?5
             WHERE id = ?6;",
            params![
                node.name.as_str(),
                node.lat,
                node.lng,
                node.description.as_str(),
                node.updated_at,
                id,
            ],
        )?;
        tx.commit()?;

        info!(
            "event=map_node_update module=repo status=ok id={} updated_at={}",
            id, node.updated_at
        );
        Ok(node)
    }

    fn delete_node(&self, id: MapNodeId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM map_nodes WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        info!("event=map_node_delete module=repo status=ok id={id}");
        Ok(())
    }

    fn query_horizon(&self, filter: &NodeFilter) -> RepoResult<Option<QueryHorizon>> {
        let mut sql = format!("{MAP_NODE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        push_filter(&mut sql, &mut bind_values, filter);
        match filter.sort_column() {
            Some(column) => sql.push_str(&format!(" ORDER BY {column} DESC, id DESC LIMIT 1")),
            None => sql.push_str(" ORDER BY id DESC LIMIT 1"),
        }

        let max_id: MapNodeId = self.conn.query_row(
            "SELECT COALESCE(MAX(id), 0) FROM map_nodes;",
            [],
            |row| row.get(0),
        )?;
        let last = collect_nodes(self.conn, &sql, bind_values)?.pop();

        Ok(last.map(|last| QueryHorizon { max_id, last }))
    }

    fn query_page(
        &self,
        filter: &NodeFilter,
        after: Option<&MapNode>,
        horizon: Option<&QueryHorizon>,
        limit: u32,
    ) -> RepoResult<Vec<MapNode>> {
        let mut sql = format!("{MAP_NODE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        push_filter(&mut sql, &mut bind_values, filter);

        let sort_column = filter.sort_column();
        if let Some(last) = after {
            match (sort_column, filter.sort_value(last)) {
                (Some(column), Some(value)) => {
                    sql.push_str(&format!(
                        " AND ({column} > ? OR ({column} = ? AND id > ?))"
                    ));
                    bind_values.push(value.clone());
                    bind_values.push(value);
                    bind_values.push(Value::Integer(last.id));
                }
                _ => {
                    sql.push_str(" AND id > ?");
                    bind_values.push(Value::Integer(last.id));
                }
            }
        }

        if let Some(horizon) = horizon {
            sql.push_str(" AND id <= ?");
            bind_values.push(Value::Integer(horizon.max_id));
            match (sort_column, filter.sort_value(&horizon.last)) {
                (Some(column), Some(value)) => {
                    sql.push_str(&format!(
                        " AND ({column} < ? OR ({column} = ? AND id <= ?))"
                    ));
                    bind_values.push(value.clone());
                    bind_values.push(value);
                    bind_values.push(Value::Integer(horizon.last.id));
                }
                _ => {
                    sql.push_str(" AND id <= ?");
                    bind_values.push(Value::Integer(horizon.last.id));
                }
            }
        }

        match sort_column {
            Some(column) => sql.push_str(&format!(" ORDER BY {column} ASC, id ASC")),
            None => sql.push_str(" ORDER BY id ASC"),
        }
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));

        collect_nodes(self.conn, &sql, bind_values)
    }

    fn list_nodes(&self, query: &MapNodeListQuery) -> RepoResult<Vec<MapNode>> {
        let mut sql = MAP_NODE_SELECT_SQL.to_string();
        let mut bind_values: Vec<Value> = Vec::new();

        match query.order {
            NodeOrder::Insertion => sql.push_str(" ORDER BY id ASC"),
            NodeOrder::RecentlyUpdated => sql.push_str(" ORDER BY updated_at DESC, id ASC"),
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        collect_nodes(self.conn, &sql, bind_values)
    }

    fn count_nodes(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM map_nodes;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }
}

fn push_filter(sql: &mut String, bind_values: &mut Vec<Value>, filter: &NodeFilter) {
    match filter {
        NodeFilter::All => {}
        NodeFilter::Name(name) => {
            sql.push_str(" AND name = ?");
            bind_values.push(Value::Text(name.clone()));
        }
        NodeFilter::Description(description) => {
            sql.push_str(" AND description = ?");
            bind_values.push(Value::Text(description.clone()));
        }
        NodeFilter::Lat(range) => push_range(sql, bind_values, "lat", range, Value::Real),
        NodeFilter::Lng(range) => push_range(sql, bind_values, "lng", range, Value::Real),
        NodeFilter::CreatedAt(range) => {
            push_range(sql, bind_values, "created_at", range, Value::Integer)
        }
        NodeFilter::UpdatedAt(range) => {
            push_range(sql, bind_values, "updated_at", range, Value::Integer)
        }
    }
}

fn push_range<T: Copy>(
    sql: &mut String,
    bind_values: &mut Vec<Value>,
    column: &'static str,
    range: &NumericRange<T>,
    to_value: fn(T) -> Value,
) {
    if let Some(min) = range.min {
        sql.push_str(&format!(" AND {column} >= ?"));
        bind_values.push(to_value(min));
    }
    if let Some(max) = range.max {
        sql.push_str(&format!(" AND {column} <= ?"));
        bind_values.push(to_value(max));
    }
}

fn get_node_on(conn: &Connection, id: MapNodeId) -> RepoResult<Option<MapNode>> {
    let node = conn
        .query_row(
            &format!("{MAP_NODE_SELECT_SQL} WHERE id = ?1;"),
            [id],
            read_raw_row,
        )
        .optional()?;

    node.map(check_persisted).transpose()
}

fn collect_nodes(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<MapNode>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut nodes = Vec::new();

    while let Some(row) = rows.next()? {
        nodes.push(check_persisted(read_raw_row(row)?)?);
    }

    Ok(nodes)
}

fn read_raw_row(row: &Row<'_>) -> rusqlite::Result<MapNode> {
    Ok(MapNode {
        id: row.get("id")?,
        name: row.get("name")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn check_persisted(node: MapNode) -> RepoResult<MapNode> {
    node.validate().map_err(|err| {
        RepoError::InvalidData(format!("map_nodes row {}: {err}", node.id))
    })?;
    Ok(node)
}

/// Verifies `conn` carries the current `map_nodes` schema.
pub fn ensure_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "map_nodes")? {
        return Err(RepoError::MissingRequiredTable("map_nodes"));
    }

    for column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "map_nodes", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "map_nodes",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM pragma_table_info(?1)
            WHERE name = ?2
        );",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
