//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//! - Let callers supply their own registry so upgrade paths can be
//!   rehearsed against real data before they ship.
//!
//! # Invariants
//! - `version` values must remain strictly increasing and non-zero.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A failed step rolls back every step of the same run.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction};

/// One unit of schema change.
#[derive(Clone, Copy)]
pub enum MigrationStep {
    /// Plain SQL batch.
    Sql(&'static str),
    /// Data-carrying upgrade that needs Rust logic (backfills, rewrites).
    Rust(fn(&Transaction<'_>) -> rusqlite::Result<()>),
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sql(_) => f.write_str("MigrationStep::Sql"),
            Self::Rust(_) => f.write_str("MigrationStep::Rust"),
        }
    }
}

/// Registry entry pairing a schema version with the step that reaches it.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub step: MigrationStep,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    step: MigrationStep::Sql(include_str!("0001_map_nodes.sql")),
}];

/// Returns the built-in migration registry.
pub fn registry() -> &'static [Migration] {
    MIGRATIONS
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    latest_version_of(MIGRATIONS)
}

/// Returns the highest version in `migrations`, or 0 when empty.
pub fn latest_version_of(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies all pending built-in migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_migrations_with(conn, MIGRATIONS)
}

/// Applies pending migrations from an explicit registry.
///
/// # Errors
/// - `InvalidMigrationRegistry` when versions are zero or not strictly
///   increasing. Nothing is applied in that case.
/// - `UnsupportedSchemaVersion` when the database is newer than `migrations`.
/// - `Sqlite` when any step fails; the whole run is rolled back.
pub fn apply_migrations_with(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    validate_registry(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version_of(migrations);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        match migration.step {
            MigrationStep::Sql(sql) => tx.execute_batch(sql)?,
            MigrationStep::Rust(apply) => apply(&tx)?,
        }
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(())
}

/// Reads the schema version mirrored in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn validate_registry(migrations: &[Migration]) -> DbResult<()> {
    let mut previous = 0;
    for migration in migrations {
        if migration.version <= previous {
            return Err(DbError::InvalidMigrationRegistry {
                version: migration.version,
                previous,
            });
        }
        previous = migration.version;
    }
    Ok(())
}
