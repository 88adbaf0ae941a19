//! Schema versions compiled into the binary.
//!
//! `_leadline_migrations` holds one row per applied version. Versions are
//! applied in ascending order, each in its own transaction together with its
//! bookkeeping row.

use std::collections::BTreeSet;

use rusqlite::{params, Connection};
use thiserror::Error;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA: &[Migration] = &[
    Migration {
        version: 1,
        name: "leads",
        sql: include_str!("migrations/001_leads.sql"),
    },
    Migration {
        version: 2,
        name: "interactions",
        sql: include_str!("migrations/002_interactions.sql"),
    },
];

const BOOKKEEPING: &str = "CREATE TABLE IF NOT EXISTS _leadline_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema version {version} ({name}) failed: {source}")]
    Apply {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },

    #[error("cannot read applied schema versions: {0}")]
    Bookkeeping(rusqlite::Error),
}

/// Brings the schema up to date and returns how many versions were applied.
///
/// Versions already recorded in `_leadline_migrations` are skipped, so this
/// is safe to call on every start-up.
///
/// # Errors
///
/// Returns `MigrationError::Bookkeeping` if the applied versions cannot be
/// read, or `MigrationError::Apply` if a version fails. A failed version is
/// rolled back and later versions are not attempted.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_pending(conn, SCHEMA)
}

fn applied_versions(conn: &Connection) -> Result<BTreeSet<u32>, MigrationError> {
    conn.execute_batch(BOOKKEEPING)
        .map_err(MigrationError::Bookkeeping)?;
    let mut stmt = conn
        .prepare("SELECT version FROM _leadline_migrations")
        .map_err(MigrationError::Bookkeeping)?;
    let versions = stmt
        .query_map([], |row| row.get(0))
        .and_then(|rows| rows.collect::<Result<BTreeSet<u32>, _>>())
        .map_err(MigrationError::Bookkeeping)?;
    Ok(versions)
}

fn apply_pending(conn: &Connection, schema: &[Migration]) -> Result<usize, MigrationError> {
    let done = applied_versions(conn)?;
    let pending: Vec<&Migration> = schema
        .iter()
        .filter(|m| !done.contains(&m.version))
        .collect();

    for migration in &pending {
        apply(conn, migration).map_err(|source| MigrationError::Apply {
            version: migration.version,
            name: migration.name,
            source,
        })?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "schema version applied"
        );
    }

    Ok(pending.len())
}

fn apply(conn: &Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _leadline_migrations (version, name) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )?;
    tx.commit()
}
