//! Pooled SQLite handles.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::error::StoreError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Per-connection settings applied when the pool opens a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Opens a pool over the database file at `db_path`, creating it if needed.
///
/// Every connection runs in WAL mode so the call bridges' writers do not
/// block the script lookups. Use a temporary file in tests: `:memory:`
/// would give each connection its own database.
///
/// # Errors
///
/// Returns `StoreError::Pool` if the pool cannot open its connections, for
/// example when the file is not writable or WAL mode cannot be enabled.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, StoreError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| configure(conn, settings));

    Ok(Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?)
}

fn configure(conn: &mut Connection, settings: DbRuntimeSettings) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    // In-memory databases cannot switch and report "memory".
    if mode.eq_ignore_ascii_case("wal") || mode.eq_ignore_ascii_case("memory") {
        Ok(())
    } else {
        Err(rusqlite::Error::InvalidParameterName(format!(
            "journal_mode stayed {mode}"
        )))
    }
}
