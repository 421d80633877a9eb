//! SQLite pools for the audit log.
//!
//! Writers are short single-row inserts issued from `spawn_blocking`, so a
//! small pool with a generous busy timeout is enough to absorb bursts of
//! concurrent outcomes.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tp_core::{Error, Result};

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Connections per pool.
pub const POOL_SIZE: u32 = 4;

/// Milliseconds a writer waits on a locked database before failing.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Open (or create) the audit database at `path`.
///
/// Missing parent directories are created. Every connection runs in WAL
/// mode so readers such as `tunepipe logs` never block the server's writes.
pub fn open_pool(path: &Path) -> Result<DbPool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!(dir = %parent.display(), "Created database directory");
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))
    });
    migrated(manager, &path.display().to_string())
}

/// A private in-memory audit database.
///
/// Each call gets its own shared-cache name, so pools never see each
/// other's rows while connections within one pool do.
pub fn init_memory_pool() -> Result<DbPool> {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let name = format!("file:tp_audit_{}?mode=memory&cache=shared", NEXT.fetch_add(1, Ordering::Relaxed));
    migrated(SqliteConnectionManager::file(&name), &name)
}

fn migrated(manager: SqliteConnectionManager, label: &str) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to open {label}: {e}")))?;
    migrations::run_migrations(&*get_conn(&pool)?)?;
    tracing::debug!(db = label, "Audit schema up to date");
    Ok(pool)
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}
