//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use tp_core::{Error, Result};

/// V1: the two append-only audit tables.
const V1_INITIAL: &str = r#"
CREATE TABLE download_logs (
    id            TEXT PRIMARY KEY,
    url           TEXT NOT NULL,
    file_name     TEXT NOT NULL,
    downloaded_at TEXT NOT NULL,
    country       TEXT,
    region        TEXT
);

CREATE TABLE error_logs (
    id                 TEXT PRIMARY KEY,
    url                TEXT NOT NULL,
    error_message      TEXT NOT NULL,
    detail             TEXT NOT NULL DEFAULT '',
    error_type         TEXT NOT NULL,
    error_occurred_at  TEXT NOT NULL,
    country            TEXT,
    region             TEXT
);

CREATE INDEX idx_download_logs_downloaded_at ON download_logs(downloaded_at);
CREATE INDEX idx_error_logs_occurred_at ON error_logs(error_occurred_at);
CREATE INDEX idx_error_logs_type ON error_logs(error_type);
"#;

/// V2: record the client IP on both tables.
const V2_IP_ADDRESS: &str = r#"
ALTER TABLE download_logs ADD COLUMN ip_address TEXT;
ALTER TABLE error_logs ADD COLUMN ip_address TEXT;
"#;

/// Ordered list of all migrations.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_IP_ADDRESS)];

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
