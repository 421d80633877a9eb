//! Download log operations.

use chrono::Utc;
use rusqlite::Connection;
use tp_core::{DownloadLogEntry, DownloadLogId, Error, Result};

use crate::models::DownloadLog;

const COLS: &str = "id, url, file_name, downloaded_at, country, region, ip_address";

/// Append a successful download to the log.
pub fn insert_download_log(conn: &Connection, entry: &DownloadLogEntry) -> Result<DownloadLog> {
    let id = DownloadLogId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO download_logs (id, url, file_name, downloaded_at, country, region, ip_address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.to_string(),
            &entry.url,
            &entry.file_name,
            &now,
            &entry.country,
            &entry.region,
            &entry.ip_address,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(DownloadLog {
        id,
        url: entry.url.clone(),
        file_name: entry.file_name.clone(),
        downloaded_at: now,
        country: entry.country.clone(),
        region: entry.region.clone(),
        ip_address: entry.ip_address.clone(),
    })
}

/// Most recent downloads first.
pub fn list_download_logs(conn: &Connection, offset: i64, limit: i64) -> Result<Vec<DownloadLog>> {
    let q = format!(
        "SELECT {COLS} FROM download_logs ORDER BY downloaded_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![limit, offset], DownloadLog::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

pub fn count_download_logs(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM download_logs", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))
}
