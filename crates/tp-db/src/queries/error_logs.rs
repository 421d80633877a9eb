//! Error log operations.

use chrono::Utc;
use rusqlite::Connection;
use tp_core::{Error, ErrorKind, ErrorLogEntry, ErrorLogId, Result};

use crate::models::ErrorLog;

const COLS: &str = "id, url, error_message, detail, error_type, error_occurred_at,
    country, region, ip_address";

/// Append a failed or aborted download to the log.
pub fn insert_error_log(conn: &Connection, entry: &ErrorLogEntry) -> Result<ErrorLog> {
    let id = ErrorLogId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO error_logs (id, url, error_message, detail, error_type,
            error_occurred_at, country, region, ip_address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            id.to_string(),
            &entry.url,
            &entry.error_message,
            &entry.detail,
            entry.error_type.as_str(),
            &now,
            &entry.country,
            &entry.region,
            &entry.ip_address,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(ErrorLog {
        id,
        url: entry.url.clone(),
        error_message: entry.error_message.clone(),
        detail: entry.detail.clone(),
        error_type: entry.error_type,
        error_occurred_at: now,
        country: entry.country.clone(),
        region: entry.region.clone(),
        ip_address: entry.ip_address.clone(),
    })
}

/// List error rows, newest first, optionally restricted to one kind.
pub fn list_error_logs(
    conn: &Connection,
    kind: Option<ErrorKind>,
    offset: i64,
    limit: i64,
) -> Result<Vec<ErrorLog>> {
    let (q, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = if let Some(k) = kind {
        (
            format!(
                "SELECT {COLS} FROM error_logs WHERE error_type = ?1
                 ORDER BY error_occurred_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
            ),
            vec![
                Box::new(k.as_str().to_string()),
                Box::new(limit),
                Box::new(offset),
            ],
        )
    } else {
        (
            format!(
                "SELECT {COLS} FROM error_logs
                 ORDER BY error_occurred_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
            ),
            vec![Box::new(limit), Box::new(offset)],
        )
    };

    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), ErrorLog::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

pub fn count_error_logs(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM error_logs", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    fn entry(kind: ErrorKind) -> ErrorLogEntry {
        ErrorLogEntry {
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            error_message: "yt-dlp exited with code 1".into(),
            detail: "ERROR: video unavailable".into(),
            error_type: kind,
            country: None,
            region: None,
            ip_address: Some("198.51.100.2".into()),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        insert_error_log(&conn, &entry(ErrorKind::ProcessError)).unwrap();

        let rows = list_error_logs(&conn, None, 0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_type, ErrorKind::ProcessError);
        assert!(rows[0].detail.contains("video unavailable"));
        assert_eq!(rows[0].country, None);
    }

    #[test]
    fn list_with_filter() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        insert_error_log(&conn, &entry(ErrorKind::Timeout)).unwrap();
        insert_error_log(&conn, &entry(ErrorKind::Timeout)).unwrap();
        insert_error_log(&conn, &entry(ErrorKind::MonitorError)).unwrap();

        let timeouts = list_error_logs(&conn, Some(ErrorKind::Timeout), 0, 10).unwrap();
        assert_eq!(timeouts.len(), 2);
        let monitor = list_error_logs(&conn, Some(ErrorKind::MonitorError), 0, 10).unwrap();
        assert_eq!(monitor.len(), 1);
        assert_eq!(count_error_logs(&conn).unwrap(), 3);
    }
}
