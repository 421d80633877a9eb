//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use tp_core::{DownloadLogId, ErrorKind, ErrorLogId};
use uuid::Uuid;

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

fn parse_kind(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<ErrorKind> {
    let s: String = row.get(idx)?;
    s.parse::<ErrorKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

#[derive(Debug, Clone)]
pub struct DownloadLog {
    pub id: DownloadLogId,
    pub url: String,
    pub file_name: String,
    pub downloaded_at: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub ip_address: Option<String>,
}

impl DownloadLog {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            url: row.get(1)?,
            file_name: row.get(2)?,
            downloaded_at: row.get(3)?,
            country: row.get(4)?,
            region: row.get(5)?,
            ip_address: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ErrorLog {
    pub id: ErrorLogId,
    pub url: String,
    pub error_message: String,
    pub detail: String,
    pub error_type: ErrorKind,
    pub error_occurred_at: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub ip_address: Option<String>,
}

impl ErrorLog {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            url: row.get(1)?,
            error_message: row.get(2)?,
            detail: row.get(3)?,
            error_type: parse_kind(row, 4)?,
            error_occurred_at: row.get(5)?,
            country: row.get(6)?,
            region: row.get(7)?,
            ip_address: row.get(8)?,
        })
    }
}
