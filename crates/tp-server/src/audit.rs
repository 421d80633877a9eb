//! Audit sink: where download and error log rows end up.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tp_core::{DownloadLogEntry, ErrorLogEntry};
use tp_db::pool::DbPool;

/// Append-only destination for audit rows.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_download(&self, entry: &DownloadLogEntry) -> tp_core::Result<()>;
    async fn log_error(&self, entry: &ErrorLogEntry) -> tp_core::Result<()>;
}

/// SQLite-backed sink. Writes run on the blocking pool.
#[derive(Clone)]
pub struct SqliteAuditSink {
    db: DbPool,
}

impl SqliteAuditSink {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn log_download(&self, entry: &DownloadLogEntry) -> tp_core::Result<()> {
        let db = self.db.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || {
            let conn = tp_db::pool::get_conn(&db)?;
            tp_db::queries::download_logs::insert_download_log(&conn, &entry)?;
            Ok(())
        })
        .await
        .map_err(|e| tp_core::Error::Internal(format!("audit task failed: {e}")))?
    }

    async fn log_error(&self, entry: &ErrorLogEntry) -> tp_core::Result<()> {
        let db = self.db.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || {
            let conn = tp_db::pool::get_conn(&db)?;
            tp_db::queries::error_logs::insert_error_log(&conn, &entry)?;
            Ok(())
        })
        .await
        .map_err(|e| tp_core::Error::Internal(format!("audit task failed: {e}")))?
    }
}

/// In-memory sink that keeps every row, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    downloads: Arc<Mutex<Vec<DownloadLogEntry>>>,
    errors: Arc<Mutex<Vec<ErrorLogEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downloads(&self) -> Vec<DownloadLogEntry> {
        self.downloads.lock().clone()
    }

    pub fn errors(&self) -> Vec<ErrorLogEntry> {
        self.errors.lock().clone()
    }

    /// Total number of rows written to either log.
    pub fn len(&self) -> usize {
        self.downloads.lock().len() + self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_download(&self, entry: &DownloadLogEntry) -> tp_core::Result<()> {
        self.downloads.lock().push(entry.clone());
        Ok(())
    }

    async fn log_error(&self, entry: &ErrorLogEntry) -> tp_core::Result<()> {
        self.errors.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tp_core::ErrorKind;

    fn download() -> DownloadLogEntry {
        DownloadLogEntry {
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            file_name: "Song.mp3".into(),
            country: Some("unknown".into()),
            region: Some("unknown".into()),
            ip_address: Some("127.0.0.1".into()),
        }
    }

    #[tokio::test]
    async fn sqlite_sink_persists_rows() {
        let pool = tp_db::pool::init_memory_pool().unwrap();
        let sink = SqliteAuditSink::new(pool.clone());

        sink.log_download(&download()).await.unwrap();
        sink.log_error(&ErrorLogEntry {
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            error_message: "timed out".into(),
            detail: String::new(),
            error_type: ErrorKind::Timeout,
            country: None,
            region: None,
            ip_address: None,
        })
        .await
        .unwrap();

        let conn = pool.get().unwrap();
        assert_eq!(tp_db::queries::download_logs::count_download_logs(&conn).unwrap(), 1);
        let errors = tp_db::queries::error_logs::list_error_logs(&conn, None, 0, 10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn memory_sink_records() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.log_download(&download()).await.unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.downloads()[0].file_name, "Song.mp3");
    }
}
