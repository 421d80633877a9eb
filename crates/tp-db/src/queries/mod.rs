//! Database query modules.

pub mod download_logs;
pub mod error_logs;
