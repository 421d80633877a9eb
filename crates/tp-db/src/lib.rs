//! tp-db: persistence for the audit log.
//!
//! SQLite-backed storage with connection pooling, embedded migrations,
//! typed models, and query modules for the two append-only audit tables.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
