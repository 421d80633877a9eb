//! tp-core: shared types, IDs, errors, configuration, and audit records.
//!
//! This crate is the foundational dependency for all other tp-* crates.

pub mod audit;
pub mod config;
pub mod error;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use audit::*;
pub use error::{Error, Result};
pub use ids::*;
