//! Database access layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Metadata Store reads
//! - Read-only query execution
//! - Type mappings from PostgreSQL rows to JSON

pub mod executor;
pub mod metadata;
pub mod pool;
pub mod types;

pub use executor::QueryExecutor;
pub use metadata::{MetadataSnapshot, MetadataStore};
pub use pool::connect;
