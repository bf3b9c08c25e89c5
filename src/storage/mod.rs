//! Storage module for persisting extracted records
//!
//! This module handles the relational sink, including:
//! - SQLite database initialization and schema management
//! - Natural-key upserts of events, courses and faculty
//! - Run tracking with the config hash and counts of every run
//! - Per-run extraction failure records

mod schema;
mod sqlite;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteStorage;

use crate::HarvestError;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// A run as recorded in the `runs` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRun {
    pub id: String,
    pub source_key: String,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: String,
    pub pages_visited: u64,
    pub records_found: u64,
    pub failures: u64,
}
