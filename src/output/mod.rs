//! Output module for aggregating and persisting run results
//!
//! This module handles:
//! - Merging extraction outcomes into one deduplicated result
//! - Writing records through a pluggable sink (CSV files or SQLite)
//! - Generating markdown reports and printing run statistics

mod aggregate;
mod csv_sink;
mod markdown;
pub mod stats;
mod traits;

pub use aggregate::{aggregate, AggregateCounts, AggregateResult, FailureEntry, PageCounts};
pub use csv_sink::CsvSink;
pub use markdown::{format_markdown_report, report_path_for, write_markdown_report};
pub use stats::{print_statistics, RunStatistics};
pub use traits::{RecordSink, RunMeta, SinkError, SinkResult};

use crate::config::{OutputConfig, SinkKind};
use crate::storage::SqliteStorage;
use crate::HarvestError;
use std::path::Path;

/// Opens the sink selected by the output configuration
///
/// # Arguments
///
/// * `config` - The output section of the configuration
///
/// # Returns
///
/// * `Ok(Box<dyn RecordSink>)` - The CSV sink or an opened SQLite database
/// * `Err(HarvestError)` - The database could not be opened
pub fn open_sink(config: &OutputConfig) -> Result<Box<dyn RecordSink>, HarvestError> {
    match config.sink {
        SinkKind::Csv => Ok(Box::new(CsvSink::new(&config.directory))),
        SinkKind::Sqlite => {
            let path = Path::new(&config.database_path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(Box::new(SqliteStorage::new(path)?))
        }
    }
}
