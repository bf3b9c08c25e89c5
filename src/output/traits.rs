//! Record sink trait and run metadata
//!
//! A sink persists the aggregate of one run. The pipeline does not depend
//! on which sink is used; the caller picks one from the output config.

use crate::extract::RecordKind;
use crate::output::aggregate::AggregateResult;
use crate::state::RunContext;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while writing records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Identity and timing of the run being written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMeta {
    pub run_id: String,
    pub source_key: String,
    pub kind: RecordKind,
    pub code: String,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunMeta {
    /// Metadata for a run finishing now
    pub fn from_context(ctx: &RunContext, kind: RecordKind, code: &str) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            source_key: ctx.source_key.clone(),
            kind,
            code: code.to_string(),
            config_hash: ctx.config_hash.clone(),
            started_at: ctx.started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Destination for extracted records
pub trait RecordSink {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Writes the run's records, returning how many were written
    fn write(&mut self, run: &RunMeta, result: &AggregateResult) -> SinkResult<usize>;
}
