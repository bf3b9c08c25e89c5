//! CSV record sink
//!
//! Writes one file per record kind under a per-code directory, e.g.
//! `output/csci/courses.csv` or `output/all/events.csv`. Each run rewrites
//! its files; list fields are joined with ", ".

use crate::extract::{Record, RecordKind};
use crate::output::aggregate::AggregateResult;
use crate::output::traits::{RecordSink, RunMeta, SinkResult};
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvSink {
    directory: PathBuf,
}

impl CsvSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// File the records of `kind` for `code` are written to
    pub fn path_for(&self, code: &str, kind: RecordKind) -> PathBuf {
        self.directory
            .join(code.trim().to_lowercase())
            .join(format!("{}.csv", kind))
    }

    fn header(kind: RecordKind) -> &'static [&'static str] {
        match kind {
            RecordKind::Events => &["name", "date", "location", "source_url"],
            RecordKind::Courses => &["name", "description", "prereqs", "credits", "source_url"],
            RecordKind::Faculty => &["name", "website", "research_interests", "source_url"],
        }
    }

    fn row(record: &Record) -> Vec<String> {
        match record {
            Record::Event(e) => vec![
                e.name.clone(),
                e.date.clone(),
                e.location.clone(),
                e.source_url.clone(),
            ],
            Record::Course(c) => vec![
                c.name.clone(),
                c.description.clone(),
                c.prereqs.clone(),
                c.credits.map(|n| n.to_string()).unwrap_or_default(),
                c.source_url.clone(),
            ],
            Record::Faculty(f) => vec![
                f.name.clone(),
                f.website.clone(),
                f.research_interests.join(", "),
                f.source_url.clone(),
            ],
        }
    }

    fn write_kind(&self, path: &Path, kind: RecordKind, result: &AggregateResult) -> SinkResult<usize> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(Self::header(kind))?;

        let mut written = 0;
        for record in result.records_of(kind) {
            writer.write_record(Self::row(record))?;
            written += 1;
        }
        writer.flush()?;

        tracing::info!("Wrote {} {} to {}", written, kind, path.display());
        Ok(written)
    }
}

impl RecordSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write(&mut self, run: &RunMeta, result: &AggregateResult) -> SinkResult<usize> {
        if result.is_empty() {
            tracing::warn!("No {} records to write for {}", run.kind, run.source_key);
        }

        // The run's own kind is rewritten even when empty
        let mut kinds = result.kinds();
        if !kinds.contains(&run.kind) {
            kinds.push(run.kind);
        }

        let mut total = 0;
        for kind in kinds {
            let path = self.path_for(&run.code, kind);
            total += self.write_kind(&path, kind, result)?;
        }
        Ok(total)
    }
}
