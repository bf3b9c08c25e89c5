//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordSink trait.
//! Records are upserted on their natural key columns, so writing the same
//! result twice leaves the tables unchanged.

use crate::extract::{Record, RecordKind};
use crate::output::{AggregateResult, RecordSink, RunMeta, SinkResult};
use crate::storage::schema::initialize_schema;
use crate::storage::StoredRun;
use crate::HarvestError;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Number of stored records of one kind
    pub fn count_records(&self, kind: RecordKind) -> SinkResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_for(kind));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of failures recorded for a run
    pub fn count_failures(&self, run_id: &str) -> SinkResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM extraction_failures WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_run(&self, run_id: &str) -> SinkResult<Option<StoredRun>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, source_key, config_hash, started_at, finished_at,
                 pages_visited, records_found, failures
                 FROM runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(StoredRun {
                        id: row.get(0)?,
                        source_key: row.get(1)?,
                        config_hash: row.get(2)?,
                        started_at: row.get(3)?,
                        finished_at: row.get(4)?,
                        pages_visited: row.get::<_, i64>(5)? as u64,
                        records_found: row.get::<_, i64>(6)? as u64,
                        failures: row.get::<_, i64>(7)? as u64,
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    /// Most recently started run of a source
    pub fn latest_run(&self, source_key: &str) -> SinkResult<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM runs WHERE source_key = ?1 ORDER BY started_at DESC LIMIT 1",
                params![source_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

fn table_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Events => "events",
        RecordKind::Courses => "courses",
        RecordKind::Faculty => "faculty",
    }
}

fn upsert_run(tx: &Transaction<'_>, run: &RunMeta, result: &AggregateResult) -> rusqlite::Result<()> {
    let counts = &result.counts;
    tx.execute(
        "INSERT INTO runs (id, source_key, kind, code, config_hash, started_at, finished_at,
         pages_visited, pages_successful, jobs_submitted, records_found, duplicates_dropped, failures)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            finished_at = excluded.finished_at,
            pages_visited = excluded.pages_visited,
            pages_successful = excluded.pages_successful,
            jobs_submitted = excluded.jobs_submitted,
            records_found = excluded.records_found,
            duplicates_dropped = excluded.duplicates_dropped,
            failures = excluded.failures",
        params![
            run.run_id,
            run.source_key,
            run.kind.as_str(),
            run.code,
            run.config_hash,
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
            counts.pages_visited as i64,
            counts.pages_successful as i64,
            counts.jobs_submitted as i64,
            counts.records_found as i64,
            counts.duplicates_dropped as i64,
            counts.failures as i64,
        ],
    )?;
    Ok(())
}

fn upsert_record(tx: &Transaction<'_>, run: &RunMeta, record: &Record) -> rusqlite::Result<()> {
    let key = record.natural_key();
    let part = |i: usize| key.parts.get(i).cloned().unwrap_or_default();

    match record {
        Record::Event(e) => tx.execute(
            "INSERT INTO events (name, date, location, source_url, name_key, date_key, location_key, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name_key, date_key, location_key) DO UPDATE SET
                name = excluded.name,
                date = excluded.date,
                location = excluded.location,
                source_url = excluded.source_url,
                run_id = excluded.run_id",
            params![e.name, e.date, e.location, e.source_url, part(0), part(1), part(2), run.run_id],
        )?,
        Record::Course(c) => tx.execute(
            "INSERT INTO courses (code, name, description, prereqs, credits, source_url, name_key, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name_key) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                description = excluded.description,
                prereqs = excluded.prereqs,
                credits = excluded.credits,
                source_url = excluded.source_url,
                run_id = excluded.run_id",
            params![
                run.code,
                c.name,
                c.description,
                c.prereqs,
                c.credits,
                c.source_url,
                part(0),
                run.run_id
            ],
        )?,
        Record::Faculty(f) => tx.execute(
            "INSERT INTO faculty (code, name, website, research_interests, source_url, name_key, website_key, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name_key, website_key) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                website = excluded.website,
                research_interests = excluded.research_interests,
                source_url = excluded.source_url,
                run_id = excluded.run_id",
            params![
                run.code,
                f.name,
                f.website,
                f.research_interests.join(", "),
                f.source_url,
                part(0),
                part(1),
                run.run_id
            ],
        )?,
    };
    Ok(())
}

impl RecordSink for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(&mut self, run: &RunMeta, result: &AggregateResult) -> SinkResult<usize> {
        let tx = self.conn.transaction()?;

        upsert_run(&tx, run, result)?;

        let mut written = 0;
        for record in result.records() {
            upsert_record(&tx, run, record)?;
            written += 1;
        }

        // Failures belong to the run; rewriting a run replaces them
        tx.execute(
            "DELETE FROM extraction_failures WHERE run_id = ?1",
            params![run.run_id],
        )?;
        for failure in &result.failures {
            tx.execute(
                "INSERT INTO extraction_failures (run_id, source_url, fragment, kind, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run.run_id,
                    failure.source_url,
                    failure.fragment as i64,
                    failure.kind.as_str(),
                    failure.message
                ],
            )?;
        }

        tx.commit()?;

        tracing::info!(
            "Stored {} record(s) and {} failure(s) for run {}",
            written,
            result.failures.len(),
            run.run_id
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CourseRecord, EventRecord, ExtractionError, ExtractionOutcome};
    use crate::output::{aggregate, PageCounts};
    use crate::state::RunContext;
    use std::time::Duration;
    use url::Url;

    fn meta(kind: RecordKind, code: &str) -> RunMeta {
        let key = format!("{}-{}", kind, code.to_lowercase());
        let ctx = RunContext::new(&key, "cafebabe", Duration::from_secs(10), 2);
        RunMeta::from_context(&ctx, kind, code)
    }

    fn course(name: &str, credits: Option<i32>) -> Record {
        Record::Course(CourseRecord {
            name: name.to_string(),
            description: "Intro".to_string(),
            prereqs: String::new(),
            credits,
            source_url: String::new(),
        })
    }

    fn course_result(records: Vec<Record>) -> AggregateResult {
        let outcome = ExtractionOutcome::Success {
            source_url: Url::parse("https://catalog.example.edu/csci").unwrap(),
            fragment: 0,
            records,
        };
        aggregate(
            PageCounts {
                visited: 1,
                successful: 1,
            },
            &[outcome],
        )
    }

    #[test]
    fn test_write_courses_and_run_row() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = meta(RecordKind::Courses, "CSCI");

        let written = storage
            .write(&run, &course_result(vec![course("CSCI 141", Some(4)), course("CSCI 145", None)]))
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(storage.count_records(RecordKind::Courses).unwrap(), 2);

        let stored = storage.get_run(&run.run_id).unwrap().unwrap();
        assert_eq!(stored.config_hash, "cafebabe");
        assert_eq!(stored.records_found, 2);
        assert_eq!(stored.pages_visited, 1);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = meta(RecordKind::Courses, "CSCI");
        let result = course_result(vec![course("CSCI 141", Some(4))]);

        storage.write(&run, &result).unwrap();
        storage.write(&run, &result).unwrap();

        assert_eq!(storage.count_records(RecordKind::Courses).unwrap(), 1);
    }

    #[test]
    fn test_upsert_across_runs_updates_row() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let first = meta(RecordKind::Courses, "CSCI");
        storage
            .write(&first, &course_result(vec![course("CSCI 141", Some(4))]))
            .unwrap();

        let second = RunMeta {
            run_id: format!("{}-again", first.run_id),
            ..first.clone()
        };
        storage
            .write(&second, &course_result(vec![course("csci  141", Some(5))]))
            .unwrap();

        assert_eq!(storage.count_records(RecordKind::Courses).unwrap(), 1);
        let credits: Option<i32> = storage
            .conn
            .query_row("SELECT credits FROM courses", [], |row| row.get(0))
            .unwrap();
        assert_eq!(credits, Some(5));
    }

    #[test]
    fn test_failures_are_stored() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run = meta(RecordKind::Events, "ALL");
        let page = Url::parse("https://events.example.edu/").unwrap();
        let outcomes = vec![
            ExtractionOutcome::Success {
                source_url: page.clone(),
                fragment: 1,
                records: vec![Record::Event(EventRecord {
                    name: "Jazz Night".to_string(),
                    date: "May 3".to_string(),
                    location: "PAC".to_string(),
                    source_url: String::new(),
                })],
            },
            ExtractionOutcome::Failure {
                source_url: page,
                fragment: 2,
                error: ExtractionError::malformed("not json"),
            },
        ];
        let result = aggregate(PageCounts::default(), &outcomes);

        storage.write(&run, &result).unwrap();
        storage.write(&run, &result).unwrap();

        assert_eq!(storage.count_records(RecordKind::Events).unwrap(), 1);
        assert_eq!(storage.count_failures(&run.run_id).unwrap(), 1);
        assert_eq!(
            storage.latest_run("events-all").unwrap(),
            Some(run.run_id.clone())
        );
    }

    #[test]
    fn test_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_run("nope").unwrap().is_none());
    }
}
