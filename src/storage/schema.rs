//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Campus-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track extraction runs
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    source_key TEXT NOT NULL,
    kind TEXT NOT NULL,
    code TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    pages_visited INTEGER NOT NULL DEFAULT 0,
    pages_successful INTEGER NOT NULL DEFAULT 0,
    jobs_submitted INTEGER NOT NULL DEFAULT 0,
    records_found INTEGER NOT NULL DEFAULT 0,
    duplicates_dropped INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_runs_source ON runs(source_key);

-- Events, unique on normalized (name, date, location)
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    location TEXT NOT NULL,
    source_url TEXT NOT NULL,
    name_key TEXT NOT NULL,
    date_key TEXT NOT NULL,
    location_key TEXT NOT NULL,
    run_id TEXT NOT NULL REFERENCES runs(id),
    UNIQUE(name_key, date_key, location_key)
);

-- Courses, unique on normalized course name
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    prereqs TEXT NOT NULL,
    credits INTEGER,
    source_url TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE,
    run_id TEXT NOT NULL REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_courses_code ON courses(code);

-- Faculty, unique on normalized (name, website)
CREATE TABLE IF NOT EXISTS faculty (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    website TEXT NOT NULL,
    research_interests TEXT NOT NULL,
    source_url TEXT NOT NULL,
    name_key TEXT NOT NULL,
    website_key TEXT NOT NULL,
    run_id TEXT NOT NULL REFERENCES runs(id),
    UNIQUE(name_key, website_key)
);

CREATE INDEX IF NOT EXISTS idx_faculty_code ON faculty(code);

-- Failed extraction jobs, per run
CREATE TABLE IF NOT EXISTS extraction_failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(id),
    source_url TEXT NOT NULL,
    fragment INTEGER NOT NULL,
    kind TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_run ON extraction_failures(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
