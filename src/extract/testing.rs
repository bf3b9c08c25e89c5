//! Instrumented extraction backend for tests
//!
//! `MockExtractor` turns every input line of the form `record: <name>` into
//! one record of the requested kind, so tests control output through page
//! content alone. Markers make individual jobs fail, hang or panic, and the
//! mock records every call together with the concurrency high-water mark.
//!
//! ```ignore
//! let mock = MockExtractor::new()
//!     .with_delay(Duration::from_millis(10))
//!     .fail_when_contains("Career Fair");
//! ```

use crate::extract::backend::Extractor;
use crate::extract::job::ExtractionError;
use crate::extract::schema::{CourseRecord, EventRecord, FacultyRecord, Record, RecordKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const RECORD_PREFIX: &str = "record:";

/// A recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub input: String,
    pub kind: RecordKind,
}

#[derive(Default)]
pub struct MockExtractor {
    delay: Duration,
    fail_markers: Vec<String>,
    hang_markers: Vec<String>,
    panic_markers: Vec<String>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Inputs containing `marker` return a backend error
    pub fn fail_when_contains(mut self, marker: impl Into<String>) -> Self {
        self.fail_markers.push(marker.into());
        self
    }

    /// Inputs containing `marker` never answer
    pub fn hang_when_contains(mut self, marker: impl Into<String>) -> Self {
        self.hang_markers.push(marker.into());
        self
    }

    /// Inputs containing `marker` panic inside the call
    pub fn panic_when_contains(mut self, marker: impl Into<String>) -> Self {
        self.panic_markers.push(marker.into());
        self
    }

    /// Most calls observed in flight at once
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Builds one record of `kind` named `name`
    pub fn record(kind: RecordKind, name: &str) -> Record {
        match kind {
            RecordKind::Events => Record::Event(EventRecord {
                name: name.to_string(),
                date: String::new(),
                location: String::new(),
                source_url: String::new(),
            }),
            RecordKind::Courses => Record::Course(CourseRecord {
                name: name.to_string(),
                description: String::new(),
                prereqs: String::new(),
                credits: None,
                source_url: String::new(),
            }),
            RecordKind::Faculty => Record::Faculty(FacultyRecord {
                name: name.to_string(),
                website: String::new(),
                research_interests: Vec::new(),
                source_url: String::new(),
            }),
        }
    }

    fn matches(markers: &[String], input: &str) -> bool {
        markers.iter().any(|m| input.contains(m.as_str()))
    }

    async fn respond(&self, input: &str, kind: RecordKind) -> Result<Vec<Record>, ExtractionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if Self::matches(&self.hang_markers, input) {
            std::future::pending::<()>().await;
        }
        if Self::matches(&self.panic_markers, input) {
            panic!("mock extractor panicked on request");
        }
        if Self::matches(&self.fail_markers, input) {
            return Err(ExtractionError::backend("mock backend failure"));
        }

        Ok(input
            .lines()
            .filter_map(|line| {
                let line = line.trim().trim_start_matches(['-', '*', ' ']);
                line.strip_prefix(RECORD_PREFIX)
            })
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Self::record(kind, name))
            .collect())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn invoke(&self, input: &str, kind: RecordKind) -> Result<Vec<Record>, ExtractionError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockCall {
                input: input.to_string(),
                kind,
            });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.respond(input, kind).await
    }

    fn name(&self) -> &str {
        "mock"
    }
}
