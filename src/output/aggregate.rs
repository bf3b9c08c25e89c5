//! Result aggregation
//!
//! Merges the outcomes of one run into a single deduplicated collection.
//! Records are keyed by their natural key; when two records share a key,
//! the one whose `(source_url, record)` sorts first is kept. The result is
//! therefore independent of outcome order, and aggregating the same outcome
//! set twice yields identical results.

use crate::extract::{ExtractionErrorKind, ExtractionOutcome, NaturalKey, Record, RecordKind};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Page counters gathered during traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub visited: usize,
    pub successful: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub pages_visited: usize,
    pub pages_successful: usize,
    /// Unique records after deduplication
    pub records_found: usize,
    pub duplicates_dropped: usize,
    pub jobs_submitted: usize,
    pub failures: usize,
}

/// One failed extraction job
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FailureEntry {
    pub source_url: String,
    pub fragment: usize,
    pub kind: ExtractionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    records: BTreeMap<NaturalKey, Record>,
    pub failures: Vec<FailureEntry>,
    pub counts: AggregateCounts,
}

impl AggregateResult {
    /// Records in natural key order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn records_of(&self, kind: RecordKind) -> impl Iterator<Item = &Record> {
        self.records.values().filter(move |r| r.kind() == kind)
    }

    /// Kinds present in the result, in order
    pub fn kinds(&self) -> Vec<RecordKind> {
        let mut kinds: Vec<RecordKind> = self.records.keys().map(|k| k.kind).collect();
        kinds.dedup();
        kinds
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Builds the aggregate from traversal counts and all extraction outcomes
pub fn aggregate(pages: PageCounts, outcomes: &[ExtractionOutcome]) -> AggregateResult {
    let mut records: BTreeMap<NaturalKey, Record> = BTreeMap::new();
    let mut failures = Vec::new();
    let mut duplicates_dropped = 0;

    for outcome in outcomes {
        match outcome {
            ExtractionOutcome::Success {
                source_url,
                records: found,
                ..
            } => {
                for record in found {
                    let mut record = record.clone();
                    record.attach_source(source_url);

                    match records.entry(record.natural_key()) {
                        Entry::Vacant(slot) => {
                            slot.insert(record);
                        }
                        Entry::Occupied(mut slot) => {
                            duplicates_dropped += 1;
                            if precedes(&record, slot.get()) {
                                slot.insert(record);
                            }
                        }
                    }
                }
            }
            ExtractionOutcome::Failure {
                source_url,
                fragment,
                error,
            } => failures.push(FailureEntry {
                source_url: source_url.to_string(),
                fragment: *fragment,
                kind: error.kind,
                message: error.message.clone(),
            }),
        }
    }

    failures.sort();

    let counts = AggregateCounts {
        pages_visited: pages.visited,
        pages_successful: pages.successful,
        records_found: records.len(),
        duplicates_dropped,
        jobs_submitted: outcomes.len(),
        failures: failures.len(),
    };

    tracing::info!(
        "Aggregated {} record(s) from {} job(s): {} duplicate(s) dropped, {} failure(s)",
        counts.records_found,
        counts.jobs_submitted,
        counts.duplicates_dropped,
        counts.failures
    );

    AggregateResult {
        records,
        failures,
        counts,
    }
}

fn precedes(candidate: &Record, current: &Record) -> bool {
    (candidate.source_url(), candidate) < (current.source_url(), current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{EventRecord, ExtractionError};
    use url::Url;

    fn event(name: &str, date: &str, source_url: &str) -> Record {
        Record::Event(EventRecord {
            name: name.to_string(),
            date: date.to_string(),
            location: "PAC".to_string(),
            source_url: source_url.to_string(),
        })
    }

    fn success(url: &str, records: Vec<Record>) -> ExtractionOutcome {
        ExtractionOutcome::Success {
            source_url: Url::parse(url).unwrap(),
            fragment: 0,
            records,
        }
    }

    fn failure(url: &str) -> ExtractionOutcome {
        ExtractionOutcome::Failure {
            source_url: Url::parse(url).unwrap(),
            fragment: 0,
            error: ExtractionError::malformed("not json"),
        }
    }

    fn pages() -> PageCounts {
        PageCounts {
            visited: 5,
            successful: 5,
        }
    }

    #[test]
    fn test_partial_failure_kept_separately() {
        let outcomes = vec![
            success("https://e.edu/1", vec![event("A", "May 1", "")]),
            failure("https://e.edu/2"),
            success("https://e.edu/3", vec![event("C", "May 3", "")]),
            success("https://e.edu/4", vec![event("D", "May 4", "")]),
            success("https://e.edu/5", vec![event("E", "May 5", "")]),
        ];

        let result = aggregate(pages(), &outcomes);

        assert_eq!(result.len(), 4);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].source_url, "https://e.edu/2");
        assert_eq!(result.counts.jobs_submitted, 5);
        assert_eq!(result.counts.failures, 1);
    }

    #[test]
    fn test_source_url_backfilled() {
        let result = aggregate(pages(), &[success("https://e.edu/list", vec![event("A", "", "")])]);
        assert_eq!(
            result.records().next().unwrap().source_url(),
            "https://e.edu/list"
        );
    }

    #[test]
    fn test_dedup_keeps_first_source_url_in_any_order() {
        let a = success("https://e.edu/b", vec![event("Jazz Night", "May 3", "")]);
        let b = success("https://e.edu/a", vec![event("jazz  night", "May 3", "")]);

        let forward = aggregate(pages(), &[a.clone(), b.clone()]);
        let backward = aggregate(pages(), &[b, a]);

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward.counts.duplicates_dropped, 1);
        assert_eq!(
            forward.records().next().unwrap().source_url(),
            "https://e.edu/a"
        );
    }

    #[test]
    fn test_reaggregation_is_idempotent() {
        let outcomes = vec![
            success("https://e.edu/1", vec![event("A", "1", ""), event("B", "2", "")]),
            failure("https://e.edu/2"),
            success("https://e.edu/3", vec![event("A", "1", "")]),
        ];
        assert_eq!(aggregate(pages(), &outcomes), aggregate(pages(), &outcomes));
    }

    #[test]
    fn test_empty_outcomes() {
        let result = aggregate(PageCounts::default(), &[]);
        assert!(result.is_empty());
        assert!(result.kinds().is_empty());
        assert_eq!(result.counts, AggregateCounts::default());
    }
}
