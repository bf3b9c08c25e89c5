//! Run statistics
//!
//! This module summarises an aggregate result per record kind and per
//! failure kind and prints it to stdout.

use crate::extract::{ExtractionErrorKind, RecordKind};
use crate::output::aggregate::{AggregateCounts, AggregateResult};
use std::collections::BTreeMap;

/// Statistics of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    pub counts: AggregateCounts,

    /// Unique records per kind
    pub records_by_kind: BTreeMap<RecordKind, usize>,

    /// Failed jobs per error kind
    pub failures_by_kind: BTreeMap<ExtractionErrorKind, usize>,

    /// Distinct pages that produced at least one failure
    pub failed_pages: usize,
}

impl RunStatistics {
    pub fn from_result(result: &AggregateResult) -> Self {
        let mut records_by_kind = BTreeMap::new();
        for record in result.records() {
            *records_by_kind.entry(record.kind()).or_insert(0) += 1;
        }

        let mut failures_by_kind = BTreeMap::new();
        for failure in &result.failures {
            *failures_by_kind.entry(failure.kind).or_insert(0) += 1;
        }

        let mut failed_pages: Vec<&str> = result
            .failures
            .iter()
            .map(|f| f.source_url.as_str())
            .collect();
        failed_pages.dedup();

        Self {
            counts: result.counts,
            records_by_kind,
            failures_by_kind,
            failed_pages: failed_pages.len(),
        }
    }

    /// Share of extraction jobs that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        if self.counts.jobs_submitted == 0 {
            return 0.0;
        }
        let succeeded = self.counts.jobs_submitted - self.counts.failures;
        (succeeded as f64 / self.counts.jobs_submitted as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `source` - Source key the run belongs to
/// * `stats` - The statistics to display
pub fn print_statistics(source: &str, stats: &RunStatistics) {
    println!("=== Run Statistics: {} ===\n", source);

    println!("Traversal:");
    println!("  Pages visited: {}", stats.counts.pages_visited);
    println!("  Pages fetched successfully: {}", stats.counts.pages_successful);
    println!();

    println!("Records:");
    println!("  Unique records: {}", stats.counts.records_found);
    println!("  Duplicates dropped: {}", stats.counts.duplicates_dropped);
    for (kind, count) in &stats.records_by_kind {
        println!("  {}: {}", kind, count);
    }
    println!();

    if !stats.failures_by_kind.is_empty() {
        println!(
            "Extraction Failures ({} on {} page(s)):",
            stats.counts.failures, stats.failed_pages
        );
        for (kind, count) in &stats.failures_by_kind {
            println!("  {}: {}", kind.as_str(), count);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} extraction jobs succeeded)",
        stats.success_rate(),
        stats.counts.jobs_submitted - stats.counts.failures,
        stats.counts.jobs_submitted
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionError, ExtractionOutcome, FacultyRecord, Record};
    use crate::output::aggregate::{aggregate, PageCounts};
    use url::Url;

    fn faculty(name: &str) -> Record {
        Record::Faculty(FacultyRecord {
            name: name.to_string(),
            website: String::new(),
            research_interests: vec![],
            source_url: String::new(),
        })
    }

    #[test]
    fn test_statistics_from_result() {
        let page = Url::parse("https://cs.example.edu/people").unwrap();
        let outcomes = vec![
            ExtractionOutcome::Success {
                source_url: page.clone(),
                fragment: 0,
                records: vec![faculty("Ada"), faculty("Grace"), faculty("ada")],
            },
            ExtractionOutcome::Failure {
                source_url: page.clone(),
                fragment: 1,
                error: ExtractionError::malformed("truncated"),
            },
            ExtractionOutcome::Failure {
                source_url: page,
                fragment: 2,
                error: ExtractionError::backend("503"),
            },
        ];
        let result = aggregate(
            PageCounts {
                visited: 1,
                successful: 1,
            },
            &outcomes,
        );

        let stats = RunStatistics::from_result(&result);

        assert_eq!(stats.records_by_kind.get(&RecordKind::Faculty), Some(&2));
        assert_eq!(stats.counts.duplicates_dropped, 1);
        assert_eq!(stats.failures_by_kind.len(), 2);
        assert_eq!(stats.failed_pages, 1);
        assert!((stats.success_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_without_jobs() {
        let stats = RunStatistics::from_result(&aggregate(PageCounts::default(), &[]));
        assert_eq!(stats.success_rate(), 0.0);
    }
}
