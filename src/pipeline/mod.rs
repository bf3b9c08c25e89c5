//! Run orchestration
//!
//! A run resolves one `[[source]]` entry and drives it through
//! traverse → prefilter → extract → aggregate under a single deadline. The
//! whole run is one future wrapped in `tokio::time::timeout`; when the
//! deadline fires every in-flight fetch and extraction is dropped and the
//! caller gets `HarvestError::BudgetExceeded` instead of a partial result.

use crate::config::{Config, SourceConfig};
use crate::crawler::{
    FrontierWalker, HttpFetcher, PageFetcher, StabilityProbe, Traversal, TraversalPlan,
};
use crate::extract::{
    BatchStats, ContentPrefilter, ExtractionBatcher, ExtractionJob, Extractor, OllamaExtractor,
    RecordKind,
};
use crate::output::{aggregate, AggregateResult, PageCounts, RunMeta};
use crate::state::{RunContext, RunPhase};
use crate::HarvestError;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Whether a run found anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Found,
    Empty,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Empty => "empty",
        }
    }
}

/// Traversal counters carried into the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraversalSummary {
    pub pages_visited: usize,
    pub pages_successful: usize,
    pub admitted: usize,
    pub domain_rejected: usize,
    pub pattern_rejected: usize,
    pub stabilized: usize,
}

impl From<&Traversal> for TraversalSummary {
    fn from(traversal: &Traversal) -> Self {
        Self {
            pages_visited: traversal.pages.len(),
            pages_successful: traversal.pages_successful(),
            admitted: traversal.stats.admitted,
            domain_rejected: traversal.stats.domain_rejected,
            pattern_rejected: traversal.stats.pattern_rejected,
            stabilized: traversal.stabilizations.len(),
        }
    }
}

/// Outcome of one completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub meta: RunMeta,
    pub status: RunStatus,
    pub result: AggregateResult,
    pub traversal: TraversalSummary,
    pub extraction: BatchStats,
}

impl RunReport {
    pub fn new(
        meta: RunMeta,
        result: AggregateResult,
        traversal: TraversalSummary,
        extraction: BatchStats,
    ) -> Self {
        let status = if result.is_empty() {
            RunStatus::Empty
        } else {
            RunStatus::Found
        };
        Self {
            meta,
            status,
            result,
            traversal,
            extraction,
        }
    }

    /// HTTP-equivalent status: 200 with records, 404 without
    pub fn status_code(&self) -> u16 {
        match self.status {
            RunStatus::Found => 200,
            RunStatus::Empty => 404,
        }
    }

    pub fn count(&self) -> usize {
        self.result.len()
    }

    /// `{status, count, data, failures, counts}` plus the run identity
    pub fn to_json(&self) -> Value {
        let data: Vec<_> = self.result.records().collect();
        json!({
            "run_id": self.meta.run_id,
            "source": self.meta.source_key,
            "status": self.status.as_str(),
            "status_code": self.status_code(),
            "count": self.count(),
            "data": data,
            "failures": self.result.failures,
            "counts": self.result.counts,
        })
    }
}

/// Overall result of running every configured source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialSuccess,
    Failed,
}

/// Per-source line of a batch summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub status_code: u16,
    pub count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Sources that completed, empty results included
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub sources: Vec<SourceSummary>,
    pub reports: Vec<RunReport>,
}

impl BatchSummary {
    pub fn overall(&self) -> OverallStatus {
        if self.failed == 0 {
            OverallStatus::Success
        } else if self.successful > 0 {
            OverallStatus::PartialSuccess
        } else {
            OverallStatus::Failed
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "sources": self.sources,
            "summary": {
                "total_extractions": self.successful + self.failed,
                "successful": self.successful,
                "failed": self.failed,
                "errors": self.errors,
                "overall_status": self.overall(),
            },
        })
    }
}

pub struct Pipeline {
    config: Config,
    config_hash: String,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    deadline: Option<Duration>,
}

impl Pipeline {
    /// Builds a pipeline with the reqwest fetcher and the Ollama backend
    pub fn new(config: Config, config_hash: String) -> Result<Self, HarvestError> {
        let fetcher = HttpFetcher::new(&config.crawler, &config.user_agent)?;
        let extractor = OllamaExtractor::new(&config.extraction, &config.user_agent)?;
        Ok(Self::with_components(
            config,
            config_hash,
            Arc::new(fetcher),
            Arc::new(extractor),
        ))
    }

    /// Pipeline over a caller-supplied fetcher and the configured backend
    pub fn with_fetcher(
        config: Config,
        config_hash: String,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, HarvestError> {
        let extractor = OllamaExtractor::new(&config.extraction, &config.user_agent)?;
        Ok(Self::with_components(
            config,
            config_hash,
            fetcher,
            Arc::new(extractor),
        ))
    }

    pub fn with_components(
        config: Config,
        config_hash: String,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            config,
            config_hash,
            fetcher,
            extractor,
            deadline: None,
        }
    }

    /// Overrides the configured run deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn deadline(&self) -> Duration {
        self.deadline.unwrap_or_else(|| self.config.run.deadline())
    }

    /// Runs the source configured for `(kind, code)`
    ///
    /// # Errors
    ///
    /// `ConfigError::UnknownTarget` when no source matches, before any
    /// page is fetched; `HarvestError::BudgetExceeded` when the run
    /// outlives its deadline.
    pub async fn run(&self, kind: RecordKind, code: &str) -> Result<RunReport, HarvestError> {
        let source = self.config.find_source(kind, code)?;
        self.run_source(source).await
    }

    pub async fn run_source(&self, source: &SourceConfig) -> Result<RunReport, HarvestError> {
        let ctx = RunContext::new(
            &source.key(),
            &self.config_hash,
            self.deadline(),
            self.config.extraction.concurrency_limit,
        );
        let span = tracing::info_span!("run", run_id = %ctx.run_id, source = %ctx.source_key);

        let outcome = tokio::time::timeout(ctx.budget, self.execute(&ctx, source))
            .instrument(span)
            .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "Run {} exceeded its deadline of {:?} during {}",
                    ctx.run_id,
                    ctx.budget,
                    ctx.phase()
                );
                Err(HarvestError::BudgetExceeded {
                    run_id: ctx.run_id.clone(),
                    budget: ctx.budget,
                })
            }
        }
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        source: &SourceConfig,
    ) -> Result<RunReport, HarvestError> {
        let plan = TraversalPlan::for_source(source, &self.config.crawler)?;
        let prefilter = ContentPrefilter::for_source(source)?;

        tracing::info!("Starting {} run from {}", source.key(), plan.seed);

        let walker = FrontierWalker::new(
            Arc::clone(&self.fetcher),
            StabilityProbe::from_config(&self.config.stability),
        );
        let traversal = walker.traverse(ctx, &plan).await?;

        ctx.advance(RunPhase::Extracting)?;
        let jobs: Vec<ExtractionJob> = traversal
            .successful_pages()
            .flat_map(|page| prefilter.jobs_for(page))
            .collect();
        tracing::info!(
            "Extracting {} job(s) from {} page(s), at most {} in flight",
            jobs.len(),
            traversal.pages_successful(),
            ctx.concurrency_limit()
        );

        let batcher = ExtractionBatcher::new(
            Arc::clone(&self.extractor),
            self.config.extraction.job_timeout(),
        );
        let batch = batcher.extract_many(ctx, jobs).await;

        ctx.advance(RunPhase::Aggregating)?;
        let result = aggregate(
            PageCounts {
                visited: traversal.pages.len(),
                successful: traversal.pages_successful(),
            },
            &batch.outcomes,
        );

        ctx.advance(RunPhase::Done)?;
        let report = RunReport::new(
            RunMeta::from_context(ctx, source.kind, &source.code),
            result,
            TraversalSummary::from(&traversal),
            batch.stats,
        );

        if report.status == RunStatus::Empty {
            tracing::warn!("No {} found for {}", source.kind, source.code);
        } else {
            tracing::info!(
                "Run finished with {} record(s) in {:.1}s",
                report.count(),
                report.meta.duration_seconds()
            );
        }
        Ok(report)
    }

    /// Runs every configured source in order, each under its own deadline
    ///
    /// A failing source is recorded and the batch moves on.
    pub async fn run_all(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for source in &self.config.sources {
            match self.run_source(source).await {
                Ok(report) => {
                    summary.successful += 1;
                    summary.sources.push(SourceSummary {
                        source: source.key(),
                        status_code: report.status_code(),
                        count: report.count(),
                        error: None,
                    });
                    summary.reports.push(report);
                }
                Err(e) => {
                    tracing::error!("Extraction failed for {}: {}", source.key(), e);
                    summary.failed += 1;
                    summary
                        .errors
                        .push(format!("{} extraction failed: {}", source.key(), e));
                    summary.sources.push(SourceSummary {
                        source: source.key(),
                        status_code: e.status_code(),
                        count: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            "Extraction complete. Success: {}, Failed: {}",
            summary.successful,
            summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::crawler::testing::ScriptedFetcher;
    use crate::extract::testing::MockExtractor;
    use crate::ConfigError;

    const CONFIG: &str = r#"
[crawler]
max-depth = 1
max-pages = 10
politeness-delay-ms = 0

[extraction]
concurrency-limit = 2

[[source]]
kind = "faculty"
code = "CSCI"
seed = "https://cs.example.edu/people"
allowed-domains = ["cs.example.edu"]

[[source]]
kind = "faculty"
code = "MATH"
seed = "https://math.example.edu/people"
allowed-domains = ["math.example.edu"]
"#;

    fn pipeline(fetcher: ScriptedFetcher, extractor: MockExtractor) -> Pipeline {
        Pipeline::with_components(
            parse_config(CONFIG).unwrap(),
            "hash".to_string(),
            Arc::new(fetcher),
            Arc::new(extractor),
        )
    }

    fn people_page(names: &[&str]) -> String {
        let items: String = names
            .iter()
            .map(|n| format!("<p>record: {}</p>", n))
            .collect();
        format!("<html><body><main>{}</main></body></html>", items)
    }

    #[tokio::test]
    async fn test_run_finds_records() {
        let fetcher = ScriptedFetcher::new().with_page(
            "https://cs.example.edu/people",
            people_page(&["Ada Lovelace", "Grace Hopper"]),
        );
        let report = pipeline(fetcher, MockExtractor::new())
            .run(RecordKind::Faculty, "csci")
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Found);
        assert_eq!(report.status_code(), 200);
        assert_eq!(report.count(), 2);
        assert_eq!(report.traversal.pages_visited, 1);

        let json = report.to_json();
        assert_eq!(json["count"], 2);
        assert_eq!(json["status"], "found");
        assert_eq!(json["data"][0]["source_url"], "https://cs.example.edu/people");
    }

    #[tokio::test]
    async fn test_unknown_code_fails_before_fetching() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pipeline = Pipeline::with_components(
            parse_config(CONFIG).unwrap(),
            "hash".to_string(),
            fetcher.clone(),
            Arc::new(MockExtractor::new()),
        );

        let err = pipeline.run(RecordKind::Faculty, "NOPE").await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Config(ConfigError::UnknownTarget { .. })
        ));
        assert_eq!(err.status_code(), 400);
        assert!(fetcher.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_with_fetcher_uses_supplied_fetcher() {
        let fetcher = Arc::new(ScriptedFetcher::new().with_page(
            "https://cs.example.edu/people",
            people_page(&[]),
        ));
        let pipeline = Pipeline::with_fetcher(
            parse_config(CONFIG).unwrap(),
            "hash".to_string(),
            fetcher.clone(),
        )
        .unwrap();

        assert!(pipeline.run(RecordKind::Faculty, "NOPE").await.is_err());
        assert!(fetcher.fetched().is_empty());

        let report = pipeline.run(RecordKind::Faculty, "CSCI").await.unwrap();
        assert_eq!(report.status, RunStatus::Empty);
        assert_eq!(fetcher.fetched().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_404() {
        let fetcher = ScriptedFetcher::new().with_page(
            "https://cs.example.edu/people",
            "<html><body><main>No faculty listed</main></body></html>",
        );
        let report = pipeline(fetcher, MockExtractor::new())
            .run(RecordKind::Faculty, "CSCI")
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Empty);
        assert_eq!(report.status_code(), 404);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let fetcher = ScriptedFetcher::new()
            .with_page("https://cs.example.edu/people", people_page(&["Ada"]))
            .with_delay(Duration::from_secs(5));
        let pipeline =
            pipeline(fetcher, MockExtractor::new()).with_deadline(Duration::from_millis(50));

        let err = pipeline.run(RecordKind::Faculty, "CSCI").await.unwrap_err();
        assert!(err.is_budget_exceeded());
        assert_eq!(err.status_code(), 408);
    }

    #[tokio::test]
    async fn test_run_all_partial_success() {
        let fetcher = ScriptedFetcher::new()
            .with_page("https://cs.example.edu/people", people_page(&["Ada"]))
            .with_page("https://math.example.edu/people", people_page(&["Emmy"]));
        // Every MATH job fails at the backend, the run itself still completes
        let extractor = MockExtractor::new().fail_when_contains("Emmy");

        let summary = pipeline(fetcher, extractor).run_all().await;

        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.overall(), OverallStatus::Success);
        assert_eq!(summary.sources[1].status_code, 404);
        assert_eq!(summary.reports[1].result.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_run_all_counts_run_level_failures() {
        let fetcher = ScriptedFetcher::new()
            .with_page("https://cs.example.edu/people", people_page(&["Ada"]))
            .with_page("https://math.example.edu/people", people_page(&["Emmy"]))
            .with_delay(Duration::from_secs(5));
        let summary = pipeline(fetcher, MockExtractor::new())
            .with_deadline(Duration::from_millis(20))
            .run_all()
            .await;

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.overall(), OverallStatus::Failed);
        assert_eq!(summary.to_json()["summary"]["overall_status"], "failed");
    }

    #[test]
    fn test_overall_status() {
        let mut summary = BatchSummary {
            successful: 1,
            failed: 1,
            ..BatchSummary::default()
        };
        assert_eq!(summary.overall(), OverallStatus::PartialSuccess);
        summary.failed = 0;
        assert_eq!(summary.overall(), OverallStatus::Success);
    }
}
