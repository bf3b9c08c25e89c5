//! Extraction batcher
//!
//! Runs every job of a run concurrently against the extraction backend,
//! bounded by the run's permit pool. Each job yields exactly one outcome:
//!
//! - a backend error, a malformed response or a schema mismatch becomes a
//!   `Failure` for that job only
//! - a job exceeding the per-job timeout becomes a `Timeout` failure
//! - a panicking backend call becomes a `Panicked` failure
//!
//! In every case the job's permit is released when its future completes or
//! unwinds, so siblings are never starved. Outcome order follows completion,
//! not submission; each outcome carries its job's source URL.

use crate::extract::backend::Extractor;
use crate::extract::job::{ExtractionError, ExtractionErrorKind, ExtractionJob, ExtractionOutcome};
use crate::state::RunContext;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub submitted: usize,
    /// Jobs with an empty body, never sent to the backend
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub outcomes: Vec<ExtractionOutcome>,
    pub stats: BatchStats,
}

pub struct ExtractionBatcher {
    extractor: Arc<dyn Extractor>,
    job_timeout: Duration,
}

impl ExtractionBatcher {
    pub fn new(extractor: Arc<dyn Extractor>, job_timeout: Duration) -> Self {
        Self {
            extractor,
            job_timeout,
        }
    }

    /// Extracts all jobs, at most `ctx.concurrency_limit()` in flight
    pub async fn extract_many(&self, ctx: &RunContext, jobs: Vec<ExtractionJob>) -> BatchResult {
        let mut stats = BatchStats::default();
        let mut pending = FuturesUnordered::new();

        for job in jobs {
            if job.body.trim().is_empty() {
                tracing::debug!("Skipping empty body from {}", job.label());
                stats.skipped += 1;
                continue;
            }

            stats.submitted += 1;
            pending.push(run_job(
                Arc::clone(&self.extractor),
                ctx,
                job,
                self.job_timeout,
            ));
        }

        tracing::info!(
            "Extracting {} job(s) with {} permit(s), {} skipped",
            stats.submitted,
            ctx.concurrency_limit(),
            stats.skipped
        );

        let outcomes: Vec<ExtractionOutcome> = pending.collect().await;
        for outcome in &outcomes {
            match outcome {
                ExtractionOutcome::Success { .. } => stats.succeeded += 1,
                ExtractionOutcome::Failure { .. } => stats.failed += 1,
            }
        }

        BatchResult { outcomes, stats }
    }
}

async fn run_job(
    extractor: Arc<dyn Extractor>,
    ctx: &RunContext,
    job: ExtractionJob,
    job_timeout: Duration,
) -> ExtractionOutcome {
    let result = match ctx.limiter().acquire_owned().await {
        Ok(_permit) => {
            let input = job.prompt_input();
            let call = AssertUnwindSafe(extractor.invoke(&input, job.kind)).catch_unwind();

            match tokio::time::timeout(job_timeout, call).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(ExtractionError::new(
                    ExtractionErrorKind::Panicked,
                    panic_message(panic.as_ref()),
                )),
                Err(_) => Err(ExtractionError::new(
                    ExtractionErrorKind::Timeout,
                    format!("job exceeded {}s", job_timeout.as_secs_f64()),
                )),
            }
        }
        Err(e) => Err(ExtractionError::backend(format!("permit pool closed: {}", e))),
    };

    match &result {
        Ok(records) => tracing::debug!("{}: {} record(s)", job.label(), records.len()),
        Err(e) => tracing::error!("{}: {}", job.label(), e),
    }

    ExtractionOutcome::from_result(&job, result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "extraction call panicked".to_string()
    }
}
