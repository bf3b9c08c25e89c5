use crate::state::RunPhase;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Run-scoped context passed explicitly through every stage
///
/// Carries the run identity, the deadline and the extraction permit pool.
/// The permit pool is the only state shared between concurrent tasks.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub source_key: String,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub deadline: Instant,
    pub budget: Duration,
    limiter: Arc<Semaphore>,
    concurrency_limit: usize,
    phase: Mutex<RunPhase>,
}

impl RunContext {
    /// Creates a context for one run of `source_key`
    ///
    /// The run id is the source key plus a millisecond timestamp, e.g.
    /// `courses-csci-20240915T101500.123`.
    pub fn new(
        source_key: &str,
        config_hash: &str,
        budget: Duration,
        concurrency_limit: usize,
    ) -> Self {
        let started_at = Utc::now();
        let concurrency_limit = concurrency_limit.max(1);

        Self {
            run_id: format!("{}-{}", source_key, started_at.format("%Y%m%dT%H%M%S%.3f")),
            source_key: source_key.to_string(),
            config_hash: config_hash.to_string(),
            started_at,
            deadline: Instant::now() + budget,
            budget,
            limiter: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    /// Handle to the extraction permit pool
    pub fn limiter(&self) -> Arc<Semaphore> {
        Arc::clone(&self.limiter)
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Time left before the run deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves the run to the next phase, rejecting illegal transitions
    pub fn advance(&self, to: RunPhase) -> Result<(), HarvestError> {
        let mut phase = self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let from = *phase;

        if !from.can_transition_to(to) {
            return Err(HarvestError::InvalidTransition { from, to });
        }

        tracing::debug!("Run {}: {} -> {}", self.run_id, from, to);
        *phase = to;
        Ok(())
    }
}
