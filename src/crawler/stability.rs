//! Stability probe for incrementally loading pages
//!
//! Pages that load records only after client-side actions ("Load More"
//! buttons, infinite scroll) are polled on a live session until the
//! stability signal stops changing. The loop is capped so pages whose
//! content oscillates still terminate.

use crate::config::{StabilityConfig, StabilitySignal, TriggerAction};
use crate::crawler::fetcher::{BrowserSession, PageSnapshot};
use std::time::Duration;
use url::Url;

/// How a stabilization ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// Two consecutive readings matched
    Stable,
    /// The cycle cap was hit; the last snapshot is used
    IterationCapReached,
    /// The initial navigation failed
    NavigationFailed,
    /// A mid-loop snapshot failed; the last good snapshot is used
    Interrupted,
}

/// Result of stabilizing one URL
#[derive(Debug, Clone)]
pub struct StabilizedPage {
    pub snapshot: PageSnapshot,
    /// Trigger/measure cycles executed (navigation not counted)
    pub iterations: u32,
    pub outcome: StabilityOutcome,
    /// Signal readings in observation order, navigation first
    pub readings: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct StabilityProbe {
    poll_interval: Duration,
    max_iterations: u32,
    signal: StabilitySignal,
}

impl StabilityProbe {
    pub fn new(poll_interval: Duration, max_iterations: u32, signal: StabilitySignal) -> Self {
        Self {
            poll_interval,
            max_iterations: max_iterations.max(1),
            signal,
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(config.poll_interval(), config.max_iterations, config.signal)
    }

    /// Navigates once, then triggers, waits and measures until stable
    ///
    /// With readings `[100, 250, 250]` the probe stops after the third
    /// reading and returns the snapshot that produced the second one.
    pub async fn stabilize(
        &self,
        session: &mut dyn BrowserSession,
        url: &Url,
        depth: u32,
        triggers: &[TriggerAction],
    ) -> StabilizedPage {
        let mut last = session.navigate(url, depth).await;
        if !last.success {
            tracing::warn!("Session {}: navigation to {} failed", session.id(), url);
            return StabilizedPage {
                snapshot: last,
                iterations: 0,
                outcome: StabilityOutcome::NavigationFailed,
                readings: Vec::new(),
            };
        }

        let mut last_signal = last.signal(self.signal);
        let mut readings = vec![last_signal];

        for iteration in 1..=self.max_iterations {
            if let Err(e) = session.run_actions(triggers).await {
                tracing::warn!("Session {}: trigger actions failed: {}", session.id(), e);
            }

            tokio::time::sleep(self.poll_interval).await;

            let current = match session.snapshot().await {
                Ok(snapshot) if snapshot.success => snapshot,
                Ok(snapshot) => {
                    tracing::warn!(
                        "Session {}: poll {} of {} failed: {:?}",
                        session.id(),
                        iteration,
                        url,
                        snapshot.error
                    );
                    return self.finish(last, iteration, StabilityOutcome::Interrupted, readings);
                }
                Err(e) => {
                    tracing::warn!("Session {}: {}", session.id(), e);
                    return self.finish(last, iteration, StabilityOutcome::Interrupted, readings);
                }
            };

            let signal = current.signal(self.signal);
            readings.push(signal);
            tracing::trace!(
                "Session {}: poll {} signal {} (previous {})",
                session.id(),
                iteration,
                signal,
                last_signal
            );

            if signal == last_signal {
                tracing::debug!(
                    "{} stable after {} cycle(s) at {} bytes",
                    url,
                    iteration,
                    signal
                );
                return self.finish(last, iteration, StabilityOutcome::Stable, readings);
            }

            last = current;
            last_signal = signal;
        }

        tracing::warn!(
            "{} still changing after {} cycles, using last snapshot",
            url,
            self.max_iterations
        );
        self.finish(
            last,
            self.max_iterations,
            StabilityOutcome::IterationCapReached,
            readings,
        )
    }

    fn finish(
        &self,
        snapshot: PageSnapshot,
        iterations: u32,
        outcome: StabilityOutcome,
        readings: Vec<usize>,
    ) -> StabilizedPage {
        StabilizedPage {
            snapshot,
            iterations,
            outcome,
            readings,
        }
    }
}
