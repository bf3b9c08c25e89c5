//! Frontier walker
//!
//! Drives a bounded traversal from one seed:
//!
//! 1. Admit the seed (domain constraint enforced, patterns exempt)
//! 2. Take the next batch: a whole level for BFS, one target for DFS
//! 3. Fetch the batch; targets in the stabilize scope go through the
//!    stability probe on their own session instead
//! 4. Offer each successful page's links to the frontier, in page order
//!    then link order, so admission order is reproducible
//! 5. Sleep the politeness delay, repeat until the frontier is empty
//!
//! Failed pages stay in the traversal with `success=false` and are never
//! expanded.

use crate::config::{CrawlerConfig, SourceConfig, StabilizeScope, TriggerAction};
use crate::crawler::fetcher::{CrawlTarget, FetchError, PageFetcher, PageSnapshot};
use crate::crawler::frontier::{Admission, AdmissionStats, Frontier, TraversalLimits};
use crate::crawler::parser::{extract_markdown_links, parse_html};
use crate::crawler::stability::{StabilityOutcome, StabilityProbe};
use crate::state::{RunContext, RunPhase};
use crate::url::AllowRules;
use crate::{ConfigError, HarvestError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything the walker needs to traverse one source
#[derive(Debug, Clone)]
pub struct TraversalPlan {
    pub seed: Url,
    pub limits: TraversalLimits,
    pub rules: AllowRules,
    pub stabilize: StabilizeScope,
    pub triggers: Vec<TriggerAction>,
    pub politeness_delay: Duration,
}

impl TraversalPlan {
    pub fn for_source(source: &SourceConfig, crawler: &CrawlerConfig) -> Result<Self, ConfigError> {
        let seed = Url::parse(&source.seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", source.seed, e)))?;

        Ok(Self {
            seed,
            limits: TraversalLimits {
                max_depth: source.effective_max_depth(crawler),
                max_pages: source.effective_max_pages(crawler),
                order: crawler.traversal,
            },
            rules: source.allow_rules()?,
            stabilize: source.stabilize,
            triggers: source.triggers.clone(),
            politeness_delay: crawler.politeness_delay(),
        })
    }
}

/// Stabilization result for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilizationReport {
    pub url: Url,
    pub session_id: String,
    pub outcome: StabilityOutcome,
    pub iterations: u32,
}

/// Result of one traversal
#[derive(Debug, Clone)]
pub struct Traversal {
    /// Admitted targets in admission order
    pub targets: Vec<CrawlTarget>,
    /// Visited pages in visit order, failures included
    pub pages: Vec<PageSnapshot>,
    pub stats: AdmissionStats,
    pub stabilizations: Vec<StabilizationReport>,
}

impl Traversal {
    pub fn successful_pages(&self) -> impl Iterator<Item = &PageSnapshot> {
        self.pages.iter().filter(|p| p.success)
    }

    pub fn pages_successful(&self) -> usize {
        self.successful_pages().count()
    }
}

pub struct FrontierWalker {
    fetcher: Arc<dyn PageFetcher>,
    probe: StabilityProbe,
}

impl FrontierWalker {
    pub fn new(fetcher: Arc<dyn PageFetcher>, probe: StabilityProbe) -> Self {
        Self { fetcher, probe }
    }

    /// Traverses from the plan's seed
    ///
    /// Moves the run into `Traversing`, stepping through `Stabilizing` for
    /// every stabilized page.
    ///
    /// # Errors
    ///
    /// `ConfigError::SeedOutsideDomains` when the seed fails the domain
    /// constraint; `HarvestError::InvalidTransition` if the run is not idle.
    pub async fn traverse(
        &self,
        ctx: &RunContext,
        plan: &TraversalPlan,
    ) -> Result<Traversal, HarvestError> {
        ctx.advance(RunPhase::Traversing)?;

        let mut frontier = Frontier::new(plan.limits);
        if frontier.admit_seed(plan.seed.clone(), &plan.rules) != Admission::Admitted {
            return Err(ConfigError::SeedOutsideDomains {
                seed: plan.seed.to_string(),
            }
            .into());
        }

        tracing::info!(
            "Traversing from {} (max depth {}, max pages {}, {:?})",
            plan.seed,
            plan.limits.max_depth,
            plan.limits.max_pages,
            plan.limits.order
        );

        let mut pages: Vec<PageSnapshot> = Vec::new();
        let mut stabilizations = Vec::new();

        loop {
            let batch = match plan.limits.order {
                crate::config::Traversal::Bfs => frontier.take_level(),
                crate::config::Traversal::Dfs => frontier.pop().into_iter().collect(),
            };
            if batch.is_empty() {
                break;
            }

            if !pages.is_empty() && !plan.politeness_delay.is_zero() {
                tokio::time::sleep(plan.politeness_delay).await;
            }

            let visited = self
                .visit(ctx, plan, &batch, pages.len(), &mut stabilizations)
                .await?;

            for snapshot in &visited {
                expand(&mut frontier, plan, snapshot);
            }
            pages.extend(visited);
        }

        let (targets, stats) = frontier.into_parts();
        tracing::info!(
            "Traversal done: {} admitted, {} fetched OK, {} off-domain, {} off-pattern, {} duplicate",
            targets.len(),
            pages.iter().filter(|p| p.success).count(),
            stats.domain_rejected,
            stats.pattern_rejected,
            stats.duplicates
        );

        Ok(Traversal {
            targets,
            pages,
            stats,
            stabilizations,
        })
    }

    /// Fetches a batch and returns snapshots in batch order
    async fn visit(
        &self,
        ctx: &RunContext,
        plan: &TraversalPlan,
        batch: &[CrawlTarget],
        visit_offset: usize,
        stabilizations: &mut Vec<StabilizationReport>,
    ) -> Result<Vec<PageSnapshot>, HarvestError> {
        let plain: Vec<CrawlTarget> = batch
            .iter()
            .filter(|t| !plan.stabilize.applies_at(t.depth))
            .cloned()
            .collect();

        let mut fetched: HashMap<String, PageSnapshot> = if plain.is_empty() {
            HashMap::new()
        } else {
            self.fetcher
                .fetch_many(&plain)
                .await
                .into_iter()
                .map(|snapshot| (snapshot.url.to_string(), snapshot))
                .collect()
        };

        let mut ordered = Vec::with_capacity(batch.len());
        for (offset, target) in batch.iter().enumerate() {
            if plan.stabilize.applies_at(target.depth) {
                let session_id = format!("{}-{}", ctx.run_id, visit_offset + offset);
                ctx.advance(RunPhase::Stabilizing)?;

                let mut session = self.fetcher.open_session(&session_id);
                let page = self
                    .probe
                    .stabilize(session.as_mut(), &target.url, target.depth, &plan.triggers)
                    .await;

                ctx.advance(RunPhase::Traversing)?;
                tracing::debug!(
                    "Stabilized {} on {}: {:?} after {} cycle(s)",
                    target.url,
                    session_id,
                    page.outcome,
                    page.iterations
                );

                stabilizations.push(StabilizationReport {
                    url: target.url.clone(),
                    session_id,
                    outcome: page.outcome,
                    iterations: page.iterations,
                });
                ordered.push(page.snapshot);
                continue;
            }

            let snapshot = fetched.remove(target.url.as_str()).unwrap_or_else(|| {
                PageSnapshot::failed(
                    target.url.clone(),
                    target.depth,
                    FetchError::Session("fetcher returned no result".to_string()),
                )
            });
            ordered.push(snapshot);
        }

        Ok(ordered)
    }
}

/// Offers a page's links to the frontier
fn expand(frontier: &mut Frontier, plan: &TraversalPlan, snapshot: &PageSnapshot) {
    if !snapshot.success {
        tracing::debug!("Not expanding failed page {}", snapshot.url);
        return;
    }
    if snapshot.depth >= plan.limits.max_depth || frontier.is_full() {
        return;
    }

    let parsed = parse_html(&snapshot.html, &snapshot.url);
    let mut seen = HashSet::new();
    let links = parsed
        .links
        .into_iter()
        .chain(extract_markdown_links(&snapshot.markdown, &snapshot.url))
        .filter(|link| seen.insert(link.to_string()));

    let mut admitted = 0;
    for link in links {
        let admission = frontier.offer(link, snapshot.depth + 1, &plan.rules);
        if admission == Admission::Admitted {
            admitted += 1;
        }
    }

    tracing::debug!(
        "{}: {} new target(s) at depth {}",
        snapshot.url,
        admitted,
        snapshot.depth + 1
    );
}
