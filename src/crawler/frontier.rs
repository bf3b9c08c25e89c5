//! Traversal frontier
//!
//! Holds the pending targets, the visited set and the admitted count.
//! Every admission goes through one predicate, so BFS and DFS admit
//! under identical rules and differ only in pop order:
//!
//! 1. depth ≤ max_depth
//! 2. host in the allowed domains (when configured)
//! 3. path matches an allow pattern (when configured; seed exempt)
//! 4. admitted count < max_pages
//! 5. normalized URL not seen before

use crate::config::Traversal;
use crate::crawler::fetcher::CrawlTarget;
use crate::url::{normalize_parsed, AllowRules};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Bounds of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    pub max_depth: u32,
    pub max_pages: usize,
    pub order: Traversal,
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    TooDeep,
    DomainRejected,
    PatternRejected,
    PageCapReached,
    AlreadyVisited,
    Unnormalizable,
}

/// Per-reason admission counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    pub admitted: usize,
    pub too_deep: usize,
    pub domain_rejected: usize,
    pub pattern_rejected: usize,
    pub page_cap: usize,
    pub duplicates: usize,
    pub unnormalizable: usize,
}

impl AdmissionStats {
    fn record(&mut self, admission: Admission) {
        match admission {
            Admission::Admitted => self.admitted += 1,
            Admission::TooDeep => self.too_deep += 1,
            Admission::DomainRejected => self.domain_rejected += 1,
            Admission::PatternRejected => self.pattern_rejected += 1,
            Admission::PageCapReached => self.page_cap += 1,
            Admission::AlreadyVisited => self.duplicates += 1,
            Admission::Unnormalizable => self.unnormalizable += 1,
        }
    }
}

#[derive(Debug)]
pub struct Frontier {
    limits: TraversalLimits,
    pending: VecDeque<CrawlTarget>,
    visited: HashSet<String>,
    admitted: Vec<CrawlTarget>,
    stats: AdmissionStats,
}

impl Frontier {
    pub fn new(limits: TraversalLimits) -> Self {
        Self {
            limits,
            pending: VecDeque::new(),
            visited: HashSet::new(),
            admitted: Vec::new(),
            stats: AdmissionStats::default(),
        }
    }

    /// Admits the seed at depth 0
    ///
    /// The seed is the listing page itself, so path patterns do not apply
    /// to it; the domain constraint does.
    pub fn admit_seed(&mut self, seed: Url, rules: &AllowRules) -> Admission {
        self.offer_inner(seed, 0, rules, false)
    }

    /// Offers a discovered link at the given depth
    pub fn offer(&mut self, url: Url, depth: u32, rules: &AllowRules) -> Admission {
        self.offer_inner(url, depth, rules, true)
    }

    fn offer_inner(&mut self, url: Url, depth: u32, rules: &AllowRules, check_path: bool) -> Admission {
        let admission = self.check(&url, depth, rules, check_path);
        if admission == Admission::Admitted {
            let target = CrawlTarget::new(url, depth);
            self.pending.push_back(target.clone());
            self.admitted.push(target);
        }
        self.stats.record(admission);
        admission
    }

    fn check(&mut self, url: &Url, depth: u32, rules: &AllowRules, check_path: bool) -> Admission {
        if depth > self.limits.max_depth {
            return Admission::TooDeep;
        }
        if !rules.domain_allowed(url) {
            return Admission::DomainRejected;
        }
        if check_path && !rules.path_allowed(url) {
            return Admission::PatternRejected;
        }
        if self.is_full() {
            return Admission::PageCapReached;
        }

        let key = match normalize_parsed(url.clone()) {
            Ok(normalized) => normalized.to_string(),
            Err(_) => return Admission::Unnormalizable,
        };
        if !self.visited.insert(key) {
            return Admission::AlreadyVisited;
        }

        Admission::Admitted
    }

    /// Next target to visit: front for BFS, back for DFS
    pub fn pop(&mut self) -> Option<CrawlTarget> {
        match self.limits.order {
            Traversal::Bfs => self.pending.pop_front(),
            Traversal::Dfs => self.pending.pop_back(),
        }
    }

    /// All pending targets at the depth of the front target (BFS levels)
    pub fn take_level(&mut self) -> Vec<CrawlTarget> {
        let Some(depth) = self.pending.front().map(|t| t.depth) else {
            return Vec::new();
        };

        let mut level = Vec::new();
        while self.pending.front().is_some_and(|t| t.depth == depth) {
            if let Some(target) = self.pending.pop_front() {
                level.push(target);
            }
        }
        level
    }

    pub fn is_full(&self) -> bool {
        self.admitted.len() >= self.limits.max_pages
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn limits(&self) -> TraversalLimits {
        self.limits
    }

    /// Targets in admission order
    pub fn admitted(&self) -> &[CrawlTarget] {
        &self.admitted
    }

    pub fn stats(&self) -> &AdmissionStats {
        &self.stats
    }

    pub fn into_parts(self) -> (Vec<CrawlTarget>, AdmissionStats) {
        (self.admitted, self.stats)
    }
}
