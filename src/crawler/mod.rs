//! Crawler module for page fetching and traversal
//!
//! This module contains the traversal side of a run, including:
//! - Page fetching over HTTP and live sessions
//! - HTML parsing, link extraction and markdown rendering
//! - The admission frontier and the BFS/DFS walker
//! - Stabilization of incrementally loading pages

#[cfg(feature = "browser")]
mod browser;
mod fetcher;
mod frontier;
mod parser;
mod stability;
pub mod testing;
mod walker;

#[cfg(feature = "browser")]
pub use browser::{action_scripts, BrowserFetcher, ChromeSession};
pub use fetcher::{
    build_http_client, fetch_html, BrowserSession, CrawlTarget, FetchError, HttpFetcher,
    HttpSession, PageFetcher, PageSnapshot, DEFAULT_FETCH_CONCURRENCY,
};
pub use frontier::{Admission, AdmissionStats, Frontier, TraversalLimits};
pub use parser::{extract_markdown_links, html_to_markdown, parse_html, resolve_link, ParsedPage};
pub use stability::{StabilityOutcome, StabilityProbe, StabilizedPage};
pub use walker::{FrontierWalker, StabilizationReport, Traversal, TraversalPlan};
