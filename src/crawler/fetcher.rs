//! Page fetching
//!
//! This module defines the fetch capability the pipeline consumes:
//! - `PageFetcher` for one-shot and batched page fetches
//! - `BrowserSession` for live pages that load content incrementally
//! - `HttpFetcher`, the bundled reqwest implementation
//!
//! A fetch never fails with an error value. Failures are recorded on the
//! returned `PageSnapshot` (success=false) so traversal can continue.

use crate::config::{CrawlerConfig, StabilitySignal, TriggerAction, UserAgentConfig};
use crate::crawler::parser::html_to_markdown;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Concurrency used by the default `fetch_many`
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// A URL admitted into the traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: Url,
    /// Link distance from the seed (seed = 0)
    pub depth: u32,
}

impl CrawlTarget {
    pub fn new(url: Url, depth: u32) -> Self {
        Self { url, depth }
    }
}

/// Why a page could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("not an HTML page ({content_type})")]
    ContentMismatch { content_type: String },

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("session error: {0}")]
    Session(String),
}

/// One fetched (or failed) page
///
/// Created once per fetch and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: Url,
    pub html: String,
    pub markdown: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<FetchError>,
    pub fetched_at: DateTime<Utc>,
    pub depth: u32,
}

impl PageSnapshot {
    /// Successful fetch; markdown is rendered from the HTML
    pub fn fetched(url: Url, depth: u32, status_code: u16, html: String) -> Self {
        let markdown = html_to_markdown(&html);
        Self::with_content(url, depth, status_code, html, markdown)
    }

    /// Successful fetch where the fetcher already produced markdown
    pub fn with_content(
        url: Url,
        depth: u32,
        status_code: u16,
        html: String,
        markdown: String,
    ) -> Self {
        Self {
            url,
            html,
            markdown,
            success: true,
            status_code: Some(status_code),
            error: None,
            fetched_at: Utc::now(),
            depth,
        }
    }

    pub fn failed(url: Url, depth: u32, error: FetchError) -> Self {
        let status_code = match &error {
            FetchError::Http { status } => Some(*status),
            _ => None,
        };
        Self {
            url,
            html: String::new(),
            markdown: String::new(),
            success: false,
            status_code,
            error: Some(error),
            fetched_at: Utc::now(),
            depth,
        }
    }

    /// Stability measurement of this snapshot
    pub fn signal(&self, signal: StabilitySignal) -> usize {
        match signal {
            StabilitySignal::HtmlLength => self.html.len(),
            StabilitySignal::MarkdownLength => self.markdown.len(),
        }
    }
}

/// Fetch-a-page capability
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches one URL
    async fn fetch(&self, url: &Url, depth: u32) -> PageSnapshot;

    /// Fetches independent targets concurrently
    ///
    /// Results come back in completion order, not submission order.
    async fn fetch_many(&self, targets: &[CrawlTarget]) -> Vec<PageSnapshot> {
        let fetches: Vec<_> = targets
            .iter()
            .map(|target| self.fetch(&target.url, target.depth))
            .collect();
        stream::iter(fetches)
            .buffer_unordered(DEFAULT_FETCH_CONCURRENCY)
            .collect()
            .await
    }

    /// Opens a live session for pages that need client-side actions
    fn open_session(&self, session_id: &str) -> Box<dyn BrowserSession>;
}

/// A single-owner live page session
///
/// One session serves repeated polls of one URL and is never shared
/// between concurrent traversals.
#[async_trait]
pub trait BrowserSession: Send {
    fn id(&self) -> &str;

    /// Loads the URL, establishing the session
    async fn navigate(&mut self, url: &Url, depth: u32) -> PageSnapshot;

    /// Runs actions against the already loaded page, without reloading
    async fn run_actions(&mut self, actions: &[TriggerAction]) -> Result<(), FetchError>;

    /// Reads the current content of the page
    ///
    /// Page-level failures come back as an unsuccessful snapshot; `Err` is
    /// reserved for a broken or unusable session.
    async fn snapshot(&mut self) -> Result<PageSnapshot, FetchError>;
}

/// Builds an HTTP client with the configured user agent and timeouts
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.user_agent())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and classifies the failure modes
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx with HTML content type | `Ok((status, body))` |
/// | non-2xx | `FetchError::Http` |
/// | non-HTML content type | `FetchError::ContentMismatch` |
/// | timeout | `FetchError::Timeout` |
/// | connection / TLS / DNS | `FetchError::Network` |
pub async fn fetch_html(client: &Client, url: &Url) -> Result<(u16, String), FetchError> {
    let response = client.get(url.clone()).send().await.map_err(classify_error)?;
    let status = response.status();

    if !status.is_success() {
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Rate limited by {}", url);
        }
        return Err(FetchError::Http {
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_html_content_type(&content_type) {
        return Err(FetchError::ContentMismatch { content_type });
    }

    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Body(e.to_string())
        }
    })?;

    Ok((status.as_u16(), body))
}

fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Network(format!("connection failed: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml")
}

/// reqwest-backed page fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_concurrent: usize,
}

impl HttpFetcher {
    pub fn new(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, crawler.request_timeout())?;
        Ok(Self::with_client(client, crawler.max_concurrent_fetches))
    }

    pub fn with_client(client: Client, max_concurrent: usize) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, depth: u32) -> PageSnapshot {
        tracing::debug!("GET {} (depth {})", url, depth);
        match fetch_html(&self.client, url).await {
            Ok((status, html)) => PageSnapshot::fetched(url.clone(), depth, status, html),
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}", url, e);
                PageSnapshot::failed(url.clone(), depth, e)
            }
        }
    }

    async fn fetch_many(&self, targets: &[CrawlTarget]) -> Vec<PageSnapshot> {
        let fetches: Vec<_> = targets
            .iter()
            .map(|target| self.fetch(&target.url, target.depth))
            .collect();
        stream::iter(fetches)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    fn open_session(&self, session_id: &str) -> Box<dyn BrowserSession> {
        Box::new(HttpSession {
            id: session_id.to_string(),
            client: self.client.clone(),
            current: None,
        })
    }
}

/// Session over plain HTTP
///
/// Plain HTTP cannot execute client-side actions: `run_actions` only logs
/// and `snapshot` re-fetches the current URL.
pub struct HttpSession {
    id: String,
    client: Client,
    current: Option<(Url, u32)>,
}

#[async_trait]
impl BrowserSession for HttpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &Url, depth: u32) -> PageSnapshot {
        self.current = Some((url.clone(), depth));
        match fetch_html(&self.client, url).await {
            Ok((status, html)) => PageSnapshot::fetched(url.clone(), depth, status, html),
            Err(e) => PageSnapshot::failed(url.clone(), depth, e),
        }
    }

    async fn run_actions(&mut self, actions: &[TriggerAction]) -> Result<(), FetchError> {
        if !actions.is_empty() {
            tracing::debug!(
                "Session {}: {} trigger action(s) skipped, HTTP session has no script engine",
                self.id,
                actions.len()
            );
        }
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot, FetchError> {
        let (url, depth) = self
            .current
            .clone()
            .ok_or_else(|| FetchError::Session(format!("{}: snapshot before navigate", self.id)))?;

        Ok(match fetch_html(&self.client, &url).await {
            Ok((status, html)) => PageSnapshot::fetched(url, depth, status, html),
            Err(e) => PageSnapshot::failed(url, depth, e),
        })
    }
}
