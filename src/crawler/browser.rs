//! Headless Chrome sessions
//!
//! `BrowserFetcher` serves plain pages over HTTP and opens Chrome tabs for
//! pages that need client-side actions ("Load More" buttons, infinite
//! scroll). Only built with the `browser` feature.

use crate::config::{CrawlerConfig, TriggerAction, UserAgentConfig};
use crate::crawler::fetcher::{
    BrowserSession, CrawlTarget, FetchError, HttpFetcher, PageFetcher, PageSnapshot,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

/// Page fetcher that drives live sessions through headless Chrome
pub struct BrowserFetcher {
    http: HttpFetcher,
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

impl BrowserFetcher {
    /// Launches Chrome and spawns its CDP event loop
    pub async fn launch(
        crawler: &CrawlerConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, FetchError> {
        let http = HttpFetcher::new(crawler, user_agent)
            .map_err(|e| FetchError::Session(format!("http client: {}", e)))?;

        let config = BrowserConfig::builder()
            .args(launch_args(user_agent))
            .build()
            .map_err(|e| FetchError::Session(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Session(format!("failed to launch browser: {}", e)))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::info!("Launched headless browser for live sessions");
        Ok(Self {
            http,
            browser: Arc::new(browser),
            handler,
        })
    }
}

impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

fn launch_args(user_agent: &UserAgentConfig) -> Vec<String> {
    vec![
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--no-first-run".to_string(),
        format!("--user-agent={}", user_agent.user_agent()),
    ]
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &Url, depth: u32) -> PageSnapshot {
        self.http.fetch(url, depth).await
    }

    async fn fetch_many(&self, targets: &[CrawlTarget]) -> Vec<PageSnapshot> {
        self.http.fetch_many(targets).await
    }

    fn open_session(&self, session_id: &str) -> Box<dyn BrowserSession> {
        Box::new(ChromeSession {
            id: session_id.to_string(),
            browser: Arc::clone(&self.browser),
            page: None,
            current: None,
        })
    }
}

/// One Chrome tab, opened on first navigation and closed on drop
pub struct ChromeSession {
    id: String,
    browser: Arc<Browser>,
    page: Option<Page>,
    current: Option<(Url, u32)>,
}

impl ChromeSession {
    async fn page(&mut self) -> Result<&Page, FetchError> {
        if self.page.is_none() {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| FetchError::Session(format!("{}: new page: {}", self.id, e)))?;
            self.page = Some(page);
        }
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Session(format!("{}: no page", self.id)))
    }
}

/// Scripts evaluated for `actions`, in order
pub fn action_scripts(actions: &[TriggerAction]) -> Vec<String> {
    actions.iter().map(TriggerAction::to_script).collect()
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &Url, depth: u32) -> PageSnapshot {
        self.current = Some((url.clone(), depth));
        let id = self.id.clone();

        let page = match self.page().await {
            Ok(page) => page,
            Err(e) => return PageSnapshot::failed(url.clone(), depth, e),
        };
        if let Err(e) = page.goto(url.as_str()).await {
            tracing::warn!("Session {}: navigation to {} failed: {}", id, url, e);
            return PageSnapshot::failed(url.clone(), depth, FetchError::Network(e.to_string()));
        }

        match page.content().await {
            Ok(html) => PageSnapshot::fetched(url.clone(), depth, 200, html),
            Err(e) => PageSnapshot::failed(url.clone(), depth, FetchError::Body(e.to_string())),
        }
    }

    async fn run_actions(&mut self, actions: &[TriggerAction]) -> Result<(), FetchError> {
        let id = self.id.clone();
        let page = self.page().await?;

        for script in action_scripts(actions) {
            page.evaluate(script)
                .await
                .map_err(|e| FetchError::Session(format!("{}: action failed: {}", id, e)))?;
        }
        tracing::trace!("Session {}: ran {} action(s)", id, actions.len());
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot, FetchError> {
        let (url, depth) = self
            .current
            .clone()
            .ok_or_else(|| FetchError::Session(format!("{}: snapshot before navigate", self.id)))?;
        let page = self.page().await?;

        Ok(match page.content().await {
            Ok(html) => PageSnapshot::fetched(url, depth, 200, html),
            Err(e) => PageSnapshot::failed(url, depth, FetchError::Body(e.to_string())),
        })
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let id = std::mem::take(&mut self.id);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("Session {}: closing page failed: {}", id, e);
                }
            });
        }
    }
}
