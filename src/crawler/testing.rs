//! Scripted fetchers and sessions for tests
//!
//! `ScriptedFetcher` serves pages from an in-memory site map and records
//! every fetch. `ScriptedSession` replays a fixed sequence of page bodies,
//! one per poll, so stabilization can be driven deterministically.

use crate::config::TriggerAction;
use crate::crawler::fetcher::{BrowserSession, FetchError, PageFetcher, PageSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

fn key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn push(log: &Mutex<Vec<String>>, entry: String) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
}

fn read(log: &Mutex<Vec<String>>) -> Vec<String> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Session replaying one body per poll
///
/// Poll 0 is the navigation; each `snapshot` call is the next poll. Once
/// the script runs out, `snapshot` fails with a session error unless the
/// session was built to repeat its last body.
pub struct ScriptedSession {
    id: String,
    bodies: Vec<String>,
    cursor: usize,
    repeat_last: bool,
    fail_navigation: bool,
    current: Option<(Url, u32)>,
    polls: Arc<AtomicUsize>,
    action_runs: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new(id: &str, bodies: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            bodies,
            cursor: 0,
            repeat_last: false,
            fail_navigation: false,
            current: None,
            polls: Arc::new(AtomicUsize::new(0)),
            action_runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bodies of exactly these byte lengths, each tagged `poll-{i}`
    pub fn with_lengths(id: &str, lengths: &[usize]) -> Self {
        let bodies = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let mut body = format!("poll-{}", i);
                body.truncate(len);
                body.push_str(&"x".repeat(len - body.len()));
                body
            })
            .collect();
        Self::new(id, bodies)
    }

    /// Session whose navigation always fails
    pub fn failing(id: &str) -> Self {
        let mut session = Self::new(id, Vec::new());
        session.fail_navigation = true;
        session
    }

    pub fn repeating_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn action_runs(&self) -> usize {
        self.action_runs.load(Ordering::SeqCst)
    }

    fn next_body(&mut self) -> Option<String> {
        let body = match self.bodies.get(self.cursor) {
            Some(body) => body.clone(),
            None if self.repeat_last => self.bodies.last()?.clone(),
            None => return None,
        };
        self.cursor += 1;
        Some(body)
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &Url, depth: u32) -> PageSnapshot {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_navigation {
            return PageSnapshot::failed(
                url.clone(),
                depth,
                FetchError::Network("scripted navigation failure".to_string()),
            );
        }

        self.current = Some((url.clone(), depth));
        match self.next_body() {
            Some(body) => PageSnapshot::fetched(url.clone(), depth, 200, body),
            None => PageSnapshot::failed(url.clone(), depth, FetchError::Http { status: 404 }),
        }
    }

    async fn run_actions(&mut self, _actions: &[TriggerAction]) -> Result<(), FetchError> {
        self.action_runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot, FetchError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let (url, depth) = self
            .current
            .clone()
            .ok_or_else(|| FetchError::Session(format!("{}: snapshot before navigate", self.id)))?;

        self.next_body()
            .map(|body| PageSnapshot::fetched(url, depth, 200, body))
            .ok_or_else(|| FetchError::Session(format!("{}: script exhausted", self.id)))
    }
}

#[derive(Debug, Clone)]
enum ScriptedPage {
    Html(String),
    Status(u16),
}

/// In-memory site map implementing `PageFetcher`
///
/// Unknown URLs answer 404. Live-page scripts registered with
/// `with_live_page` are served to sessions navigating to that URL; other
/// sessions see the static page, repeated on every poll.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, ScriptedPage>,
    live: HashMap<String, Vec<String>>,
    delay: Duration,
    fetch_log: Mutex<Vec<String>>,
    sessions: Mutex<Vec<String>>,
    navigations: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(key(url), ScriptedPage::Html(html.into()));
        self
    }

    /// A page that answers with an HTTP error status
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(key(url), ScriptedPage::Status(status));
        self
    }

    /// Bodies served to a live session, one per poll
    pub fn with_live_page(mut self, url: &str, bodies: Vec<String>) -> Self {
        self.live.insert(key(url), bodies);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// URLs passed to `fetch`, in call order
    pub fn fetched(&self) -> Vec<String> {
        read(&self.fetch_log)
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        let url = key(url);
        self.fetched().iter().filter(|u| **u == url).count()
    }

    /// Ids of the sessions opened so far
    pub fn sessions_opened(&self) -> Vec<String> {
        read(&self.sessions)
    }

    /// URLs navigated to by sessions
    pub fn navigations(&self) -> Vec<String> {
        read(&self.navigations)
    }

    fn page(&self, url: &Url, depth: u32) -> PageSnapshot {
        match self.pages.get(url.as_str()) {
            Some(ScriptedPage::Html(html)) => PageSnapshot::fetched(url.clone(), depth, 200, html.clone()),
            Some(ScriptedPage::Status(status)) => {
                PageSnapshot::failed(url.clone(), depth, FetchError::Http { status: *status })
            }
            None => PageSnapshot::failed(url.clone(), depth, FetchError::Http { status: 404 }),
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, depth: u32) -> PageSnapshot {
        push(&self.fetch_log, url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.page(url, depth)
    }

    fn open_session(&self, session_id: &str) -> Box<dyn BrowserSession> {
        push(&self.sessions, session_id.to_string());

        let mut scripts = self.live.clone();
        for (url, page) in &self.pages {
            if let ScriptedPage::Html(html) = page {
                scripts.entry(url.clone()).or_insert_with(|| vec![html.clone()]);
            }
        }

        Box::new(SiteSession {
            id: session_id.to_string(),
            scripts,
            navigations: Arc::clone(&self.navigations),
            inner: None,
        })
    }
}

/// Session handed out by `ScriptedFetcher`; picks its script on navigation
struct SiteSession {
    id: String,
    scripts: HashMap<String, Vec<String>>,
    navigations: Arc<Mutex<Vec<String>>>,
    inner: Option<ScriptedSession>,
}

#[async_trait]
impl BrowserSession for SiteSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &Url, depth: u32) -> PageSnapshot {
        push(&self.navigations, url.to_string());
        let bodies = self.scripts.get(url.as_str()).cloned().unwrap_or_default();
        let session = self
            .inner
            .insert(ScriptedSession::new(&self.id, bodies).repeating_last());
        session.navigate(url, depth).await
    }

    async fn run_actions(&mut self, actions: &[TriggerAction]) -> Result<(), FetchError> {
        match self.inner.as_mut() {
            Some(session) => session.run_actions(actions).await,
            None => Err(FetchError::Session(format!("{}: no page loaded", self.id))),
        }
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot, FetchError> {
        match self.inner.as_mut() {
            Some(session) => session.snapshot().await,
            None => Err(FetchError::Session(format!("{}: snapshot before navigate", self.id))),
        }
    }
}
