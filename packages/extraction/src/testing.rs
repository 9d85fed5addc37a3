//! Testing utilities including mock implementations.
//!
//! These are useful for exercising pipelines and job management without
//! touching the network, a browser or a WHOIS server.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::error::{StageError, StageResult};
use crate::pipeline::orchestrator::ProgressSink;
use crate::traits::{fetcher::PageFetcher, renderer::PageRenderer, store::JobStore, whois::WhoisClient};
use crate::types::job::{Job, JobId};
use crate::types::page::FetchedPage;
use crate::types::result::UrlResult;

fn key(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Clone)]
enum MockResponse {
    Page(FetchedPage),
    Status(u16),
}

/// A mock fetcher serving canned pages.
///
/// Unknown URLs answer 404, so the mock behaves like a reachable site unless
/// a prefix is marked unreachable. Clones share state, which lets a test keep
/// a handle for assertions after moving the fetcher into a stage.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<RwLock<HashMap<String, MockResponse>>>,
    unreachable: Arc<RwLock<Vec<String>>>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), html);
        self.responses
            .write()
            .unwrap()
            .insert(key(&url), MockResponse::Page(page));
        self
    }

    /// Serve `html` for `url` as if the request was redirected to `final_url`.
    pub fn with_redirect(
        self,
        url: impl Into<String>,
        final_url: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), html).with_final_url(final_url);
        self.responses
            .write()
            .unwrap()
            .insert(key(&url), MockResponse::Page(page));
        self
    }

    /// Answer `url` with a non-2xx status.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(key(&url.into()), MockResponse::Status(status));
        self
    }

    /// Every URL starting with `prefix` fails as unreachable.
    pub fn unreachable(self, prefix: impl Into<String>) -> Self {
        self.unreachable.write().unwrap().push(prefix.into());
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> StageResult<FetchedPage> {
        self.requests.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let down = self
            .unreachable
            .read()
            .unwrap()
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()));
        if down {
            return Err(StageError::unreachable(format!("connection refused: {url}")));
        }

        let response = self.responses.read().unwrap().get(&key(url)).cloned();
        match response {
            Some(MockResponse::Page(page)) => Ok(page),
            Some(MockResponse::Status(status)) => Err(StageError::http_status(status, url)),
            None => Err(StageError::http_status(404, url)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A mock headless renderer. Unknown URLs render as an empty document.
#[derive(Clone, Default)]
pub struct MockRenderer {
    pages: Arc<RwLock<HashMap<String, String>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(key(&url.into()), html.into());
        self
    }
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn render(&self, url: &str) -> StageResult<FetchedPage> {
        let html = self.pages.read().unwrap().get(&key(url)).cloned().unwrap_or_default();
        Ok(FetchedPage::new(url, html))
    }
}

/// A mock WHOIS client. Unknown domains return an empty record.
#[derive(Clone, Default)]
pub struct MockWhois {
    records: Arc<RwLock<HashMap<String, String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockWhois {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, domain: impl Into<String>, record: impl Into<String>) -> Self {
        self.records.write().unwrap().insert(domain.into(), record.into());
        self
    }

    /// Lookups for `domain` fail as unreachable.
    pub fn failing(self, domain: impl Into<String>) -> Self {
        self.failing.write().unwrap().insert(domain.into());
        self
    }

    /// Domains looked up so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhoisClient for MockWhois {
    async fn lookup(&self, domain: &str) -> StageResult<String> {
        self.queries.lock().unwrap().push(domain.to_string());

        if self.failing.read().unwrap().contains(domain) {
            return Err(StageError::unreachable(format!("whois server unreachable for {domain}")));
        }

        Ok(self.records.read().unwrap().get(domain).cloned().unwrap_or_default())
    }
}

/// Records every snapshot a pipeline publishes.
#[derive(Clone, Default)]
pub struct RecordingSink {
    snapshots: Arc<Mutex<Vec<UrlResult>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<UrlResult> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn publish(&self, result: &UrlResult) {
        self.snapshots.lock().unwrap().push(result.clone());
    }
}

/// Poll `store` until the job is terminal or `timeout` elapses.
///
/// Returns the last stored state either way.
pub async fn wait_for_terminal(store: &dyn JobStore, id: JobId, timeout: Duration) -> Option<Job> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = store.get_job(id).await.ok().flatten();
        let done = job.as_ref().map(Job::is_terminal).unwrap_or(false);
        if done || tokio::time::Instant::now() >= deadline {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
