//! Configuration for the extraction pipeline and job dispatch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default User-Agent for outbound requests.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; EmailExtractionBot/0.1; +https://example.org/bot)";

/// Tunables for per-URL pipelines and the worker pool that runs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum per-URL pipelines running at once for one job.
    pub worker_pool_size: usize,

    /// Emails needed at a checkpoint to skip the remaining stages.
    ///
    /// Zero disables early termination. Default: 1.
    pub sufficiency_threshold: usize,

    /// Time budget for one attempt of an HTTP-based stage.
    pub stage_timeout: Duration,

    /// Time budget for one attempt of the headless browser stage.
    pub headless_timeout: Duration,

    /// Time budget for one attempt of the WHOIS stage.
    pub whois_timeout: Duration,

    /// Retries for transient failures within a single stage.
    pub max_retries: u32,

    /// Base delay between retries, doubled on each attempt.
    pub retry_backoff: Duration,

    /// Maximum contact/about pages fetched per URL.
    pub max_contact_pages: usize,

    pub user_agent: String,

    /// WebDriver endpoint for the headless browser stage (e.g. chromedriver).
    ///
    /// `None` makes that stage fail as `unavailable`.
    pub webdriver_url: Option<String>,

    /// WHOIS server queried first; referrals are followed from there.
    pub whois_server: String,

    /// Outbound HTTP requests per second across all pipelines.
    pub requests_per_second: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            sufficiency_threshold: 1,
            stage_timeout: Duration::from_secs(20),
            headless_timeout: Duration::from_secs(45),
            whois_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_contact_pages: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            webdriver_url: None,
            whois_server: "whois.iana.org".to_string(),
            requests_per_second: 5,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    pub fn with_sufficiency_threshold(mut self, threshold: usize) -> Self {
        self.sufficiency_threshold = threshold;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_headless_timeout(mut self, timeout: Duration) -> Self {
        self.headless_timeout = timeout;
        self
    }

    pub fn with_whois_timeout(mut self, timeout: Duration) -> Self {
        self.whois_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_contact_pages(mut self, max: usize) -> Self {
        self.max_contact_pages = max;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.webdriver_url = Some(url.into());
        self
    }

    pub fn with_whois_server(mut self, server: impl Into<String>) -> Self {
        self.whois_server = server.into();
        self
    }

    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps.max(1);
        self
    }
}
