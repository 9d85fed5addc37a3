//! Wiring of the extraction library into the server.
//!
//! Builds the network-facing stage dependencies (HTTP fetcher, optional
//! WebDriver renderer, WHOIS client) from configuration and picks the
//! storage backend.

use std::sync::Arc;

use anyhow::{Context, Result};
use email_extraction::{
    FetcherExt, HttpFetcher, JobManager, JobStore, MemoryQuotaGuard, MemoryStore, Orchestrator,
    PageFetcher, PageRenderer, PipelineConfig, PostgresStore, QuotaGuard, TcpWhoisClient,
    ValidatedFetcher, WebDriverRenderer, WhoisClient,
};

/// Job and quota persistence chosen at startup.
#[derive(Clone)]
pub struct Storage {
    pub jobs: Arc<dyn JobStore>,
    pub quota: Arc<dyn QuotaGuard>,
    pub backend: &'static str,
}

impl Storage {
    /// Process-local storage; jobs and quotas are lost on restart.
    pub fn in_memory() -> Self {
        Self {
            jobs: Arc::new(MemoryStore::new()),
            quota: Arc::new(MemoryQuotaGuard::new()),
            backend: "memory",
        }
    }
}

/// Connect to Postgres when a URL is configured, otherwise keep state in memory.
///
/// This will run extraction library migrations on the database.
pub async fn create_storage(database_url: Option<&str>) -> Result<Storage> {
    match database_url {
        Some(url) => {
            let store = Arc::new(
                PostgresStore::new(url)
                    .await
                    .context("Failed to connect to database")?,
            );
            Ok(Storage {
                jobs: store.clone(),
                quota: store,
                backend: "postgres",
            })
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Ok(Storage::in_memory())
        }
    }
}

/// Build the job manager with real network stages.
///
/// Outbound fetches are SSRF-validated and rate limited. The headless stage
/// is only backed by a browser when `webdriver_url` is configured.
pub fn build_job_manager(config: &PipelineConfig, storage: &Storage) -> Result<JobManager> {
    let http = HttpFetcher::from_config(config).context("Failed to build HTTP client")?;
    let fetcher: Arc<dyn PageFetcher> =
        Arc::new(ValidatedFetcher::new(http).rate_limited(config.requests_per_second));

    let renderer: Option<Arc<dyn PageRenderer>> = config.webdriver_url.as_ref().map(|url| {
        tracing::info!(webdriver_url = %url, "Headless browser stage enabled");
        Arc::new(WebDriverRenderer::new(url.clone(), config.user_agent.clone())) as Arc<dyn PageRenderer>
    });
    if renderer.is_none() {
        tracing::warn!("WEBDRIVER_URL not set, puppeteer_scan will report unavailable");
    }

    let whois: Arc<dyn WhoisClient> = Arc::new(TcpWhoisClient::new(
        config.whois_server.clone(),
        config.whois_timeout,
    ));

    let orchestrator = Orchestrator::standard(fetcher, renderer, whois, config.clone());
    Ok(JobManager::new(
        storage.jobs.clone(),
        storage.quota.clone(),
        orchestrator,
    ))
}
