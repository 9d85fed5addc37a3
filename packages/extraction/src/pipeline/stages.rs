//! Stage executors: one extraction technique each, all behind one interface.

use async_trait::async_trait;
use indexmap::IndexSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::links::{discover_contact_links, fallback_contact_urls};
use crate::error::{StageError, StageResult};
use crate::extract::{extract_emails, whois_contact_emails};
use crate::ingest::url::registrable_host;
use crate::traits::{fetcher::PageFetcher, renderer::PageRenderer, whois::WhoisClient};
use crate::types::config::PipelineConfig;
use crate::types::page::FetchedPage;
use crate::types::progress::Step;

/// What a stage can see: the target, what earlier stages found, and the
/// homepage if it was fetched.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub url: String,
    pub emails_so_far: IndexSet<String>,
    pub homepage: Option<FetchedPage>,
}

impl StageContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            emails_so_far: IndexSet::new(),
            homepage: None,
        }
    }
}

/// What a stage returns. Stages never write storage or progress themselves.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub emails: IndexSet<String>,
    pub message: String,
    /// Page fetched by this stage, handed to later stages.
    pub page: Option<FetchedPage>,
}

impl StageOutput {
    pub fn new(emails: IndexSet<String>, message: impl Into<String>) -> Self {
        Self {
            emails,
            message: message.into(),
            page: None,
        }
    }
}

/// One step of the per-URL pipeline.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn step(&self) -> Step;

    /// Time budget for one attempt of this stage.
    fn time_budget(&self, config: &PipelineConfig) -> Duration {
        config.stage_timeout
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult<StageOutput>;
}

fn found(count: usize) -> String {
    match count {
        1 => "1 email".to_string(),
        n => format!("{n} emails"),
    }
}

/// Fetch the target's root page.
pub struct HomepageScan {
    fetcher: Arc<dyn PageFetcher>,
}

impl HomepageScan {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl StageExecutor for HomepageScan {
    fn step(&self) -> Step {
        Step::HomepageScan
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult<StageOutput> {
        let page = self.fetcher.fetch(&ctx.url).await?;
        let message = format!("Fetched homepage ({} bytes)", page.html.len());
        Ok(StageOutput {
            emails: IndexSet::new(),
            message,
            page: Some(page),
        })
    }
}

/// Match emails in the homepage fetched by `HomepageScan`.
#[derive(Default)]
pub struct HomepageEmailExtraction;

#[async_trait]
impl StageExecutor for HomepageEmailExtraction {
    fn step(&self) -> Step {
        Step::HomepageEmailExtraction
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult<StageOutput> {
        let homepage = ctx
            .homepage
            .as_ref()
            .ok_or_else(|| StageError::unavailable("homepage was not fetched"))?;
        let emails = extract_emails(&homepage.html);
        let message = format!("Found {} on homepage", found(emails.len()));
        Ok(StageOutput::new(emails, message))
    }
}

/// Fetch contact/about pages and match emails in them.
pub struct ContactPages {
    fetcher: Arc<dyn PageFetcher>,
    max_pages: usize,
}

impl ContactPages {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_pages: usize) -> Self {
        Self {
            fetcher,
            max_pages: max_pages.max(1),
        }
    }

    fn candidates(&self, ctx: &StageContext) -> Vec<String> {
        let discovered = ctx
            .homepage
            .as_ref()
            .map(|page| discover_contact_links(page, self.max_pages))
            .unwrap_or_default();
        if discovered.is_empty() {
            fallback_contact_urls(&ctx.url, self.max_pages)
        } else {
            discovered
        }
    }
}

#[async_trait]
impl StageExecutor for ContactPages {
    fn step(&self) -> Step {
        Step::ContactPages
    }

    /// Pages are fetched one after another, so the budget scales with the cap.
    fn time_budget(&self, config: &PipelineConfig) -> Duration {
        config.stage_timeout.saturating_mul(self.max_pages as u32)
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult<StageOutput> {
        let candidates = self.candidates(ctx);
        let mut emails = IndexSet::new();
        let mut reached = 0usize;
        let mut scanned = 0usize;
        let mut last_error = None;

        for url in &candidates {
            match self.fetcher.fetch(url).await {
                Ok(page) => {
                    reached += 1;
                    scanned += 1;
                    emails.extend(extract_emails(&page.html));
                }
                // The site answered; the page just isn't there
                Err(e) if e.status.is_some() => {
                    reached += 1;
                    debug!(url = %url, error = %e, "Contact page not available");
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Contact page fetch failed");
                    last_error = Some(e);
                }
            }
        }

        if reached == 0 {
            return Err(last_error
                .unwrap_or_else(|| StageError::unavailable("no contact pages to scan")));
        }

        let message = format!(
            "Scanned {scanned} of {} contact pages, found {}",
            candidates.len(),
            found(emails.len())
        );
        Ok(StageOutput::new(emails, message))
    }
}

/// Render the target in a headless browser and match emails in the live DOM.
pub struct HeadlessScan {
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl HeadlessScan {
    pub fn new(renderer: Option<Arc<dyn PageRenderer>>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl StageExecutor for HeadlessScan {
    fn step(&self) -> Step {
        Step::PuppeteerScan
    }

    fn time_budget(&self, config: &PipelineConfig) -> Duration {
        config.headless_timeout
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult<StageOutput> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| StageError::unavailable("no headless browser configured"))?;
        let page = renderer.render(&ctx.url).await?;
        let emails = extract_emails(&page.html);
        let message = format!("Found {} in rendered page", found(emails.len()));
        Ok(StageOutput::new(emails, message))
    }
}

/// Query WHOIS for registrant, admin and tech contacts.
pub struct WhoisLookup {
    client: Arc<dyn WhoisClient>,
}

impl WhoisLookup {
    pub fn new(client: Arc<dyn WhoisClient>) -> Self {
        Self { client }
    }
}

/// Second-level labels under which registrations happen one level deeper (example.co.uk).
const SHARED_SLDS: &[&str] = &["co", "com", "net", "org", "ac", "gov", "edu", "ltd", "plc"];

/// Domain to send to WHOIS for a host: the registered name, not a subdomain.
pub fn whois_domain(host: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let n = labels.len();
    let keep = if n >= 3 && labels[n - 1].len() == 2 && SHARED_SLDS.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    Some(labels[n - keep.min(n)..].join("."))
}

#[async_trait]
impl StageExecutor for WhoisLookup {
    fn step(&self) -> Step {
        Step::WhoisLookup
    }

    fn time_budget(&self, config: &PipelineConfig) -> Duration {
        config.whois_timeout
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult<StageOutput> {
        let domain = registrable_host(&ctx.url)
            .and_then(|host| whois_domain(&host))
            .ok_or_else(|| StageError::unavailable("WHOIS needs a domain name"))?;
        let record = self.client.lookup(&domain).await?;
        let emails = whois_contact_emails(&record);
        let message = format!("Found {} in WHOIS record for {domain}", found(emails.len()));
        Ok(StageOutput::new(emails, message))
    }
}

/// The canonical stage sequence.
pub fn standard_stages(
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
    whois: Arc<dyn WhoisClient>,
    config: &PipelineConfig,
) -> Vec<Arc<dyn StageExecutor>> {
    vec![
        Arc::new(HomepageScan::new(fetcher.clone())),
        Arc::new(HomepageEmailExtraction),
        Arc::new(ContactPages::new(fetcher, config.max_contact_pages)),
        Arc::new(HeadlessScan::new(renderer)),
        Arc::new(WhoisLookup::new(whois)),
    ]
}
