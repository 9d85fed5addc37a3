//! Email Extraction Library
//!
//! Finds contact email addresses for websites. Each submitted URL runs
//! through a fixed sequence of increasingly expensive stages, stopping early
//! once enough addresses are found. Jobs group URLs, are admitted against a
//! per-owner daily quota and can be exported as CSV when finished.
//!
//! # Pipeline
//!
//! ```text
//! homepage_scan → homepage_email_extraction → contact_pages
//!     → puppeteer_scan → whois_lookup → extraction_complete
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use email_extraction::{
//!     Caller, Entitlements, HttpFetcher, JobManager, MemoryQuotaGuard, MemoryStore,
//!     Orchestrator, PipelineConfig, TcpWhoisClient, UrlInput,
//! };
//!
//! let config = PipelineConfig::default();
//! let fetcher = Arc::new(HttpFetcher::from_config(&config)?);
//! let whois = Arc::new(TcpWhoisClient::new(config.whois_server.clone(), config.whois_timeout));
//! let orchestrator = Orchestrator::standard(fetcher, None, whois, config);
//!
//! let manager = JobManager::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryQuotaGuard::new()),
//!     orchestrator,
//! );
//!
//! let caller = Caller::new("owner-1", Entitlements::default());
//! let job = manager.create_job(&caller, UrlInput::Single("example.com".into())).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams for fetching, rendering, WHOIS and storage
//! - [`types`] - Jobs, results, progress logs, quota records, config
//! - [`ingest`] - URL normalization and CSV upload parsing
//! - [`extract`] - Email matching
//! - [`pipeline`] - Stage executors and the per-URL orchestrator
//! - [`jobs`] - Job manager and CSV export
//! - [`fetchers`] - HTTP, WebDriver and WHOIS implementations
//! - [`stores`] - In-memory and Postgres persistence
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod extract;
pub mod fetchers;
pub mod ingest;
pub mod jobs;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{JobError, ParseError, Result, SecurityError, StageError, StageErrorKind};
pub use traits::{
    fetcher::{PageFetcher, UrlValidator, ValidatedFetcher},
    renderer::PageRenderer,
    store::{JobStore, QuotaGuard},
    whois::WhoisClient,
};
pub use types::{
    config::PipelineConfig,
    job::{Job, JobId, JobStatus, OwnerId},
    page::FetchedPage,
    progress::{ProgressEntry, ProgressLog, StageStatus, Step},
    quota::{Admission, Caller, DenialReason, Entitlements, QuotaLimit, QuotaRecord},
    result::{ResultStatus, UrlResult},
};

pub use extract::extract_emails;
pub use fetchers::{FetcherExt, HttpFetcher, RateLimitedFetcher, TcpWhoisClient, WebDriverRenderer};
pub use ingest::{normalize_url, parse_csv, parse_url_list};
pub use jobs::{export_csv, JobManager, UrlInput};
pub use pipeline::{
    NullSink, Orchestrator, ProgressSink, RetryPolicy, StageExecutor, SufficiencyThreshold,
    TerminationPolicy,
};
pub use stores::{MemoryQuotaGuard, MemoryStore};

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;
