//! Job admission, dispatch and lifecycle.
//!
//! The `JobManager` is the only writer of job records. Each admitted job gets
//! one tokio task that fans its URLs out to orchestrator runs, at most
//! `worker_pool_size` at a time. Orchestrators publish progress snapshots to
//! a per-URL sink which folds them into the shared job and persists it.
//!
//! ```text
//! create_job
//!     ├─► resolve URLs (single / list / CSV)
//!     ├─► QuotaGuard::admit (all-or-nothing)
//!     ├─► JobStore::create_job
//!     └─► spawn run_job
//!             ├─► Orchestrator::run per URL (bounded)
//!             │       └─► JobSink::publish → Job::apply_result → save_job
//!             └─► abandon anything unfinished → save_job
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::export::export_csv;
use crate::error::{JobError, Result, StageError};
use crate::ingest::{normalize_url, parse_csv, parse_url_list};
use crate::pipeline::orchestrator::{Orchestrator, ProgressSink};
use crate::traits::store::{JobStore, QuotaGuard};
use crate::types::job::{Job, JobId, OwnerId};
use crate::types::quota::{Admission, Caller, QuotaRecord};
use crate::types::result::UrlResult;

/// Upper bound on `list_jobs` page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// How a caller submitted their target URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlInput {
    /// One URL.
    Single(String),
    /// Newline (or comma) separated URLs.
    List(String),
    /// Raw bytes of an uploaded CSV file.
    Csv(Vec<u8>),
}

type SharedJob = Arc<tokio::sync::Mutex<Job>>;

#[derive(Clone)]
struct RunningJob {
    cancel: CancellationToken,
    job: SharedJob,
}

/// Creates, runs, cancels and exports extraction jobs.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
    quota: Arc<dyn QuotaGuard>,
    orchestrator: Orchestrator,
    worker_pool_size: usize,
    running: Arc<Mutex<HashMap<JobId, RunningJob>>>,
    shutdown: CancellationToken,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        quota: Arc<dyn QuotaGuard>,
        orchestrator: Orchestrator,
    ) -> Self {
        let worker_pool_size = orchestrator.config().worker_pool_size.max(1);
        Self {
            store,
            quota,
            orchestrator,
            worker_pool_size,
            running: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the number of URL pipelines run concurrently per job.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Number of jobs currently being processed by this manager.
    pub fn running_jobs(&self) -> usize {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Admit and start a new job.
    ///
    /// Nothing is created or charged when the input is unusable or the
    /// caller's quota cannot cover every URL in the batch.
    pub async fn create_job(&self, caller: &Caller, input: UrlInput) -> Result<Job> {
        let urls = resolve_urls(caller, input)?;
        let requested = u32::try_from(urls.len()).unwrap_or(u32::MAX);

        match self.quota.admit(caller, requested).await? {
            Admission::Allowed { used, remaining } => {
                debug!(owner_id = %caller.owner_id, requested, used, remaining = ?remaining, "Quota admitted");
            }
            Admission::Denied(reason) => {
                warn!(owner_id = %caller.owner_id, requested, reason = %reason, "Quota denied");
                return Err(JobError::QuotaExceeded(reason));
            }
        }

        let job = Job::new(caller.owner_id.clone(), urls);
        self.store.create_job(&job).await?;
        info!(job_id = %job.id, owner_id = %job.owner_id, urls = job.urls.len(), "Job created");

        self.dispatch(job.clone());
        Ok(job)
    }

    /// Fetch a job owned by `owner`.
    pub async fn get_job(&self, owner: &OwnerId, id: JobId) -> Result<Job> {
        self.store
            .get_job(id)
            .await?
            .filter(|job| &job.owner_id == owner)
            .ok_or(JobError::NotFound { job_id: id })
    }

    /// An owner's jobs, newest first.
    pub async fn list_jobs(&self, owner: &OwnerId, limit: usize, offset: usize) -> Result<Vec<Job>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.store.list_jobs(owner, limit, offset).await
    }

    /// Cancel a job.
    ///
    /// In-flight pipelines are aborted and every unfinished result fails as
    /// `cancelled`. Cancelling a terminal job returns it unchanged; cancelling
    /// twice is the same as cancelling once.
    pub async fn cancel_job(&self, owner: &OwnerId, id: JobId) -> Result<Job> {
        let stored = self.get_job(owner, id).await?;
        if stored.is_terminal() {
            debug!(job_id = %id, status = %stored.status, "Cancel on terminal job ignored");
            return Ok(stored);
        }

        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned();

        match running {
            Some(running) => {
                // Stamp before aborting so pipelines cannot finish the job first
                let mut job = running.job.lock().await;
                if stamp_cancelled(&mut job) {
                    self.store.save_job(&job).await?;
                }
                running.cancel.cancel();
                info!(job_id = %id, status = %job.status, "Job cancelled");
                Ok(job.clone())
            }
            None => {
                // Not running here (e.g. left behind by a previous process)
                let mut job = stored;
                if stamp_cancelled(&mut job) {
                    self.store.save_job(&job).await?;
                }
                info!(job_id = %id, status = %job.status, "Orphaned job cancelled");
                Ok(job)
            }
        }
    }

    pub async fn quota_status(&self, caller: &Caller) -> Result<QuotaRecord> {
        self.quota.status(caller).await
    }

    /// CSV export of a finished job.
    pub async fn export(&self, owner: &OwnerId, id: JobId) -> Result<Vec<u8>> {
        let job = self.get_job(owner, id).await?;
        export_csv(&job)
    }

    /// Stop every running job; used on server shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait until no job is running, up to `timeout`. Returns whether it drained.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.running_jobs() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(running = self.running_jobs(), "Jobs still running at deadline");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    fn dispatch(&self, job: Job) {
        let id = job.id;
        let running = RunningJob {
            cancel: self.shutdown.child_token(),
            job: Arc::new(tokio::sync::Mutex::new(job)),
        };
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, running.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job(id, running).await;
            manager
                .running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
        });
    }

    async fn run_job(&self, id: JobId, running: RunningJob) {
        let urls = {
            let mut job = running.job.lock().await;
            job.mark_processing();
            self.persist(&job).await;
            job.urls.clone()
        };
        info!(job_id = %id, urls = urls.len(), workers = self.worker_pool_size, "Job processing");

        let mut in_flight = FuturesUnordered::new();
        for (index, url) in urls.into_iter().enumerate() {
            while in_flight.len() >= self.worker_pool_size {
                if let Some(joined) = in_flight.next().await {
                    log_join(id, joined);
                }
            }
            if running.cancel.is_cancelled() {
                break;
            }

            let sink = JobSink {
                index,
                job: running.job.clone(),
                store: self.store.clone(),
            };
            let orchestrator = self.orchestrator.clone();
            let cancel = running.cancel.clone();
            in_flight.push(tokio::spawn(async move {
                orchestrator.run(&url, &sink, &cancel).await
            }));
        }

        while let Some(joined) = in_flight.next().await {
            log_join(id, joined);
        }

        let mut job = running.job.lock().await;
        let error = if running.cancel.is_cancelled() {
            StageError::cancelled()
        } else {
            StageError::unavailable("pipeline stopped before completing")
        };
        if job.abandon_unfinished(error) {
            self.persist(&job).await;
        }
        info!(
            job_id = %id,
            status = %job.status,
            total_emails = job.total_emails,
            duration_ms = ?job.duration_ms,
            "Job finished"
        );
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.store.save_job(job).await {
            error!(job_id = %job.id, error = %e, "Failed to save job");
        }
    }
}

/// Mark a job cancelled and fail its unfinished results.
///
/// Returns `false` when the job was already terminal.
fn stamp_cancelled(job: &mut Job) -> bool {
    if job.is_terminal() {
        return false;
    }
    job.cancelled_at.get_or_insert_with(Utc::now);
    job.abandon_unfinished(StageError::cancelled());
    true
}

fn log_join(id: JobId, joined: std::result::Result<UrlResult, tokio::task::JoinError>) {
    match joined {
        Ok(result) => debug!(job_id = %id, url = %result.url, status = ?result.status, "URL pipeline joined"),
        Err(e) => error!(job_id = %id, error = %e, "URL pipeline task failed"),
    }
}

/// Turn caller input into a normalized, de-duplicated URL list.
fn resolve_urls(caller: &Caller, input: UrlInput) -> Result<Vec<String>> {
    let urls = match input {
        UrlInput::Single(raw) => match normalize_url(&raw) {
            Some(url) => vec![url],
            None => return Err(JobError::invalid_input(format!("not a website URL: {}", raw.trim()))),
        },
        UrlInput::List(text) => parse_url_list(&text),
        UrlInput::Csv(bytes) => {
            if !caller.entitlements.can_use_csv_upload {
                return Err(JobError::CsvUploadNotAllowed);
            }
            parse_csv(&bytes)?
        }
    };

    if urls.is_empty() {
        return Err(JobError::invalid_input("no usable URLs provided"));
    }
    Ok(urls)
}

/// Folds one URL's progress snapshots into the shared job.
struct JobSink {
    index: usize,
    job: SharedJob,
    store: Arc<dyn JobStore>,
}

#[async_trait]
impl ProgressSink for JobSink {
    async fn publish(&self, result: &UrlResult) {
        let mut job = self.job.lock().await;
        if job.is_terminal() {
            return;
        }
        if job.apply_result(self.index, result.clone()) {
            info!(job_id = %job.id, status = %job.status, total_emails = job.total_emails, "Job reached terminal status");
        }
        if let Err(e) = self.store.save_job(&job).await {
            error!(job_id = %job.id, error = %e, "Failed to save progress");
        }
    }
}
