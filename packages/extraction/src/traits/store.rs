//! Storage traits for jobs and quota counters.
//!
//! - `JobStore`: durable job snapshots, written incrementally
//! - `QuotaGuard`: atomic check-and-increment of daily usage

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    job::{Job, JobId, OwnerId},
    quota::{Admission, Caller, QuotaRecord},
};

/// Durable storage for jobs and their results.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Overwrite the stored snapshot of an existing job.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Get a job by id.
    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Jobs for one owner, newest first.
    async fn list_jobs(&self, owner: &OwnerId, limit: usize, offset: usize) -> Result<Vec<Job>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Per-owner daily quota with atomic admission.
///
/// `admit` must check and charge in one indivisible step: concurrent calls
/// for one owner never push `used` past a finite limit.
#[async_trait]
pub trait QuotaGuard: Send + Sync {
    /// Admit a batch of `requested` URLs, charging it only if it fits whole.
    async fn admit(&self, caller: &Caller, requested: u32) -> Result<Admission>;

    /// Current usage for the caller's day.
    async fn status(&self, caller: &Caller) -> Result<QuotaRecord>;
}
