//! Job entity and its aggregate status rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{ResultStatus, UrlResult};
use crate::error::StageError;

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Time-ordered id so that newer jobs sort later.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of the caller that owns a job. Supplied by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job-level aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Aggregate per-URL statuses into a job status.
    ///
    /// `completed` once every result is terminal and at least one did not
    /// fail, `failed` once every result failed, `processing` otherwise.
    pub fn aggregate(results: &[UrlResult]) -> JobStatus {
        if results.is_empty() || results.iter().any(|r| !r.is_terminal()) {
            return JobStatus::Processing;
        }
        if results.iter().all(|r| r.status == ResultStatus::Failed) {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extraction request spanning one or more target URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub urls: Vec<String>,
    pub status: JobStatus,
    pub results: Vec<UrlResult>,
    pub total_emails: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - created_at` in milliseconds, present once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job with one pending result per URL.
    pub fn new(owner_id: OwnerId, urls: Vec<String>) -> Self {
        let results = urls.iter().map(UrlResult::new).collect();
        Self {
            id: JobId::new(),
            owner_id,
            urls,
            status: JobStatus::Queued,
            results,
            total_emails: 0,
            created_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            cancelled_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move a queued job into processing.
    pub fn mark_processing(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
        }
    }

    /// Replace the result at `index` and re-aggregate.
    ///
    /// Ignored once the job is terminal. Returns `true` when this update made
    /// the job terminal.
    pub fn apply_result(&mut self, index: usize, result: UrlResult) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self.results.get_mut(index) {
            Some(slot) => *slot = result,
            None => return false,
        }
        self.recompute()
    }

    /// Fail every result that has not reached a terminal state.
    pub fn abandon_unfinished(&mut self, error: StageError) -> bool {
        if self.is_terminal() {
            return false;
        }
        for result in self.results.iter_mut().filter(|r| !r.is_terminal()) {
            result.abandon(error.clone());
        }
        self.recompute()
    }

    /// Recompute `total_emails` and `status`, stamping completion exactly once.
    ///
    /// Returns `true` when the job became terminal in this call.
    pub fn recompute(&mut self) -> bool {
        let unique: IndexSet<&str> = self
            .results
            .iter()
            .flat_map(|r| r.emails.iter().map(String::as_str))
            .collect();
        self.total_emails = unique.len();

        if self.is_terminal() {
            return false;
        }
        let status = JobStatus::aggregate(&self.results);
        if status == JobStatus::Processing && self.status == JobStatus::Queued {
            let started = self.results.iter().any(|r| r.status != ResultStatus::Pending);
            if !started {
                return false;
            }
        }
        self.status = status;

        if status.is_terminal() && self.completed_at.is_none() {
            let now = Utc::now();
            self.completed_at = Some(now);
            self.duration_ms = Some((now - self.created_at).num_milliseconds());
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::progress::{StageStatus, Step};

    fn finished(url: &str, status: StageStatus, emails: &[&str]) -> UrlResult {
        let mut result = UrlResult::new(url);
        result.add_emails(emails.iter().copied());
        result.progress.start(Step::HomepageScan, "x").unwrap();
        result
            .progress
            .finish(Step::HomepageScan, status, "x", 1, None)
            .unwrap();
        result.progress.complete(status, "done", 1).unwrap();
        result.refresh_status();
        result
    }

    fn job(urls: &[&str]) -> Job {
        Job::new(
            OwnerId::new("owner"),
            urls.iter().map(|u| u.to_string()).collect(),
        )
    }

    #[test]
    fn new_job_is_queued_with_pending_results() {
        let job = job(&["https://a.com", "https://b.com"]);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.results.len(), 2);
        assert!(job.results.iter().all(|r| r.status == ResultStatus::Pending));
        assert!(job.duration_ms.is_none());
    }

    #[test]
    fn completes_when_all_terminal_and_one_succeeded() {
        let mut job = job(&["https://a.com", "https://b.com"]);
        job.mark_processing();

        assert!(!job.apply_result(0, finished("https://a.com", StageStatus::Failed, &[])));
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.completed_at.is_none());

        assert!(job.apply_result(
            1,
            finished("https://b.com", StageStatus::Completed, &[])
        ));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.duration_ms.is_some());
    }

    #[test]
    fn fails_when_every_result_failed() {
        let mut job = job(&["https://a.com"]);
        job.mark_processing();
        job.apply_result(0, finished("https://a.com", StageStatus::Failed, &[]));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn total_emails_counts_unique_across_results() {
        let mut job = job(&["https://a.com", "https://b.com"]);
        job.mark_processing();
        job.apply_result(
            0,
            finished("https://a.com", StageStatus::Completed, &["x@a.com", "shared@a.com"]),
        );
        job.apply_result(
            1,
            finished("https://b.com", StageStatus::Completed, &["shared@a.com"]),
        );
        assert_eq!(job.total_emails, 2);
    }

    #[test]
    fn terminal_job_ignores_late_updates() {
        let mut job = job(&["https://a.com"]);
        job.mark_processing();
        job.apply_result(0, finished("https://a.com", StageStatus::Completed, &[]));
        let completed_at = job.completed_at;

        assert!(!job.apply_result(
            0,
            finished("https://a.com", StageStatus::Completed, &["late@a.com"])
        ));
        assert_eq!(job.completed_at, completed_at);
        assert_eq!(job.total_emails, 0);
    }

    #[test]
    fn abandon_unfinished_makes_job_terminal() {
        let mut job = job(&["https://a.com", "https://b.com"]);
        job.mark_processing();
        job.apply_result(0, finished("https://a.com", StageStatus::Completed, &["x@a.com"]));

        assert!(job.abandon_unfinished(StageError::cancelled()));
        assert_eq!(job.results[1].status, ResultStatus::Failed);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn job_id_round_trips_through_string() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
