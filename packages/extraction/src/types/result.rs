//! Per-URL outcome within a job.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::progress::{ProgressLog, StageStatus, Step};
use crate::error::StageError;

/// Status of a single URL's extraction, derived from its progress log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Completed | ResultStatus::Failed)
    }
}

/// Emails found for one target URL, plus the progress of its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlResult {
    pub url: String,
    /// Unique, lower-cased, in discovery order.
    pub emails: IndexSet<String>,
    pub progress: ProgressLog,
    pub status: ResultStatus,
    /// Checkpoint after which the sufficiency policy ended the pipeline early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_exit_after: Option<Step>,
}

impl UrlResult {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            emails: IndexSet::new(),
            progress: ProgressLog::new(),
            status: ResultStatus::Pending,
            early_exit_after: None,
        }
    }

    /// Merge newly found emails, returning how many were not already known.
    pub fn add_emails<I, S>(&mut self, emails: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.emails.len();
        for email in emails {
            self.emails.insert(email.as_ref().to_lowercase());
        }
        self.emails.len() - before
    }

    /// Recompute `status` from the progress log.
    pub fn refresh_status(&mut self) {
        self.status = match self.progress.last() {
            None => ResultStatus::Pending,
            Some(entry) if entry.step == Step::ExtractionComplete => match entry.status {
                StageStatus::Completed => ResultStatus::Completed,
                _ => ResultStatus::Failed,
            },
            Some(_) => ResultStatus::Running,
        };
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Close out a result that never reached `extraction_complete` on its own.
    ///
    /// A stage still marked running is failed with `error`.
    pub fn abandon(&mut self, error: StageError) {
        if self.progress.is_complete() {
            return;
        }
        let message = error.to_string();
        let running = self
            .progress
            .last()
            .filter(|entry| entry.status == StageStatus::Running)
            .map(|entry| entry.step);
        if let Some(step) = running {
            if let Err(e) = self.progress.finish(
                step,
                StageStatus::Failed,
                message.clone(),
                0,
                Some(error.clone()),
            ) {
                warn!(url = %self.url, error = %e, "Could not fail running stage");
            }
        }
        if let Err(e) = self
            .progress
            .complete_with_error(StageStatus::Failed, message, 0, Some(error))
        {
            warn!(url = %self.url, error = %e, "Could not close progress log");
        }
        self.refresh_status();
    }
}
