//! Pipeline steps and the per-result progress log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StageError;

/// One extraction technique, in canonical pipeline order.
///
/// The derived `Ord` follows declaration order, which is the order stages run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    HomepageScan,
    HomepageEmailExtraction,
    ContactPages,
    PuppeteerScan,
    WhoisLookup,
    ExtractionComplete,
}

impl Step {
    /// Every step, in the order they appear in a progress log.
    pub const CANONICAL: [Step; 6] = [
        Step::HomepageScan,
        Step::HomepageEmailExtraction,
        Step::ContactPages,
        Step::PuppeteerScan,
        Step::WhoisLookup,
        Step::ExtractionComplete,
    ];

    /// Wire name of the step.
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::HomepageScan => "homepage_scan",
            Step::HomepageEmailExtraction => "homepage_email_extraction",
            Step::ContactPages => "contact_pages",
            Step::PuppeteerScan => "puppeteer_scan",
            Step::WhoisLookup => "whois_lookup",
            Step::ExtractionComplete => "extraction_complete",
        }
    }

    /// Whether this step is backed by a stage executor (everything but the terminal marker).
    pub fn is_executable(&self) -> bool {
        !matches!(self, Step::ExtractionComplete)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

/// Record of one stage's execution for one result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub step: Step,
    pub status: StageStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    /// Milliseconds spent in the stage, set once the entry is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
}

/// Violations of the progress log ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("progress log is already complete")]
    AlreadyComplete,

    #[error("cannot start {next} while {current} is still {status:?}")]
    PredecessorRunning {
        current: Step,
        next: Step,
        status: StageStatus,
    },

    #[error("{next} cannot follow {current}")]
    OutOfOrder { current: Step, next: Step },

    #[error("no running entry for {step}")]
    NotRunning { step: Step },

    #[error("{step} cannot be started as a stage")]
    NotExecutable { step: Step },
}

/// Append-only, canonically ordered log of stage progress.
///
/// Each step occurs at most once. A stage is recorded as `running` when it
/// starts and that same entry moves to `completed` or `failed` when it ends;
/// no other mutation of existing entries is possible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressLog {
    entries: Vec<ProgressEntry>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ProgressEntry> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Steps in log order.
    pub fn steps(&self) -> Vec<Step> {
        self.entries.iter().map(|e| e.step).collect()
    }

    /// Look up the entry for a step, if it ran.
    pub fn entry(&self, step: Step) -> Option<&ProgressEntry> {
        self.entries.iter().find(|e| e.step == step)
    }

    /// Whether `extraction_complete` has been recorded.
    pub fn is_complete(&self) -> bool {
        matches!(self.last(), Some(e) if e.step == Step::ExtractionComplete)
    }

    fn check_next(&self, next: Step) -> Result<(), ProgressError> {
        match self.last() {
            None => Ok(()),
            Some(last) if last.step == Step::ExtractionComplete => {
                Err(ProgressError::AlreadyComplete)
            }
            Some(last) if !last.status.is_terminal() => Err(ProgressError::PredecessorRunning {
                current: last.step,
                next,
                status: last.status,
            }),
            Some(last) if last.step >= next => Err(ProgressError::OutOfOrder {
                current: last.step,
                next,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Record that `step` has started.
    pub fn start(&mut self, step: Step, message: impl Into<String>) -> Result<(), ProgressError> {
        if !step.is_executable() {
            return Err(ProgressError::NotExecutable { step });
        }
        self.check_next(step)?;
        self.entries.push(ProgressEntry {
            step,
            status: StageStatus::Running,
            message: message.into(),
            started_at: Utc::now(),
            duration_ms: None,
            error: None,
        });
        Ok(())
    }

    /// Move the running entry for `step` to a terminal status.
    pub fn finish(
        &mut self,
        step: Step,
        status: StageStatus,
        message: impl Into<String>,
        duration_ms: u64,
        error: Option<StageError>,
    ) -> Result<(), ProgressError> {
        let entry = match self.entries.last_mut() {
            Some(entry) if entry.step == step && entry.status == StageStatus::Running => entry,
            _ => return Err(ProgressError::NotRunning { step }),
        };
        entry.status = if status.is_terminal() {
            status
        } else {
            StageStatus::Failed
        };
        entry.message = message.into();
        entry.duration_ms = Some(duration_ms);
        entry.error = error;
        Ok(())
    }

    /// Append the terminal `extraction_complete` marker.
    pub fn complete(
        &mut self,
        status: StageStatus,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Result<(), ProgressError> {
        self.complete_with_error(status, message, duration_ms, None)
    }

    /// Append `extraction_complete` carrying the reason the run ended.
    pub fn complete_with_error(
        &mut self,
        status: StageStatus,
        message: impl Into<String>,
        duration_ms: u64,
        error: Option<StageError>,
    ) -> Result<(), ProgressError> {
        self.check_next(Step::ExtractionComplete)?;
        self.entries.push(ProgressEntry {
            step: Step::ExtractionComplete,
            status: if status.is_terminal() {
                status
            } else {
                StageStatus::Failed
            },
            message: message.into(),
            started_at: Utc::now(),
            duration_ms: Some(duration_ms),
            error,
        });
        Ok(())
    }
}
