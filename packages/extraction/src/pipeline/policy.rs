//! Early-termination policies evaluated between stages.

use crate::types::progress::Step;
use crate::types::result::UrlResult;

/// Decides, after a checkpoint stage, whether the remaining stages can be skipped.
pub trait TerminationPolicy: Send + Sync {
    /// Called after `completed_step` finished (successfully or not).
    fn should_stop(&self, completed_step: Step, result: &UrlResult) -> bool;
}

/// Stop once enough emails are known after a cheap stage.
///
/// Checkpoints are `homepage_email_extraction` and `contact_pages`; the
/// browser and WHOIS stages only run when the cheaper ones came up short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SufficiencyThreshold {
    /// Zero disables early termination.
    pub min_emails: usize,
}

impl SufficiencyThreshold {
    pub const CHECKPOINTS: [Step; 2] = [Step::HomepageEmailExtraction, Step::ContactPages];

    pub fn new(min_emails: usize) -> Self {
        Self { min_emails }
    }
}

impl Default for SufficiencyThreshold {
    fn default() -> Self {
        Self { min_emails: 1 }
    }
}

impl TerminationPolicy for SufficiencyThreshold {
    fn should_stop(&self, completed_step: Step, result: &UrlResult) -> bool {
        self.min_emails > 0
            && Self::CHECKPOINTS.contains(&completed_step)
            && result.emails.len() >= self.min_emails
    }
}

/// Always run every stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunAllStages;

impl TerminationPolicy for RunAllStages {
    fn should_stop(&self, _completed_step: Step, _result: &UrlResult) -> bool {
        false
    }
}
