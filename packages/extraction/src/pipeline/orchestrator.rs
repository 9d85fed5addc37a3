//! Per-URL state machine over the stage sequence.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::{SufficiencyThreshold, TerminationPolicy};
use super::retry::{run_with_retry, RetryPolicy};
use super::stages::{standard_stages, StageContext, StageExecutor};
use crate::error::{StageError, StageErrorKind};
use crate::traits::{fetcher::PageFetcher, renderer::PageRenderer, whois::WhoisClient};
use crate::types::config::PipelineConfig;
use crate::types::progress::{ProgressError, StageStatus, Step};
use crate::types::result::UrlResult;

/// Receives a snapshot of the result after every progress change.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, result: &UrlResult);
}

/// Sink that drops every update.
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn publish(&self, _result: &UrlResult) {}
}

/// Runs the stages for one URL in canonical order.
///
/// The orchestrator owns the result's progress log: it records each stage as
/// `running`, moves that entry to `completed` or `failed`, consults the
/// termination policy at checkpoints and closes the log with
/// `extraction_complete`. Stage failures are recorded and never abort the run.
#[derive(Clone)]
pub struct Orchestrator {
    stages: Vec<Arc<dyn StageExecutor>>,
    policy: Arc<dyn TerminationPolicy>,
    retry: RetryPolicy,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Stages are sorted into canonical order; duplicate steps keep the first.
    pub fn new(
        mut stages: Vec<Arc<dyn StageExecutor>>,
        policy: Arc<dyn TerminationPolicy>,
        config: PipelineConfig,
    ) -> Self {
        stages.retain(|s| s.step().is_executable());
        stages.sort_by_key(|s| s.step());
        stages.dedup_by_key(|s| s.step());
        Self {
            stages,
            policy,
            retry: RetryPolicy::from_config(&config),
            config,
        }
    }

    /// The canonical pipeline with the sufficiency threshold from `config`.
    pub fn standard(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
        whois: Arc<dyn WhoisClient>,
        config: PipelineConfig,
    ) -> Self {
        let stages = standard_stages(fetcher, renderer, whois, &config);
        let policy = Arc::new(SufficiencyThreshold::new(config.sufficiency_threshold));
        Self::new(stages, policy, config)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn steps(&self) -> Vec<Step> {
        self.stages.iter().map(|s| s.step()).collect()
    }

    /// Run the pipeline for `url` to completion or cancellation.
    pub async fn run(
        &self,
        url: &str,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> UrlResult {
        let run_started = Instant::now();
        let mut result = UrlResult::new(url);
        let mut ctx = StageContext::new(url);
        let mut any_completed = false;
        let mut cancelled = false;
        let mut target_reached = false;
        let mut unreachable: Option<StageError> = None;

        for stage in &self.stages {
            let step = stage.step();
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            record(&mut result, |log| log.start(step, format!("Running {step}")));
            sink.publish(&result).await;

            let started = Instant::now();
            let budget = stage.time_budget(&self.config);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StageError::cancelled()),
                outcome = run_with_retry(&self.retry, budget, step, || stage.execute(&ctx)) => outcome,
            };
            let elapsed = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    let new = result.add_emails(&output.emails);
                    ctx.emails_so_far = result.emails.clone();
                    if ctx.homepage.is_none() {
                        ctx.homepage = output.page;
                    }
                    debug!(url = %url, step = %step, new_emails = new, elapsed_ms = elapsed, "Stage completed");
                    record(&mut result, |log| {
                        log.finish(step, StageStatus::Completed, output.message, elapsed, None)
                    });
                    any_completed = true;
                    target_reached |= accesses_target(step);
                }
                Err(error) => {
                    debug!(url = %url, step = %step, error = %error, "Stage failed");
                    let is_cancel = error.kind == StageErrorKind::Cancelled;
                    if accesses_target(step) && !is_cancel {
                        if means_unreachable(error.kind) {
                            unreachable.get_or_insert_with(|| error.clone());
                        } else {
                            target_reached = true;
                        }
                    }
                    record(&mut result, |log| {
                        log.finish(step, StageStatus::Failed, error.to_string(), elapsed, Some(error))
                    });
                    if is_cancel {
                        cancelled = true;
                        break;
                    }
                }
            }
            sink.publish(&result).await;

            if self.policy.should_stop(step, &result) {
                info!(url = %url, after = %step, emails = result.emails.len(), "Enough emails found, skipping remaining stages");
                result.early_exit_after = Some(step);
                break;
            }
        }

        let total = run_started.elapsed().as_millis() as u64;
        let (status, message, error) = match unreachable {
            _ if cancelled => (
                StageStatus::Failed,
                "Extraction cancelled".to_string(),
                Some(StageError::cancelled()),
            ),
            Some(error) if !target_reached => (
                StageStatus::Failed,
                format!("Target unreachable: {}", error.detail),
                Some(error),
            ),
            _ if any_completed => (
                StageStatus::Completed,
                format!("Extraction finished with {} unique emails", result.emails.len()),
                None,
            ),
            _ => (StageStatus::Failed, "Every stage failed".to_string(), None),
        };
        record(&mut result, |log| {
            log.complete_with_error(status, message, total, error)
        });
        sink.publish(&result).await;

        info!(
            url = %url,
            status = ?result.status,
            emails = result.emails.len(),
            elapsed_ms = total,
            "URL pipeline finished"
        );
        result
    }
}

/// Steps that talk to the target site itself.
fn accesses_target(step: Step) -> bool {
    matches!(step, Step::HomepageScan | Step::ContactPages | Step::PuppeteerScan)
}

/// Failure kinds that mean the site never answered.
fn means_unreachable(kind: StageErrorKind) -> bool {
    matches!(
        kind,
        StageErrorKind::Unreachable
            | StageErrorKind::Timeout
            | StageErrorKind::Unavailable
            | StageErrorKind::Blocked
    )
}

/// Apply a progress-log mutation and refresh the derived status.
fn record(
    result: &mut UrlResult,
    f: impl FnOnce(&mut crate::types::progress::ProgressLog) -> Result<(), ProgressError>,
) {
    if let Err(e) = f(&mut result.progress) {
        warn!(url = %result.url, error = %e, "Rejected progress transition");
    }
    result.refresh_status();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::policy::RunAllStages;
    use crate::pipeline::stages::StageOutput;
    use crate::testing::{MockFetcher, MockRenderer, MockWhois, RecordingSink};
    use crate::types::result::ResultStatus;
    use indexmap::IndexSet;
    use std::time::Duration;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_retry_backoff(Duration::from_millis(1))
            .with_stage_timeout(Duration::from_secs(2))
    }

    fn orchestrator(fetcher: MockFetcher, whois: MockWhois) -> Orchestrator {
        Orchestrator::standard(
            Arc::new(fetcher),
            Some(Arc::new(MockRenderer::new())),
            Arc::new(whois),
            config(),
        )
    }

    #[tokio::test]
    async fn stops_after_homepage_when_email_found() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com", "<p>Contact: sales@example.com</p>");
        let sink = RecordingSink::new();

        let result = orchestrator(fetcher, MockWhois::new())
            .run("https://example.com", &sink, &CancellationToken::new())
            .await;

        assert_eq!(result.status, ResultStatus::Completed);
        assert_eq!(result.emails.iter().collect::<Vec<_>>(), vec!["sales@example.com"]);
        assert_eq!(
            result.progress.steps(),
            vec![
                Step::HomepageScan,
                Step::HomepageEmailExtraction,
                Step::ExtractionComplete
            ]
        );
        assert_eq!(result.early_exit_after, Some(Step::HomepageEmailExtraction));
        assert!(sink.snapshots().len() >= 5);
    }

    #[tokio::test]
    async fn runs_every_stage_when_nothing_found() {
        let fetcher = MockFetcher::new().with_page("https://example.com", "<p>nothing</p>");
        let result = orchestrator(fetcher, MockWhois::new())
            .run("https://example.com", &NullSink, &CancellationToken::new())
            .await;

        assert_eq!(result.status, ResultStatus::Completed);
        assert!(result.emails.is_empty());
        assert_eq!(result.progress.steps(), Step::CANONICAL.to_vec());
        assert!(result.early_exit_after.is_none());
    }

    #[tokio::test]
    async fn unreachable_site_fails_every_stage() {
        let fetcher = MockFetcher::new().unreachable("https://down.example");
        let whois = MockWhois::new().failing("down.example");
        let orchestrator = Orchestrator::standard(Arc::new(fetcher), None, Arc::new(whois), config())
            .with_retry(RetryPolicy::none());

        let result = orchestrator
            .run("https://down.example", &NullSink, &CancellationToken::new())
            .await;

        assert_eq!(result.status, ResultStatus::Failed);
        let entries = result.progress.entries();
        assert_eq!(entries.len(), 6);
        assert!(entries[..5].iter().all(|e| e.status == StageStatus::Failed));
        assert_eq!(
            entries[0].error.as_ref().map(|e| e.kind),
            Some(StageErrorKind::Unreachable)
        );
    }

    #[tokio::test]
    async fn dead_site_fails_even_when_whois_answers() {
        let fetcher = MockFetcher::new().unreachable("https://down.example");
        let whois = MockWhois::new().with_record("down.example", "Registrar: Example Registrar");
        let orchestrator = Orchestrator::standard(Arc::new(fetcher), None, Arc::new(whois), config())
            .with_retry(RetryPolicy::none());

        let result = orchestrator
            .run("https://down.example", &NullSink, &CancellationToken::new())
            .await;

        assert_eq!(
            result.progress.entry(Step::WhoisLookup).map(|e| e.status),
            Some(StageStatus::Completed)
        );
        assert_eq!(result.status, ResultStatus::Failed);
        let last = result.progress.last().unwrap();
        assert_eq!(last.step, Step::ExtractionComplete);
        assert_eq!(
            last.error.as_ref().map(|e| e.kind),
            Some(StageErrorKind::Unreachable)
        );
    }

    #[tokio::test]
    async fn http_error_counts_as_reached() {
        let fetcher = MockFetcher::new().with_status("https://example.com", 503);
        let result = Orchestrator::standard(Arc::new(fetcher), None, Arc::new(MockWhois::new()), config())
            .with_retry(RetryPolicy::none())
            .run("https://example.com", &NullSink, &CancellationToken::new())
            .await;

        assert_eq!(result.status, ResultStatus::Completed);
        assert!(result.emails.is_empty());
    }

    #[tokio::test]
    async fn stage_failure_does_not_stop_the_pipeline() {
        // Homepage 500s, but a contact page is reachable
        let fetcher = MockFetcher::new()
            .with_status("https://example.com", 500)
            .with_page("https://example.com/contact", "help@example.com");

        let result = orchestrator(fetcher, MockWhois::new())
            .with_retry(RetryPolicy::none())
            .run("https://example.com", &NullSink, &CancellationToken::new())
            .await;

        assert_eq!(result.status, ResultStatus::Completed);
        assert_eq!(result.early_exit_after, Some(Step::ContactPages));
        let homepage = result.progress.entry(Step::HomepageScan).unwrap();
        assert_eq!(homepage.status, StageStatus::Failed);
        assert_eq!(homepage.error.as_ref().and_then(|e| e.status), Some(500));
    }

    #[tokio::test]
    async fn cancellation_marks_running_stage_failed() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com", "<p>slow</p>")
            .with_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let orchestrator = orchestrator(fetcher, MockWhois::new());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = orchestrator
            .run("https://example.com", &NullSink, &cancel)
            .await;

        assert_eq!(result.status, ResultStatus::Failed);
        let first = &result.progress.entries()[0];
        assert_eq!(first.step, Step::HomepageScan);
        assert_eq!(first.error.as_ref().map(|e| e.kind), Some(StageErrorKind::Cancelled));
        assert_eq!(
            result.progress.steps(),
            vec![Step::HomepageScan, Step::ExtractionComplete]
        );
    }

    struct FixedStage(Step, &'static str);

    #[async_trait]
    impl StageExecutor for FixedStage {
        fn step(&self) -> Step {
            self.0
        }

        async fn execute(&self, _ctx: &StageContext) -> crate::error::StageResult<StageOutput> {
            let mut emails = IndexSet::new();
            emails.insert(self.1.to_string());
            Ok(StageOutput::new(emails, "fixed"))
        }
    }

    #[tokio::test]
    async fn custom_policy_and_stage_order() {
        let stages: Vec<Arc<dyn StageExecutor>> = vec![
            Arc::new(FixedStage(Step::WhoisLookup, "w@example.com")),
            Arc::new(FixedStage(Step::HomepageScan, "h@example.com")),
        ];
        let orchestrator = Orchestrator::new(stages, Arc::new(RunAllStages), config());
        assert_eq!(orchestrator.steps(), vec![Step::HomepageScan, Step::WhoisLookup]);

        let result = orchestrator
            .run("https://example.com", &NullSink, &CancellationToken::new())
            .await;
        assert_eq!(
            result.emails.iter().collect::<Vec<_>>(),
            vec!["h@example.com", "w@example.com"]
        );
    }
}
