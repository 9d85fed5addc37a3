//! Bounded retries with exponential backoff inside one stage.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{StageError, StageResult};
use crate::types::config::PipelineConfig;
use crate::types::progress::Step;

/// Retry budget for transient stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff)
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped at 30s.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_backoff
            .saturating_mul(factor)
            .min(Duration::from_secs(30))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

/// Run `op` under one time budget, retrying transient failures while it lasts.
///
/// `timeout` bounds the whole stage, retries and backoff included. Hitting it
/// is a `timeout` failure. Permanent failures, and the last transient failure
/// when the retry budget or the time left runs out, are returned as-is.
pub async fn run_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    timeout: Duration,
    step: Step,
    mut op: F,
) -> StageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StageResult<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0;
    loop {
        let error = match tokio::time::timeout_at(deadline, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => {
                return Err(StageError::timeout(format!(
                    "{step} timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        };

        if !error.is_transient() || attempt >= policy.max_retries {
            return Err(error);
        }

        let delay = policy.backoff(attempt);
        if Instant::now() + delay >= deadline {
            return Err(error);
        }
        warn!(
            step = %step,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient stage failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
