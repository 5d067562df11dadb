//! Per-call time budget and retry with jittered exponential backoff.

use core::time::Duration;

use fmea_core::{
    GeneratedText, GenerationError, GenerationProvider, GenerationResult, PipelineSettings,
    SamplingConfig,
};
use rand::Rng as _;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a single provider call is bounded and retried.
///
/// Each attempt gets the full `timeout`. Only failures that
/// [`GenerationError::is_retryable`] accepts are retried; the delay before
/// retry `n` (0-based) is `base_delay * 2^n` plus up to half of that again as
/// jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Time budget for one attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for CallPolicy {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.call_timeout_seconds.max(1)),
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        }
    }
}

impl CallPolicy {
    /// A policy that makes exactly one attempt.
    #[must_use]
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Calls `provider`, applying the time budget and retrying transient failures.
    ///
    /// Once `stop` fires no further attempt is made: a pending backoff is cut
    /// short and the last failure is returned. An attempt already sent is
    /// allowed to finish.
    ///
    /// # Errors
    /// Returns the last failure once it is non-retryable, retries are used up,
    /// or `stop` has fired.
    pub async fn call(
        &self,
        provider: &dyn GenerationProvider,
        prompt: &str,
        config: &SamplingConfig,
        stop: &CancellationToken,
    ) -> GenerationResult<GeneratedText> {
        let mut attempt = 0;

        loop {
            let outcome = timeout(self.timeout, provider.generate(prompt, config))
                .await
                .unwrap_or_else(|_elapsed| Err(GenerationError::timeout(self.timeout)));

            let failure = match outcome {
                Ok(generated) => {
                    if attempt > 0 {
                        info!(
                            attempt,
                            provider = provider.name(),
                            "call succeeded after retry"
                        );
                    }
                    return Ok(generated);
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() || attempt >= self.max_retries {
                if failure.is_retryable() && self.max_retries > 0 {
                    error!(attempts = attempt + 1, error = %failure, "all retry attempts exhausted");
                }
                return Err(failure);
            }
            if stop.is_cancelled() {
                debug!(attempts = attempt + 1, error = %failure, "not retrying; run is stopping");
                return Err(failure);
            }

            let delay = with_jitter(self.backoff(attempt));
            warn!(
                attempt = attempt + 1,
                max_attempts = self.max_retries + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "retrying after failure"
            );

            let interrupted = tokio::select! {
                biased;
                () = stop.cancelled() => true,
                () = sleep(delay) => false,
            };
            if interrupted {
                debug!(attempts = attempt + 1, "retry abandoned; run is stopping");
                return Err(failure);
            }
            attempt += 1;
        }
    }
}

/// Adds a random extra of up to half of `delay`.
fn with_jitter(delay: Duration) -> Duration {
    let max_jitter_ms = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
    if max_jitter_ms == 0 {
        return delay;
    }
    let jitter_ms = rand::rng().random_range(0..=max_jitter_ms);
    delay.saturating_add(Duration::from_millis(jitter_ms))
}
