//! End-to-end run: truncate, segment, then analyse every thread concurrently.
//!
//! Analyses are dispatched through a semaphore-bounded [`JoinSet`]. Results
//! are written into per-thread slots so the report always lists them in
//! thread order, whatever order the calls finish in.

use core::result::Result as CoreResult;
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use fmea_core::{
    AppConfig, Document, GeneratedText, GenerationError, GenerationProvider, PipelineSettings,
    PromptTemplates, ProviderIdentity, SamplingConfig, Thread, TokenUsage,
};
use fmea_providers::ProviderRegistry;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analyzer::ThreadAnalyzer;
use crate::retry::CallPolicy;
use crate::segmenter::{BlankThreadPolicy, ThreadSegmenter, number_threads};
use crate::truncate::ContentTruncator;
use crate::{AnalysisError, Result, RunError, StopReason};

/// Tunables for a [`PipelineOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Characters kept from the document before segmentation
    pub max_input_chars: usize,
    /// Maximum analyses in flight at once
    pub max_concurrent_analyses: usize,
    /// Time budget and retry policy for every provider call
    pub call_policy: CallPolicy,
    /// Treatment of whitespace-only threads
    pub blank_threads: BlankThreadPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for PipelineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_input_chars: settings.max_input_chars,
            max_concurrent_analyses: settings.max_concurrent_analyses.max(1),
            call_policy: CallPolicy::from(settings),
            blank_threads: BlankThreadPolicy::from_drop_flag(settings.drop_blank_threads),
        }
    }
}

impl PipelineOptions {
    /// Sets the time budget for each provider call.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_policy.timeout = timeout;
        self
    }

    /// Sets how many times a transient failure is retried.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.call_policy.max_retries = max_retries;
        self
    }

    /// Sets the analysis concurrency limit; values below 1 become 1.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent_analyses = max_concurrent.max(1);
        self
    }

    /// Sets the character limit applied before segmentation.
    #[must_use]
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Sets how whitespace-only threads are treated.
    #[must_use]
    pub fn with_blank_threads(mut self, policy: BlankThreadPolicy) -> Self {
        self.blank_threads = policy;
        self
    }
}

/// Caller's choices for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    /// Backend every call of the run goes to
    pub provider: ProviderIdentity,
    /// Sampling parameters shared by segmentation and every analysis
    pub sampling: SamplingConfig,
    /// Free-form text added to both prompts; may be empty
    pub extra_instructions: String,
}

impl RunRequest {
    /// A request for `provider` with default sampling and no extra instructions.
    #[must_use]
    pub fn new(provider: ProviderIdentity) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Replaces the sampling parameters.
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sets the free-form instructions appended to both prompts.
    #[must_use]
    pub fn with_instructions(mut self, extra_instructions: impl Into<String>) -> Self {
        self.extra_instructions = extra_instructions.into();
        self
    }
}

/// Outcome of analysing one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// 1-based index of the thread this result belongs to
    pub index: usize,
    /// Analysis text, absent on failure
    pub analysis: Option<GeneratedText>,
    /// Failure detail, absent on success
    pub error: Option<AnalysisError>,
}

impl AnalysisResult {
    fn from_outcome(
        index: usize,
        outcome: CoreResult<GeneratedText, AnalysisError>,
    ) -> Self {
        match outcome {
            Ok(generated) => Self {
                index,
                analysis: Some(generated),
                error: None,
            },
            Err(error) => Self {
                index,
                analysis: None,
                error: Some(error),
            },
        }
    }

    fn not_attempted(index: usize, reason: StopReason) -> Self {
        Self {
            index,
            analysis: None,
            error: Some(AnalysisError::NotAttempted { index, reason }),
        }
    }

    /// Returns `true` if the thread was analysed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.analysis.is_some()
    }

    /// The analysis text, if the call succeeded.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.analysis.as_ref().map(|generated| generated.text.as_str())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Segmented threads in order
    pub threads: Vec<Thread>,
    /// One entry per thread, same order
    pub results: Vec<AnalysisResult>,
    /// Whether the document was cut before segmentation
    pub truncated: bool,
    /// Set when the run stopped dispatching analyses early
    pub stopped: Option<StopReason>,
}

impl RunReport {
    /// Threads paired with their results.
    pub fn entries(&self) -> impl Iterator<Item = (&Thread, &AnalysisResult)> {
        self.threads.iter().zip(&self.results)
    }

    /// Number of threads analysed successfully.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_success()).count()
    }

    /// Number of threads that failed or were never attempted.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// Tokens spent on successful analyses.
    #[must_use]
    pub fn analysis_tokens(&self) -> TokenUsage {
        self.results
            .iter()
            .filter_map(|result| result.analysis.as_ref())
            .fold(TokenUsage::default(), |total, generated| total + generated.tokens_used)
    }
}

/// Threads produced by segmentation alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedDocument {
    /// Segmented threads in order
    pub threads: Vec<Thread>,
    /// Whether the document was cut before segmentation
    pub truncated: bool,
}

/// Drives a whole run against the providers in its registry.
pub struct PipelineOrchestrator {
    registry: ProviderRegistry,
    templates: PromptTemplates,
    options: PipelineOptions,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over an explicit registry and prompt set.
    #[must_use]
    pub fn new(
        registry: ProviderRegistry,
        templates: PromptTemplates,
        options: PipelineOptions,
    ) -> Self {
        Self {
            registry,
            templates,
            options,
        }
    }

    /// Builds an orchestrator with every credentialed provider and the configured prompts.
    ///
    /// # Errors
    /// Returns an error if a prompt override is unusable or a provider cannot be built.
    pub fn from_config(config: &AppConfig) -> fmea_core::Result<Self> {
        let templates = PromptTemplates::with_overrides(
            config.pipeline.segmentation_prompt_path.as_deref(),
            config.pipeline.analysis_prompt_path.as_deref(),
        )?;
        Ok(Self::new(
            ProviderRegistry::from_config(config)?,
            templates,
            PipelineOptions::from(&config.pipeline),
        ))
    }

    /// The tunables this orchestrator runs with.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The providers this orchestrator can dispatch to.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    /// See [`run_with_cancel`](Self::run_with_cancel).
    pub async fn run(&self, document: Document, request: &RunRequest) -> Result<RunReport> {
        self.run_with_cancel(document, request, &CancellationToken::new())
            .await
    }

    /// Runs the pipeline, stopping early once `cancel` fires.
    ///
    /// Per-thread failures never fail the run; they appear in the matching
    /// [`AnalysisResult`]. Once the run stops, calls already sent are allowed
    /// to finish but no new call or retry is issued. Threads not yet
    /// dispatched get [`AnalysisError::NotAttempted`].
    ///
    /// # Errors
    /// Returns [`RunError::Configuration`] before any call if the provider is
    /// unavailable, [`RunError::Segmentation`] if segmentation fails and
    /// [`RunError::Cancelled`] if cancelled before threads are known.
    pub async fn run_with_cancel(
        &self,
        document: Document,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let provider = self.registry.get(request.provider)?;
        let sampling = request.sampling.clamped();
        let start = Instant::now();

        let segmented = self
            .segment_with(Arc::clone(&provider), document, request, sampling, cancel)
            .await?;

        let (results, stopped) = self
            .analyze_threads(
                provider,
                &segmented.threads,
                sampling,
                &request.extra_instructions,
                cancel,
            )
            .await;

        let report = RunReport {
            threads: segmented.threads,
            results,
            truncated: segmented.truncated,
            stopped,
        };
        info!(
            provider = %request.provider,
            threads = report.threads.len(),
            succeeded = report.success_count(),
            failed = report.failure_count(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "run complete"
        );
        Ok(report)
    }

    /// Truncates and segments `document` without analysing the threads.
    ///
    /// # Errors
    /// Same run-level errors as [`run_with_cancel`](Self::run_with_cancel).
    pub async fn segment(
        &self,
        document: Document,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<SegmentedDocument> {
        let provider = self.registry.get(request.provider)?;
        self.segment_with(provider, document, request, request.sampling.clamped(), cancel)
            .await
    }

    async fn segment_with(
        &self,
        provider: Arc<dyn GenerationProvider>,
        document: Document,
        request: &RunRequest,
        sampling: SamplingConfig,
        cancel: &CancellationToken,
    ) -> Result<SegmentedDocument> {
        let original_chars = document.char_len();
        let (document, truncated) =
            ContentTruncator::new(self.options.max_input_chars).truncate(document);
        if truncated {
            warn!(
                original_chars,
                kept_chars = document.char_len(),
                "document exceeds input limit; analysing the leading portion only"
            );
        }

        let segmenter = ThreadSegmenter::new(
            provider,
            self.templates.segmentation.clone(),
            self.options.call_policy,
        );
        let texts = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RunError::Cancelled),
            segmented = segmenter.segment(
                document.content(),
                &sampling,
                &request.extra_instructions,
                cancel,
            ) => segmented?,
        };

        Ok(SegmentedDocument {
            threads: number_threads(texts, self.options.blank_threads),
            truncated,
        })
    }

    /// Analyses `threads` with bounded concurrency, returning results in thread order.
    async fn analyze_threads(
        &self,
        provider: Arc<dyn GenerationProvider>,
        threads: &[Thread],
        sampling: SamplingConfig,
        extra_instructions: &str,
        cancel: &CancellationToken,
    ) -> (Vec<AnalysisResult>, Option<StopReason>) {
        let analyzer = Arc::new(ThreadAnalyzer::new(
            provider,
            self.templates.analysis.clone(),
            self.options.call_policy,
        ));
        let instructions: Arc<str> = Arc::from(extra_instructions);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_analyses.max(1)));
        // Fires on caller cancellation or on a rejected credential.
        let halt = cancel.child_token();

        let mut slots: Vec<Option<AnalysisResult>> = threads.iter().map(|_| None).collect();
        let mut join_set = JoinSet::new();

        for (slot, thread) in threads.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = halt.cancelled() => break,
                acquired = Arc::clone(&semaphore).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
            };

            let analyzer = Arc::clone(&analyzer);
            let instructions = Arc::clone(&instructions);
            let halt = halt.clone();
            let thread = thread.clone();

            join_set.spawn(async move {
                let outcome = analyzer
                    .analyze(&thread, &sampling, &instructions, &halt)
                    .await;

                match &outcome {
                    Ok(generated) => info!(
                        thread = thread.index,
                        latency_ms = generated.latency_ms,
                        tokens = generated.tokens_used.total(),
                        "thread analysed"
                    ),
                    Err(error) => {
                        warn!(thread = thread.index, %error, "thread analysis failed");
                        if error
                            .generation_error()
                            .is_some_and(GenerationError::is_credential_failure)
                        {
                            halt.cancel();
                        }
                    }
                }
                // Released after `halt` so the dispatcher never outruns a credential abort.
                drop(permit);
                (slot, AnalysisResult::from_outcome(thread.index, outcome))
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Some(result),
                Err(err) => warn!(error = %err, "analysis task did not complete"),
            }
        }

        let stopped = if cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if halt.is_cancelled() {
            Some(StopReason::CredentialRejected)
        } else {
            None
        };
        if let Some(reason) = stopped {
            warn!(%reason, "stopped dispatching analyses");
        }
        let pending_reason = stopped.unwrap_or(StopReason::Interrupted);

        let results = slots
            .into_iter()
            .zip(threads)
            .map(|(slot, thread)| {
                slot.unwrap_or_else(|| AnalysisResult::not_attempted(thread.index, pending_reason))
            })
            .collect();
        (results, stopped)
    }
}
