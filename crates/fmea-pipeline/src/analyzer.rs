//! Produces the structured failure analysis for a single thread.

use std::sync::Arc;

use fmea_core::prompts::{INSTRUCTIONS_PLACEHOLDER, THREAD_PLACEHOLDER, render_instructions};
use fmea_core::{GeneratedText, GenerationProvider, PromptTemplate, SamplingConfig, Thread};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::AnalysisError;
use crate::retry::CallPolicy;

/// Runs the analysis prompt for one thread at a time.
///
/// Calls are independent, so one analyzer can be shared by many tasks.
pub struct ThreadAnalyzer {
    provider: Arc<dyn GenerationProvider>,
    template: PromptTemplate,
    policy: CallPolicy,
}

impl ThreadAnalyzer {
    /// Creates an analyzer that sends every prompt to `provider`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        template: PromptTemplate,
        policy: CallPolicy,
    ) -> Self {
        Self {
            provider,
            template,
            policy,
        }
    }

    /// Renders the analysis prompt for `thread`.
    #[must_use]
    pub fn render_prompt(&self, thread: &Thread, extra_instructions: &str) -> String {
        self.template.render(&[
            (INSTRUCTIONS_PLACEHOLDER, &render_instructions(extra_instructions)),
            (THREAD_PLACEHOLDER, &thread.content),
        ])
    }

    /// Analyses `thread`, returning the provider's text unmodified.
    ///
    /// No retry is started once `stop` fires.
    ///
    /// # Errors
    /// Returns [`AnalysisError::Generation`] tagged with the thread index if the call fails.
    pub async fn analyze(
        &self,
        thread: &Thread,
        config: &SamplingConfig,
        extra_instructions: &str,
        stop: &CancellationToken,
    ) -> Result<GeneratedText, AnalysisError> {
        let prompt = self.render_prompt(thread, extra_instructions);
        debug!(thread = thread.index, "analysing thread");

        self.policy
            .call(self.provider.as_ref(), &prompt, config, stop)
            .await
            .map_err(|source| AnalysisError::Generation {
                index: thread.index,
                source,
            })
    }
}
