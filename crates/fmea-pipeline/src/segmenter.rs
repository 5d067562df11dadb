//! Splits a document into incident threads with one provider call.

use std::sync::Arc;

use fmea_core::prompts::{CONTENT_PLACEHOLDER, INSTRUCTIONS_PLACEHOLDER, render_instructions};
use fmea_core::{GenerationProvider, PromptTemplate, SamplingConfig, Thread};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::SegmentationError;
use crate::retry::CallPolicy;

/// What to do with segmenter lines that contain only whitespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlankThreadPolicy {
    /// Analyse them like any other thread.
    #[default]
    Keep,
    /// Discard them before numbering.
    Drop,
}

impl BlankThreadPolicy {
    /// Policy matching the `drop_blank_threads` setting.
    #[must_use]
    pub fn from_drop_flag(drop_blank: bool) -> Self {
        if drop_blank { Self::Drop } else { Self::Keep }
    }
}

/// Asks a provider to rewrite a document as one thread per line.
pub struct ThreadSegmenter {
    provider: Arc<dyn GenerationProvider>,
    template: PromptTemplate,
    policy: CallPolicy,
}

impl ThreadSegmenter {
    /// Creates a segmenter that sends its prompt to `provider`.
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

    /// Renders the segmentation prompt for `content`.
    #[must_use]
    pub fn render_prompt(&self, content: &str, extra_instructions: &str) -> String {
        self.template.render(&[
            (INSTRUCTIONS_PLACEHOLDER, &render_instructions(extra_instructions)),
            (CONTENT_PLACEHOLDER, content),
        ])
    }

    /// Returns the thread texts in the order the provider produced them.
    ///
    /// Each line of the reply is one thread. Whitespace-only lines are kept;
    /// an empty reply yields no threads. No retry is started once `stop` fires.
    ///
    /// # Errors
    /// Returns [`SegmentationError`] if the provider call fails.
    pub async fn segment(
        &self,
        content: &str,
        config: &SamplingConfig,
        extra_instructions: &str,
        stop: &CancellationToken,
    ) -> Result<Vec<String>, SegmentationError> {
        let prompt = self.render_prompt(content, extra_instructions);
        debug!(prompt_chars = prompt.chars().count(), "requesting segmentation");

        let generated = self.policy.call(self.provider.as_ref(), &prompt, config, stop).await?;
        let threads = split_threads(&generated.text);

        info!(
            threads = threads.len(),
            provider = %generated.provider,
            latency_ms = generated.latency_ms,
            "segmentation complete"
        );
        Ok(threads)
    }
}

/// Splits a segmentation reply into thread texts, one per line.
#[must_use]
pub fn split_threads(reply: &str) -> Vec<String> {
    reply.lines().map(str::to_owned).collect()
}

/// Numbers thread texts from 1, applying `policy` to whitespace-only entries.
#[must_use]
pub fn number_threads(texts: Vec<String>, policy: BlankThreadPolicy) -> Vec<Thread> {
    texts
        .into_iter()
        .filter(|text| policy == BlankThreadPolicy::Keep || !text.trim().is_empty())
        .enumerate()
        .map(|(position, text)| Thread::new(position + 1, text))
        .collect()
}
