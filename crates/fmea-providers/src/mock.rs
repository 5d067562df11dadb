//! Mock provider for testing pipeline runs.
//!
//! Allows defining canned replies, failures and delays for specific prompts,
//! enabling end-to-end testing of segmentation and analysis without real API
//! calls.

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fmea_core::{
    GeneratedText, GenerationError, GenerationProvider, GenerationResult, SamplingConfig,
    TokenUsage,
};
use tokio::time::sleep;

/// What the mock does when a rule matches.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with this error.
    Fail(GenerationError),
    /// Wait, then apply the inner reply.
    Delayed(Duration, Box<MockReply>),
}

/// A reply keyed by a prompt substring.
#[derive(Debug)]
struct MockRule {
    /// Substring the prompt must contain
    pattern: String,
    /// Reply once leading failures are used up
    reply: MockReply,
    /// Errors returned, in order, before `reply` takes effect
    leading_failures: Vec<GenerationError>,
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Full prompt text
    pub prompt: String,
    /// Sampling configuration the call received
    pub config: SamplingConfig,
}

/// Mock provider that returns pre-defined replies based on prompt patterns.
///
/// Rules are checked in the order they were added; the first whose pattern
/// occurs in the prompt wins.
#[derive(Clone)]
pub struct MockProvider {
    /// Label reported in generated text
    label: String,
    /// Ordered reply rules
    rules: Arc<Mutex<Vec<MockRule>>>,
    /// Reply when no rule matches
    default_reply: Arc<Mutex<Option<MockReply>>>,
    /// Call history for verification
    call_history: Arc<Mutex<Vec<MockCall>>>,
    /// Calls currently inside `generate`, and the most seen at once
    in_flight: Arc<InFlight>,
}

#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts one call as in flight until dropped, including when the caller abandons it.
struct InFlightGuard<'counter> {
    counter: &'counter InFlight,
}

impl<'counter> InFlightGuard<'counter> {
    fn enter(counter: &'counter InFlight) -> Self {
        let now = counter.current.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.current.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    /// Create a new mock provider with a given label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            rules: Arc::new(Mutex::new(Vec::new())),
            default_reply: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Add a rule with an arbitrary reply.
    #[must_use]
    pub fn with_reply(self, pattern: impl Into<String>, reply: MockReply) -> Self {
        self.push_rule(pattern.into(), reply, Vec::new());
        self
    }

    /// Add a pattern-based text response.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.with_reply(pattern, MockReply::Text(response.into()))
    }

    /// Fail every prompt containing `pattern`.
    #[must_use]
    pub fn with_failure(self, pattern: impl Into<String>, error: GenerationError) -> Self {
        self.with_reply(pattern, MockReply::Fail(error))
    }

    /// Respond to `pattern` only after `delay`.
    #[must_use]
    pub fn with_delayed_response(
        self,
        pattern: impl Into<String>,
        delay: Duration,
        response: impl Into<String>,
    ) -> Self {
        self.with_reply(
            pattern,
            MockReply::Delayed(delay, Box::new(MockReply::Text(response.into()))),
        )
    }

    /// Fail the first `failures.len()` matching calls, then respond with text.
    #[must_use]
    pub fn with_failures_then_response(
        self,
        pattern: impl Into<String>,
        failures: Vec<GenerationError>,
        response: impl Into<String>,
    ) -> Self {
        self.push_rule(pattern.into(), MockReply::Text(response.into()), failures);
        self
    }

    /// Set a default response for prompts that don't match any pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *lock(&self.default_reply) = Some(MockReply::Text(response.into()));
        self
    }

    /// Clear the call history.
    pub fn clear_history(&self) {
        lock(&self.call_history).clear();
    }

    /// Get the prompts of every call made, in order.
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        lock(&self.call_history)
            .iter()
            .map(|call| call.prompt.clone())
            .collect()
    }

    /// Get every recorded call, including sampling configuration.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.call_history).clone()
    }

    /// Get the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.call_history).len()
    }

    /// Get the largest number of calls that were in progress at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }

    fn push_rule(&self, pattern: String, reply: MockReply, leading_failures: Vec<GenerationError>) {
        lock(&self.rules).push(MockRule {
            pattern,
            reply,
            leading_failures,
        });
    }

    /// Find the reply for the given prompt, consuming a leading failure if one is queued.
    fn find_reply(&self, prompt: &str) -> Option<MockReply> {
        let mut rules = lock(&self.rules);
        let rule = rules.iter_mut().find(|rule| prompt.contains(&rule.pattern))?;

        if rule.leading_failures.is_empty() {
            Some(rule.reply.clone())
        } else {
            Some(MockReply::Fail(rule.leading_failures.remove(0)))
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &'static str {
        // The configured label is reported on each `GeneratedText` instead.
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        config: &SamplingConfig,
    ) -> GenerationResult<GeneratedText> {
        let _in_flight = InFlightGuard::enter(&self.in_flight);
        lock(&self.call_history).push(MockCall {
            prompt: prompt.to_owned(),
            config: *config,
        });

        let mut reply = self
            .find_reply(prompt)
            .or_else(|| lock(&self.default_reply).clone())
            .unwrap_or_else(|| MockReply::Text(format!("Mock response for prompt: {prompt}")));

        loop {
            match reply {
                MockReply::Text(text) => {
                    return Ok(GeneratedText {
                        tokens_used: TokenUsage {
                            input: prompt.len() as u64,
                            output: text.len() as u64,
                        },
                        text,
                        provider: self.label.clone(),
                        latency_ms: 0,
                    });
                }
                MockReply::Fail(error) => return Err(error),
                MockReply::Delayed(delay, inner) => {
                    sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
