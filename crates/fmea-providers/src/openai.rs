use core::time::Duration;
use std::env;
use std::time::Instant;

use async_trait::async_trait;
use fmea_core::{
    Error, GeneratedText, GenerationError, GenerationProvider, GenerationResult, Result,
    SamplingConfig, TokenUsage,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{DEFAULT_REQUEST_TIMEOUT, build_client, post_json};

/// `OpenAI` chat completions endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default model for `OpenAI`.
const DEFAULT_MODEL: &str = "gpt-4";
/// Env var key for `OpenAI` API key.
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// System message sent ahead of every prompt.
pub(crate) const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// `OpenAI` chat completions provider.
///
/// Supports every sampling field, including both penalties.
pub struct OpenAiProvider {
    /// HTTP client for API requests.
    client: Client,
    /// `OpenAI` API key.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Endpoint the requests are posted to.
    base_url: String,
    /// Whole-request timeout configured on the client.
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a new `OpenAiProvider` with the given API key.
    ///
    /// # Errors
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_OPENAI_API_KEY.to_owned()));
        }

        Ok(Self {
            client: build_client(DEFAULT_REQUEST_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: OPENAI_API_URL.to_owned(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Creates a new `OpenAiProvider` from environment variables.
    ///
    /// # Errors
    /// Returns an error if the env var is missing.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(ENV_OPENAI_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_OPENAI_API_KEY.to_owned()))?;
        Self::new(api_key)
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Sets the endpoint URL, e.g. for a proxy or a compatible server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Rebuilds the HTTP client with a different request timeout.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Builds the request payload; every sampling field is forwarded.
    fn build_request(&self, prompt: &str, config: &SamplingConfig) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: chat_messages(prompt),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_output_tokens,
            frequency_penalty: Some(config.frequency_penalty),
            presence_penalty: Some(config.presence_penalty),
        }
    }
}

/// Request payload for `OpenAI`-compatible chat completion APIs.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    /// Model identifier.
    pub(crate) model: String,
    /// System and user messages.
    pub(crate) messages: Vec<ChatMessage>,
    /// Sampling temperature controlling response randomness.
    pub(crate) temperature: f32,
    /// Nucleus sampling mass.
    pub(crate) top_p: f32,
    /// Maximum number of tokens allowed in the completion.
    pub(crate) max_tokens: u32,
    /// Omitted for backends without penalty support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) frequency_penalty: Option<f32>,
    /// Omitted for backends without penalty support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) presence_penalty: Option<f32>,
}

/// Message delivered to an `OpenAI`-compatible API.
#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    /// Role of the message author (for example `system` or `user`).
    pub(crate) role: &'static str,
    /// Textual content of the message.
    pub(crate) content: String,
}

/// The fixed system message followed by the prompt as the user turn.
pub(crate) fn chat_messages(prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_owned(),
        },
        ChatMessage {
            role: "user",
            content: prompt.to_owned(),
        },
    ]
}

/// Response payload returned by `OpenAI`-compatible APIs.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    /// List of candidate completions.
    choices: Vec<ChatChoice>,
    /// Token accounting information, when reported.
    usage: Option<ChatUsage>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    /// Message generated for the choice.
    message: ChatResponseMessage,
}

/// Response message containing the generated text.
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    /// Generated text content; `null` when the model refused or called a tool.
    content: Option<String>,
}

/// Token usage metrics for a response.
#[derive(Debug, Deserialize)]
struct ChatUsage {
    /// Number of tokens in the prompt portion of the request.
    prompt_tokens: u64,
    /// Number of tokens produced in the completion.
    completion_tokens: u64,
}

/// Extracts the first choice's text and the token usage from a response body.
pub(crate) fn parse_chat_response(body: &str) -> GenerationResult<(String, TokenUsage)> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|err| GenerationError::malformed(format!("Failed to parse response: {err}")))?;

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| GenerationError::malformed("No content in response choices"))?;

    let tokens_used = response
        .usage
        .map(|usage| TokenUsage {
            input: usage.prompt_tokens,
            output: usage.completion_tokens,
        })
        .unwrap_or_default();

    Ok((text, tokens_used))
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str, config: &SamplingConfig) -> GenerationResult<GeneratedText> {
        let start = Instant::now();
        let request = self.build_request(prompt, config);

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending OpenAI request");

        let builder = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let body = post_json(builder, &request, self.timeout).await?;
        let (text, tokens_used) = parse_chat_response(&body)?;

        Ok(GeneratedText {
            text,
            tokens_used,
            provider: format!("OpenAI/{}", self.model),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
