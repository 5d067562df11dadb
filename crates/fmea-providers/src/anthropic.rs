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

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Anthropic messages API provider (Claude models).
///
/// Frequency and presence penalties have no Anthropic equivalent and are dropped.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicProvider {
    /// Creates a new `AnthropicProvider` with the given API key.
    ///
    /// # Errors
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_ANTHROPIC_API_KEY.to_owned()));
        }

        Ok(Self {
            client: build_client(DEFAULT_REQUEST_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: ANTHROPIC_API_URL.to_owned(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Creates a new `AnthropicProvider` from environment variables.
    ///
    /// # Errors
    /// Returns an error if the env var is missing.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(ENV_ANTHROPIC_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_ANTHROPIC_API_KEY.to_owned()))?;
        Self::new(api_key)
    }

    /// Sets the model to use.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Points the provider at a different messages endpoint.
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

    fn build_request<'prompt>(&self, prompt: &'prompt str, config: &SamplingConfig) -> MessagesRequest<'prompt> {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            messages: vec![UserMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'prompt> {
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    messages: Vec<UserMessage<'prompt>>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'prompt> {
    role: &'static str,
    content: &'prompt str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Joins every text block of a messages response.
fn parse_messages_response(body: &str) -> GenerationResult<(String, TokenUsage)> {
    let response: AnthropicResponse = serde_json::from_str(body)
        .map_err(|err| GenerationError::malformed(format!("Failed to parse response: {err}")))?;

    let text = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(GenerationError::malformed("No text content in response"));
    }

    Ok((
        text,
        TokenUsage {
            input: response.usage.input_tokens,
            output: response.usage.output_tokens,
        },
    ))
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, config: &SamplingConfig) -> GenerationResult<GeneratedText> {
        let start = Instant::now();

        if config.has_penalties() {
            debug!("Anthropic does not support penalties; dropping them");
        }
        let request = self.build_request(prompt, config);

        let builder = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);
        let body = post_json(builder, &request, self.timeout).await?;
        let (text, tokens_used) = parse_messages_response(&body)?;

        Ok(GeneratedText {
            text,
            tokens_used,
            provider: format!("Anthropic/{}", self.model),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
