use core::time::Duration;
use std::env;
use std::time::Instant;

use async_trait::async_trait;
use fmea_core::{Error, GeneratedText, GenerationProvider, GenerationResult, Result, SamplingConfig};
use reqwest::Client;
use tracing::debug;

use crate::http::{DEFAULT_REQUEST_TIMEOUT, build_client, post_json};
use crate::openai::{ChatRequest, chat_messages, parse_chat_response};

/// Groq API endpoint URL.
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
/// Default model for Groq.
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// Env var key for Groq API key.
const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";

/// Groq API provider (free tier with rate limits).
///
/// Frequency and presence penalties are not supported and are dropped.
pub struct GroqProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Groq API key.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Endpoint the requests are posted to.
    base_url: String,
    /// Whole-request timeout configured on the client.
    timeout: Duration,
}

impl GroqProvider {
    /// Creates a new `GroqProvider` from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the `GROQ_API_KEY` environment variable is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(ENV_GROQ_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_GROQ_API_KEY.to_owned()))?;
        Self::new(api_key)
    }

    /// Creates a new `GroqProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_GROQ_API_KEY.to_owned()));
        }

        Ok(Self {
            client: build_client(DEFAULT_REQUEST_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: GROQ_API_URL.to_owned(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Sets the endpoint URL.
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

    fn build_request(&self, prompt: &str, config: &SamplingConfig) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: chat_messages(prompt),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_output_tokens,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

#[async_trait]
impl GenerationProvider for GroqProvider {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn generate(&self, prompt: &str, config: &SamplingConfig) -> GenerationResult<GeneratedText> {
        let start = Instant::now();

        if config.has_penalties() {
            debug!("Groq does not support penalties; dropping them");
        }
        let request = self.build_request(prompt, config);

        let builder = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let body = post_json(builder, &request, self.timeout).await?;
        let (text, tokens_used) = parse_chat_response(&body)?;

        Ok(GeneratedText {
            text,
            tokens_used,
            provider: format!("Groq/{}", self.model),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
