use core::fmt;
use core::ops::Add;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Raw text of an input document together with its length in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    char_len: usize,
}

impl Document {
    /// Wraps `content`, counting its characters once.
    pub fn new<T: Into<String>>(content: T) -> Self {
        let content = content.into();
        let char_len = content.chars().count();
        Self { content, char_len }
    }

    /// Builds a document from an ordered sequence of paragraphs, one per line.
    pub fn from_paragraphs<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = paragraphs
            .into_iter()
            .map(|paragraph| paragraph.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(joined)
    }

    /// The full text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length in Unicode scalar values, not bytes.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    /// Returns `true` if the document has no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    /// Consumes the document, returning its text.
    #[must_use]
    pub fn into_content(self) -> String {
        self.content
    }
}

/// Generation-control parameters for a single provider call.
///
/// Penalties are optional capabilities: providers that do not support them
/// drop them silently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Nucleus sampling mass in `[0, 1]`.
    pub top_p: f32,
    /// Frequency penalty in `[0, 2]`.
    pub frequency_penalty: f32,
    /// Presence penalty in `[0, 2]`.
    pub presence_penalty: f32,
    /// Upper bound on generated tokens, at least 1.
    pub max_output_tokens: u32,
}

impl SamplingConfig {
    /// Inclusive bounds for `temperature`.
    pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);
    /// Inclusive bounds for `top_p`.
    pub const TOP_P_RANGE: (f32, f32) = (0.0, 1.0);
    /// Inclusive bounds for both penalties.
    pub const PENALTY_RANGE: (f32, f32) = (0.0, 2.0);

    /// Returns a copy with every field forced into its declared range.
    ///
    /// `NaN` values fall back to the range minimum.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            temperature: clamp_unit(self.temperature, Self::TEMPERATURE_RANGE),
            top_p: clamp_unit(self.top_p, Self::TOP_P_RANGE),
            frequency_penalty: clamp_unit(self.frequency_penalty, Self::PENALTY_RANGE),
            presence_penalty: clamp_unit(self.presence_penalty, Self::PENALTY_RANGE),
            max_output_tokens: self.max_output_tokens.max(1),
        }
    }

    /// Whether either penalty is non-zero.
    #[must_use]
    pub fn has_penalties(&self) -> bool {
        self.frequency_penalty > 0.0 || self.presence_penalty > 0.0
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_output_tokens: 1000,
        }
    }
}

fn clamp_unit(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// The backend that handles a request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderIdentity {
    /// `OpenAI` chat completions.
    #[default]
    OpenAi,
    /// Anthropic messages API (Claude).
    Anthropic,
    /// Groq `OpenAI`-compatible API.
    Groq,
}

impl ProviderIdentity {
    /// Every supported backend, in display order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::OpenAi, Self::Anthropic, Self::Groq]
    }

    /// Lowercase key used in config files and on the command line.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
        }
    }

    /// Environment variable consulted for this provider's API key.
    #[must_use]
    pub const fn env_key(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Groq => "Groq",
        };
        f.write_str(label)
    }
}

impl FromStr for ProviderIdentity {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "groq" => Ok(Self::Groq),
            _ => Err(Error::Config(format!("unknown provider: {name}"))),
        }
    }
}

/// One incident conversation carved out of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// 1-based position in segmentation order.
    pub index: usize,
    /// Thread text exactly as the segmenter returned it.
    pub content: String,
}

impl Thread {
    /// Creates thread number `index`.
    pub fn new<T: Into<String>>(index: usize, content: T) -> Self {
        Self {
            index,
            content: content.into(),
        }
    }

    /// Whether the thread has no visible content.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Text returned by a successful generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    /// Completion text, unmodified.
    pub text: String,
    /// Tokens billed for the call.
    pub tokens_used: TokenUsage,
    /// `<backend>/<model>` label.
    pub provider: String,
    /// Wall-clock duration of the call.
    pub latency_ms: u64,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
}

impl TokenUsage {
    /// Prompt and completion tokens together.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
        }
    }
}
