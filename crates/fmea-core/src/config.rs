//! Configuration for providers, sampling defaults and the analysis pipeline.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CredentialResolver, Error, ProviderIdentity, Result, SamplingConfig};

/// Complete application configuration, stored as `~/.fmea/config.toml`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// API keys for generation providers
    pub api_keys: ApiKeys,
    /// Per-provider connection settings
    pub providers: ProviderSettings,
    /// Default sampling parameters for every run
    pub sampling: SamplingConfig,
    /// Pipeline limits and policies
    pub pipeline: PipelineSettings,
}

/// API keys for generation providers.
///
/// Keys left unset here fall back to the provider's environment variable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiKeys {
    /// `OpenAI` API key
    pub openai_api_key: Option<String>,
    /// Anthropic API key
    pub anthropic_api_key: Option<String>,
    /// Groq API key
    pub groq_api_key: Option<String>,
}

/// Model names, endpoints and request timeout for each backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider used when a run does not name one
    pub default_provider: ProviderIdentity,
    /// `OpenAI` model name
    pub openai_model: String,
    /// Anthropic model name
    pub anthropic_model: String,
    /// Groq model name
    pub groq_model: String,
    /// Override for the `OpenAI` endpoint
    pub openai_base_url: Option<String>,
    /// Override for the Anthropic endpoint
    pub anthropic_base_url: Option<String>,
    /// Override for the Groq endpoint
    pub groq_base_url: Option<String>,
    /// HTTP timeout applied by the client to every request
    pub request_timeout_seconds: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            default_provider: ProviderIdentity::OpenAi,
            openai_model: "gpt-4".to_owned(),
            anthropic_model: "claude-sonnet-4-20250514".to_owned(),
            groq_model: "llama-3.3-70b-versatile".to_owned(),
            openai_base_url: None,
            anthropic_base_url: None,
            groq_base_url: None,
            request_timeout_seconds: 180,
        }
    }
}

impl ProviderSettings {
    /// Model configured for `identity`.
    #[must_use]
    pub fn model_for(&self, identity: ProviderIdentity) -> &str {
        match identity {
            ProviderIdentity::OpenAi => &self.openai_model,
            ProviderIdentity::Anthropic => &self.anthropic_model,
            ProviderIdentity::Groq => &self.groq_model,
        }
    }

    /// Endpoint override configured for `identity`, if any.
    #[must_use]
    pub fn base_url_for(&self, identity: ProviderIdentity) -> Option<&str> {
        match identity {
            ProviderIdentity::OpenAi => self.openai_base_url.as_deref(),
            ProviderIdentity::Anthropic => self.anthropic_base_url.as_deref(),
            ProviderIdentity::Groq => self.groq_base_url.as_deref(),
        }
    }
}

/// Pipeline limits and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Characters kept from the document before segmentation
    pub max_input_chars: usize,
    /// Maximum number of thread analyses in flight at once
    pub max_concurrent_analyses: usize,
    /// Time budget for each provider call
    pub call_timeout_seconds: u64,
    /// Retries after a retryable failure (0 disables retrying)
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_base_delay_ms: u64,
    /// Whether whitespace-only segmenter lines are dropped instead of analysed
    pub drop_blank_threads: bool,
    /// Replacement for the embedded segmentation prompt
    pub segmentation_prompt_path: Option<PathBuf>,
    /// Replacement for the embedded analysis prompt
    pub analysis_prompt_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_input_chars: 16_000,
            max_concurrent_analyses: 4,
            call_timeout_seconds: 120,
            max_retries: 2,
            retry_base_delay_ms: 500,
            drop_blank_threads: false,
            segmentation_prompt_path: None,
            analysis_prompt_path: None,
        }
    }
}

impl AppConfig {
    /// Get the default config directory path (`~/.fmea`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".fmea"))
    }

    /// Get the default config file path (`~/.fmea/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.fmea/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;

        debug!(
            "Loaded config from {:?}: openai_api_key={}, anthropic_api_key={}, groq_api_key={}",
            path,
            presence(config.api_keys.openai_api_key.as_ref()),
            presence(config.api_keys.anthropic_api_key.as_ref()),
            presence(config.api_keys.groq_api_key.as_ref()),
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)?;

        let header = "# FMEA Analyzer Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Get API key for a provider, checking config first, then environment variables
    pub fn get_api_key(&self, identity: ProviderIdentity) -> Option<String> {
        let configured = match identity {
            ProviderIdentity::OpenAi => self.api_keys.openai_api_key.as_ref(),
            ProviderIdentity::Anthropic => self.api_keys.anthropic_api_key.as_ref(),
            ProviderIdentity::Groq => self.api_keys.groq_api_key.as_ref(),
        };

        configured
            .filter(|key| !key.is_empty())
            .cloned()
            .or_else(|| env::var(identity.env_key()).ok().filter(|key| !key.is_empty()))
    }
}

impl CredentialResolver for AppConfig {
    fn resolve(&self, identity: ProviderIdentity) -> Option<String> {
        self.get_api_key(identity)
    }
}

fn presence<T>(value: Option<&T>) -> &'static str {
    if value.is_some() { "present" } else { "missing" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.max_input_chars, 16_000);
        assert_eq!(config.pipeline.max_concurrent_analyses, 4);
        assert_eq!(config.providers.default_provider, ProviderIdentity::OpenAi);
        assert!(!config.pipeline.drop_blank_threads);
    }

    #[test]
    fn test_api_key_loading_from_toml() {
        let toml_content = r#"
[api_keys]
openai_api_key = "test_openai_key_123"
groq_api_key = "test_groq_key_456"

[providers]
default_provider = "anthropic"
groq_model = "llama-3.3-70b-versatile"

[sampling]
temperature = 0.2
max_output_tokens = 2048

[pipeline]
max_input_chars = 8000
drop_blank_threads = true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(
            config.get_api_key(ProviderIdentity::OpenAi),
            Some("test_openai_key_123".to_owned())
        );
        assert_eq!(
            config.resolve(ProviderIdentity::Groq),
            Some("test_groq_key_456".to_owned())
        );
        assert_eq!(config.providers.default_provider, ProviderIdentity::Anthropic);
        assert_eq!(
            config.providers.model_for(ProviderIdentity::Groq),
            "llama-3.3-70b-versatile"
        );
        // Unset fields keep their defaults
        assert_eq!(config.providers.model_for(ProviderIdentity::OpenAi), "gpt-4");
        assert!((config.sampling.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.sampling.top_p - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.sampling.max_output_tokens, 2048);
        assert_eq!(config.pipeline.max_input_chars, 8000);
        assert_eq!(config.pipeline.max_concurrent_analyses, 4);
        assert!(config.pipeline.drop_blank_threads);
    }

    #[test]
    fn test_empty_configured_key_is_ignored() {
        let mut config = AppConfig::default();
        config.api_keys.anthropic_api_key = Some(String::new());
        let resolved = config.get_api_key(ProviderIdentity::Anthropic);
        assert_eq!(resolved, env::var("ANTHROPIC_API_KEY").ok().filter(|key| !key.is_empty()));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.pipeline.max_retries = 5;
        config.providers.groq_base_url = Some("http://localhost:9000/v1/chat/completions".to_owned());
        config.save_to_file(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# FMEA Analyzer Configuration File"));

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.pipeline.max_retries, 5);
        assert_eq!(
            loaded.providers.base_url_for(ProviderIdentity::Groq),
            Some("http://localhost:9000/v1/chat/completions")
        );
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[pipeline\nmax_input_chars = ").unwrap();

        let err = AppConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
