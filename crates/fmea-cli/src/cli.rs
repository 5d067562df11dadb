use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fmea_core::{AppConfig, ProviderIdentity};
use fmea_pipeline::RunRequest;

/// Command-line arguments for the `fmea` binary
#[derive(Debug, Parser)]
#[command(name = "fmea")]
#[command(about = "FMECA and incident case studies from maritime incident correspondence", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file to use instead of ~/.fmea/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Operation to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands of the `fmea` binary
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Segment a document into threads and analyse each one
    Analyze {
        /// Plain-text document to analyse
        file: PathBuf,

        /// Per-run overrides
        #[command(flatten)]
        run: RunArgs,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show how a document splits into threads without analysing them
    Segment {
        /// Plain-text document to segment
        file: PathBuf,

        /// Per-run overrides
        #[command(flatten)]
        run: RunArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show configuration
    Config {
        /// Show full configuration as TOML (keys redacted)
        #[arg(long)]
        full: bool,
    },
}

/// Per-run overrides of the configured defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Provider: openai, anthropic (claude) or groq
    #[arg(short, long)]
    pub provider: Option<ProviderIdentity>,

    /// Sampling temperature, 0 to 1
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling mass, 0 to 1
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Frequency penalty, 0 to 2 (openai provider only)
    #[arg(long)]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty, 0 to 2 (openai provider only)
    #[arg(long)]
    pub presence_penalty: Option<f32>,

    /// Maximum tokens per generated reply
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Extra instructions added to every prompt
    #[arg(short, long)]
    pub instructions: Option<String>,

    /// Characters of the document kept before segmentation
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Maximum analyses in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl RunArgs {
    /// Writes every flag that was given into `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(provider) = self.provider {
            config.providers.default_provider = provider;
        }
        if let Some(temperature) = self.temperature {
            config.sampling.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            config.sampling.top_p = top_p;
        }
        if let Some(penalty) = self.frequency_penalty {
            config.sampling.frequency_penalty = penalty;
        }
        if let Some(penalty) = self.presence_penalty {
            config.sampling.presence_penalty = penalty;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.sampling.max_output_tokens = max_tokens;
        }
        if let Some(max_chars) = self.max_chars {
            config.pipeline.max_input_chars = max_chars;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.max_concurrent_analyses = concurrency;
        }
    }

    /// Builds the run request from an already-overridden config.
    #[must_use]
    pub fn request(&self, config: &AppConfig) -> RunRequest {
        RunRequest::new(config.providers.default_provider)
            .with_sampling(config.sampling)
            .with_instructions(self.instructions.clone().unwrap_or_default())
    }
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Headed sections for reading
    #[default]
    Text,
    /// One JSON document
    Json,
}
