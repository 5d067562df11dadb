//! Command handlers for CLI operations

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Error, Result};
use fmea_core::{AppConfig, ProviderIdentity};
use fmea_pipeline::{CancellationToken, PipelineOrchestrator, RunError};

use tokio::signal::ctrl_c;
use tracing::{info, warn};

use crate::cli::{OutputFormat, RunArgs};
use crate::loader::{PlainTextLoader, load_document};
use crate::report::{write_report_json, write_report_text, write_threads_json, write_threads_text};

/// Load configuration from `path`, or from `~/.fmea/config.toml` when none is given.
///
/// A missing or unreadable default config falls back to built-in defaults; an
/// explicitly named file must load.
///
/// # Errors
/// Returns an error if an explicitly named config file cannot be loaded.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    Ok(AppConfig::load_or_create().unwrap_or_else(|error| {
        warn!("Failed to load config from ~/.fmea/config.toml: {error}");
        warn!("Using default configuration");
        AppConfig::default()
    }))
}

/// Segment and analyse `file`, writing the report to stdout.
///
/// # Errors
/// Returns an error if the document cannot be loaded or the run fails as a whole.
pub async fn handle_analyze(
    mut config: AppConfig,
    file: PathBuf,
    run: RunArgs,
    format: OutputFormat,
) -> Result<()> {
    run.apply(&mut config);
    let request = run.request(&config);
    let orchestrator = PipelineOrchestrator::from_config(&config)?;
    let document = load_document(&PlainTextLoader, &file).await?;

    info!(
        file = %file.display(),
        provider = %request.provider,
        chars = document.char_len(),
        "starting analysis"
    );

    let cancel = cancel_on_ctrl_c();
    let report = orchestrator
        .run_with_cancel(document, &request, &cancel)
        .await
        .map_err(explain_run_error)?;

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => write_report_text(&mut stdout, &report)?,
        OutputFormat::Json => write_report_json(&mut stdout, &report)?,
    }
    stdout.flush()?;
    Ok(())
}

/// Segment `file` without analysing it, writing the threads to stdout.
///
/// # Errors
/// Returns an error if the document cannot be loaded or segmentation fails.
pub async fn handle_segment(
    mut config: AppConfig,
    file: PathBuf,
    run: RunArgs,
    format: OutputFormat,
) -> Result<()> {
    run.apply(&mut config);
    let request = run.request(&config);
    let orchestrator = PipelineOrchestrator::from_config(&config)?;
    let document = load_document(&PlainTextLoader, &file).await?;

    let segmented = orchestrator
        .segment(document, &request, &cancel_on_ctrl_c())
        .await
        .map_err(explain_run_error)?;

    let mut stdout = io::stdout().lock();
    match format {
        OutputFormat::Text => write_threads_text(&mut stdout, &segmented)?,
        OutputFormat::Json => write_threads_json(&mut stdout, &segmented)?,
    }
    stdout.flush()?;
    Ok(())
}

/// Output current configuration. If `full` is true, prints full TOML.
///
/// # Errors
/// Returns an error if the configuration cannot be serialized.
pub fn handle_config(config: &AppConfig, full: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_config(&mut stdout, config, full)?;
    stdout.flush()?;
    Ok(())
}

fn write_config(out: &mut impl io::Write, config: &AppConfig, full: bool) -> Result<()> {
    if full {
        let mut redacted = config.clone();
        for key in [
            &mut redacted.api_keys.openai_api_key,
            &mut redacted.api_keys.anthropic_api_key,
            &mut redacted.api_keys.groq_api_key,
        ] {
            if key.is_some() {
                *key = Some("<redacted>".to_owned());
            }
        }
        writeln!(out, "{}", toml::to_string_pretty(&redacted)?)?;
        return Ok(());
    }

    writeln!(out, "Configuration:")?;
    writeln!(
        out,
        "  Default provider: {provider}",
        provider = config.providers.default_provider
    )?;
    for identity in ProviderIdentity::all() {
        let status = if config.get_api_key(identity).is_some() {
            "Set"
        } else {
            "Not set"
        };
        writeln!(
            out,
            "  {identity}: model {model}, API key {status}",
            model = config.providers.model_for(identity)
        )?;
    }
    writeln!(
        out,
        "  Max input chars: {max}",
        max = config.pipeline.max_input_chars
    )?;
    writeln!(
        out,
        "  Max concurrent analyses: {max}",
        max = config.pipeline.max_concurrent_analyses
    )?;
    writeln!(
        out,
        "  Call timeout: {secs}s, retries: {retries}",
        secs = config.pipeline.call_timeout_seconds,
        retries = config.pipeline.max_retries
    )?;
    Ok(())
}

/// Returns a token that is cancelled when the user presses Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight calls");
            trigger.cancel();
        }
    });
    cancel
}

fn explain_run_error(error: RunError) -> Error {
    match &error {
        RunError::Configuration(inner) if inner.is_configuration() => {
            Error::new(error).context("Check the provider name and its API key")
        }
        RunError::Configuration(_) | RunError::Segmentation(_) | RunError::Cancelled => {
            Error::new(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn render(config: &AppConfig, full: bool) -> String {
        let mut buffer = Vec::new();
        write_config(&mut buffer, config, full).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_full_config_redacts_keys() {
        let mut config = AppConfig::default();
        config.api_keys.openai_api_key = Some("sk-secret".to_owned());

        let text = render(&config, true);
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("<redacted>"));
        assert!(text.contains("[pipeline]"));
    }

    #[test]
    fn test_summary_lists_every_provider() {
        let mut config = AppConfig::default();
        config.api_keys.anthropic_api_key = Some("sk-ant".to_owned());

        let text = render(&config, false);
        assert!(text.contains("Default provider: OpenAI"));
        assert!(text.contains("Anthropic: model claude-sonnet-4-20250514, API key Set"));
        assert!(text.contains("Groq: model"));
        assert!(!text.contains("sk-ant"));
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[pipeline]\nmax_input_chars = 500\n").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.max_input_chars, 500);
        assert_eq!(config.pipeline.max_concurrent_analyses, 4);
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let err = load_config(Some(Path::new("/nonexistent/fmea.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fmea.toml"));
    }
}
