//! `fmea` - FMECA and incident case studies from incident correspondence

use anyhow::Result;
use clap::Parser as _;
use fmea_cli::handlers::{handle_analyze, handle_config, handle_segment, load_config};
use fmea_cli::logging::init_logging;
use fmea_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { file, run, format } => {
            handle_analyze(config, file, run, format).await?;
        }
        Commands::Segment { file, run, format } => {
            handle_segment(config, file, run, format).await?;
        }
        Commands::Config { full } => {
            handle_config(&config, full)?;
        }
    }

    Ok(())
}
