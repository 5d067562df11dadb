//! Command-line front end for the incident thread analyzer.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

/// Argument definitions.
pub mod cli;
/// Command handlers.
pub mod handlers;
/// Plain-text document loading.
pub mod loader;
/// Tracing initialisation.
pub mod logging;
/// Report rendering.
pub mod report;

pub use cli::{Cli, Commands, OutputFormat, RunArgs};
pub use loader::PlainTextLoader;
