//! Document-to-analysis pipeline.
//!
//! A run truncates the input document, asks the chosen provider to split it
//! into incident threads, then analyses every thread concurrently. Per-thread
//! failures are reported alongside successes instead of aborting the run.
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

/// Single-thread analysis.
pub mod analyzer;
/// Pipeline error types.
pub mod error;
/// Run orchestration and reporting.
pub mod orchestrator;
/// Call time budget and retry policy.
pub mod retry;
/// Thread segmentation.
pub mod segmenter;
/// Input truncation.
pub mod truncate;

pub use analyzer::ThreadAnalyzer;
pub use error::{AnalysisError, Result, RunError, SegmentationError, StopReason};
pub use orchestrator::{
    AnalysisResult, PipelineOptions, PipelineOrchestrator, RunReport, RunRequest,
    SegmentedDocument,
};
pub use retry::CallPolicy;
pub use segmenter::{BlankThreadPolicy, ThreadSegmenter};
pub use tokio_util::sync::CancellationToken;
pub use truncate::{ContentTruncator, truncate};
