use core::fmt;
use core::result::Result as CoreResult;

use fmea_core::{Error as CoreError, GenerationError};
use thiserror::Error;

/// Result type for a pipeline run.
pub type Result<T> = CoreResult<T, RunError>;

/// Run-level failure. Any of these means no analysis results were produced.
#[derive(Debug, Error)]
pub enum RunError {
    /// Unknown provider, missing credential or unusable prompt template.
    #[error("Configuration error: {0}")]
    Configuration(#[from] CoreError),

    /// Thread boundaries could not be obtained.
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    /// The run was cancelled before segmentation finished.
    #[error("Run cancelled before segmentation completed")]
    Cancelled,
}

/// The segmentation call failed; the whole document is unanalysable.
#[derive(Debug, Error)]
#[error("Segmentation failed: {source}")]
pub struct SegmentationError {
    /// Failure reported by the provider call.
    #[from]
    pub source: GenerationError,
}

/// Failure confined to a single thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// The provider call for this thread failed.
    #[error("Analysis of thread {index} failed: {source}")]
    Generation {
        /// 1-based thread index.
        index: usize,
        /// Failure reported by the provider call.
        source: GenerationError,
    },

    /// The thread was never sent to the provider.
    #[error("Analysis of thread {index} was not attempted: {reason}")]
    NotAttempted {
        /// 1-based thread index.
        index: usize,
        /// Why the run stopped issuing calls.
        reason: StopReason,
    },
}

impl AnalysisError {
    /// The underlying provider failure, if a call was made.
    pub fn generation_error(&self) -> Option<&GenerationError> {
        match self {
            Self::Generation { source, .. } => Some(source),
            Self::NotAttempted { .. } => None,
        }
    }

    /// Returns `true` if the thread's call ran into a transport failure.
    pub fn is_transport(&self) -> bool {
        self.generation_error().is_some_and(GenerationError::is_transport)
    }
}

/// Why a run stopped issuing analysis calls before every thread was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The caller cancelled the run.
    Cancelled,
    /// An earlier call was refused with an invalid credential.
    CredentialRejected,
    /// The analysis task ended without reporting a result.
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cancelled => "run cancelled",
            Self::CredentialRejected => "provider rejected the credential",
            Self::Interrupted => "analysis task did not complete",
        };
        f.write_str(label)
    }
}
