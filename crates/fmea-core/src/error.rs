use core::fmt;
use core::result::Result as CoreResult;
use core::time::Duration;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;
use toml::ser::Error as TomlSerError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Result type for a single generation call.
pub type GenerationResult<T> = CoreResult<T, GenerationError>;

/// Errors that can occur in the core library.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// TOML serialization failed.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] TomlSerError),

    /// Configuration is invalid, or names an unknown provider.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// A prompt template could not be loaded or is malformed.
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// A generation call failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl Error {
    /// Whether this error belongs to the configuration class.
    ///
    /// Configuration errors are raised before any network call is attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingApiKey(_) | Self::Prompt(_))
    }
}

/// Failure of a single call to a generation backend.
///
/// Callers abort a whole run on a rejected credential but only skip the
/// current unit on a transient fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The request never produced a usable response.
    #[error("Transport error: {0}")]
    Transport(TransportFailure),

    /// The backend answered and refused the request.
    #[error("Provider rejected request: {0}")]
    Rejected(ProviderRejection),
}

impl GenerationError {
    /// Shorthand for a connection-level transport failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Transport(TransportFailure::Connection(message.into()))
    }

    /// Shorthand for a malformed-response transport failure.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Transport(TransportFailure::MalformedResponse(message.into()))
    }

    /// Shorthand for a timed-out call.
    pub fn timeout(after: Duration) -> Self {
        Self::Transport(TransportFailure::Timeout(after))
    }

    /// Shorthand for a provider rejection.
    pub fn rejected(kind: RejectionKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Rejected(ProviderRejection {
            kind,
            status,
            message: message.into(),
        })
    }

    /// Returns `true` for connectivity, timeout and malformed-response failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the call ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportFailure::Timeout(_)))
    }

    /// Returns `true` if the backend refused the credential.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::Rejected(ProviderRejection {
                kind: RejectionKind::InvalidCredential,
                ..
            })
        )
    }

    /// Determines whether this error may succeed if retried.
    ///
    /// Transport failures, rate limits and temporarily unavailable backends
    /// are retryable; credential and input-size rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected(rejection) => matches!(
                rejection.kind,
                RejectionKind::RateLimited | RejectionKind::Unavailable
            ),
        }
    }
}

/// Why a request produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// Connecting to or talking with the backend failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call exceeded its time budget.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend replied with something that could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A backend-reported refusal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRejection {
    /// Classification of the refusal.
    pub kind: RejectionKind,
    /// HTTP status code, when the backend is HTTP based.
    pub status: Option<u16>,
    /// Backend-supplied message.
    pub message: String,
}

impl fmt::Display for ProviderRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Classification of a provider rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// Credential missing, revoked or lacking permission.
    InvalidCredential,
    /// Too many requests.
    RateLimited,
    /// Prompt exceeds the model's context window.
    InputTooLong,
    /// Backend overloaded or failing.
    Unavailable,
    /// Any other refusal.
    Other,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidCredential => "invalid credential",
            Self::RateLimited => "rate limited",
            Self::InputTooLong => "input too long",
            Self::Unavailable => "service unavailable",
            Self::Other => "rejected",
        };
        f.write_str(label)
    }
}

/// Failure to decode an input document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The bytes are not valid text in the expected encoding.
    #[error("document is not valid UTF-8: {0}")]
    Encoding(String),

    /// Reading the document failed.
    #[error("failed to read document: {0}")]
    Io(#[from] IoError),
}
