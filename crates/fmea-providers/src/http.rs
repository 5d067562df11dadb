//! HTTP plumbing shared by the provider adapters.

use core::time::Duration;

use fmea_core::{Error, GenerationError, GenerationResult, RejectionKind, Result};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;

/// Default HTTP timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Longest slice of an error body carried into a rejection message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Builds an HTTP client with a whole-request timeout.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))
}

/// Sends `body` as JSON and returns the raw success body.
///
/// Non-2xx responses become rejections; send and read failures become
/// transport errors.
pub async fn post_json<B: Serialize + Sync>(
    request: RequestBuilder,
    body: &B,
    timeout: Duration,
) -> GenerationResult<String> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|err| send_error(&err, timeout))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| send_error(&err, timeout))?;

    if !status.is_success() {
        return Err(classify_status(status.as_u16(), &text));
    }

    Ok(text)
}

/// Maps a `reqwest` failure onto the transport taxonomy.
fn send_error(err: &reqwest::Error, timeout: Duration) -> GenerationError {
    if err.is_timeout() {
        GenerationError::timeout(timeout)
    } else if err.is_decode() {
        GenerationError::malformed(err.to_string())
    } else {
        GenerationError::connection(err.to_string())
    }
}

/// Classifies a non-success HTTP status and its body.
pub fn classify_status(status: u16, body: &str) -> GenerationError {
    let lowered = body.to_ascii_lowercase();
    let kind = match status {
        401 | 403 => RejectionKind::InvalidCredential,
        429 => RejectionKind::RateLimited,
        413 => RejectionKind::InputTooLong,
        400 if mentions_input_too_long(&lowered) => RejectionKind::InputTooLong,
        500 | 502 | 503 | 504 | 529 => RejectionKind::Unavailable,
        _ => RejectionKind::Other,
    };

    let message: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    GenerationError::rejected(kind, Some(status), message)
}

fn mentions_input_too_long(lowered: &str) -> bool {
    ["context_length", "context length", "too long", "maximum context"]
        .iter()
        .any(|needle| lowered.contains(needle))
}
