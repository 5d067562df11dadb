use async_trait::async_trait;

use crate::{Document, GeneratedText, GenerationResult, LoadError, ProviderIdentity, SamplingConfig};

/// A text-generation backend.
///
/// Implementations accept every [`SamplingConfig`] field and silently drop the
/// ones their backend does not support.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the unique identifier for this provider.
    fn name(&self) -> &'static str;

    /// Generates text for the given prompt.
    ///
    /// Performs at most one network round trip and never retries.
    ///
    /// # Errors
    ///
    /// Returns a transport failure when no usable response arrived, or a
    /// rejection when the backend refused the request.
    async fn generate(&self, prompt: &str, config: &SamplingConfig) -> GenerationResult<GeneratedText>;
}

/// Decodes raw file bytes into a [`Document`].
pub trait DocumentLoader {
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded.
    fn load(&self, bytes: &[u8]) -> Result<Document, LoadError>;
}

/// Supplies provider credentials at provider construction time.
pub trait CredentialResolver {
    /// Returns the API key for `identity`, if one is configured.
    fn resolve(&self, identity: ProviderIdentity) -> Option<String>;
}
