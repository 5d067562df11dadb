//! Provider registry mapping each [`ProviderIdentity`] to a live provider.
//!
//! Providers are instantiated once from explicit settings and credentials, so
//! concurrent runs against different backends never share mutable state.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use fmea_core::{
    AppConfig, CredentialResolver, Error, GenerationProvider, ProviderIdentity, ProviderSettings,
    Result,
};
use tracing::debug;

use crate::{AnthropicProvider, GroqProvider, OpenAiProvider};

/// Registry that maps provider identities to their instances.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    /// Map from identity to provider instance
    providers: HashMap<ProviderIdentity, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every provider the configuration has credentials for.
    ///
    /// # Errors
    /// Returns an error if a provider with a credential cannot be constructed.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::from_settings(&config.providers, config)
    }

    /// Builds every provider `credentials` can supply a key for.
    ///
    /// Providers without a key are left unregistered; asking for one later is
    /// a configuration error.
    ///
    /// # Errors
    /// Returns an error if a provider with a credential cannot be constructed.
    pub fn from_settings(
        settings: &ProviderSettings,
        credentials: &dyn CredentialResolver,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for identity in ProviderIdentity::all() {
            let Some(api_key) = credentials.resolve(identity) else {
                debug!(provider = %identity, "no credential configured, skipping");
                continue;
            };

            let provider = build_provider(identity, api_key, settings)?;
            registry.register(identity, provider);
            debug!(
                provider = %identity,
                model = settings.model_for(identity),
                "registered provider"
            );
        }

        Ok(registry)
    }

    /// Registers (or replaces) the provider for `identity`.
    pub fn register(&mut self, identity: ProviderIdentity, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(identity, provider);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_provider(
        mut self,
        identity: ProviderIdentity,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        self.register(identity, provider);
        self
    }

    /// Looks up the provider for `identity`.
    ///
    /// # Errors
    /// Returns [`Error::MissingApiKey`] if no provider was registered for it.
    pub fn get(&self, identity: ProviderIdentity) -> Result<Arc<dyn GenerationProvider>> {
        self.providers.get(&identity).map(Arc::clone).ok_or_else(|| {
            Error::MissingApiKey(format!(
                "{} (no credential configured for {identity})",
                identity.env_key()
            ))
        })
    }

    /// Identities with a registered provider, in declaration order.
    #[must_use]
    pub fn available(&self) -> Vec<ProviderIdentity> {
        let mut identities: Vec<_> = self.providers.keys().copied().collect();
        identities.sort();
        identities
    }
}

/// Constructs the concrete provider for `identity`.
///
/// # Errors
/// Returns an error if the key is empty or the HTTP client cannot be built.
fn build_provider(
    identity: ProviderIdentity,
    api_key: String,
    settings: &ProviderSettings,
) -> Result<Arc<dyn GenerationProvider>> {
    let timeout = Duration::from_secs(settings.request_timeout_seconds.max(1));
    let model = settings.model_for(identity).to_owned();
    let base_url = settings.base_url_for(identity).map(str::to_owned);

    let provider: Arc<dyn GenerationProvider> = match identity {
        ProviderIdentity::OpenAi => {
            let mut provider = OpenAiProvider::new(api_key)?
                .with_model(model)
                .with_timeout(timeout)?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        ProviderIdentity::Anthropic => {
            let mut provider = AnthropicProvider::new(api_key)?
                .with_model(model)
                .with_timeout(timeout)?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        ProviderIdentity::Groq => {
            let mut provider = GroqProvider::new(api_key)?
                .with_model(model)
                .with_timeout(timeout)?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
    };

    Ok(provider)
}
