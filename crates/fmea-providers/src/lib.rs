//! Provider adapters for external text-generation services.
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

/// Anthropic (Claude) provider implementation.
pub mod anthropic;
/// Groq provider implementation.
pub mod groq;
mod http;
/// Scripted provider for tests.
pub mod mock;
/// `OpenAI` provider implementation.
pub mod openai;
/// Identity-to-provider registry.
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use groq::GroqProvider;
pub use mock::{MockCall, MockProvider, MockReply};
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
