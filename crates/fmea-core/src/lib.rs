//! Core types and traits for the incident thread analyzer.
//!
//! This crate provides the data model, error taxonomy, provider and loader
//! traits, prompt templates and configuration shared by every other crate.
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

/// Application configuration loaded from TOML.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Prompt template loading and rendering.
pub mod prompts;
/// Trait definitions for providers and external collaborators.
pub mod traits;
/// Core data types for documents, threads and sampling.
pub mod types;

pub use config::{ApiKeys, AppConfig, PipelineSettings, ProviderSettings};
pub use error::{
    Error, GenerationError, GenerationResult, LoadError, ProviderRejection, RejectionKind, Result,
    TransportFailure,
};
pub use prompts::{PromptTemplate, PromptTemplates};
pub use traits::{CredentialResolver, DocumentLoader, GenerationProvider};
pub use types::{Document, GeneratedText, ProviderIdentity, SamplingConfig, Thread, TokenUsage};
