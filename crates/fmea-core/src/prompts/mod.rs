//! Prompt templates for segmentation and analysis.
//!
//! Default templates are markdown documents with `Usage` and `Prompt`
//! sections, embedded at compile time using `include_str!`. Callers may swap
//! either template for their own text; the core treats the wording as opaque
//! and only substitutes `{{placeholder}}` markers.

use std::fs;
use std::path::Path;

use crate::{Error, Result};

// Embed prompt files at compile time
const SEGMENTATION_MD: &str = include_str!("../../../../prompts/segmentation.md");
const ANALYSIS_MD: &str = include_str!("../../../../prompts/analysis.md");

/// Placeholder replaced with the document text in the segmentation template.
pub const CONTENT_PLACEHOLDER: &str = "{{content}}";
/// Placeholder replaced with the thread text in the analysis template.
pub const THREAD_PLACEHOLDER: &str = "{{thread}}";
/// Placeholder replaced with caller-supplied extra instructions.
pub const INSTRUCTIONS_PLACEHOLDER: &str = "{{instructions}}";

/// Every placeholder starts with this.
const MARKER_OPEN: &str = "{{";

/// A prompt body with `{{placeholder}}` markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    name: String,
    body: String,
}

impl PromptTemplate {
    /// Creates a template, checking that `required` occurs in `body`.
    ///
    /// # Errors
    /// Returns an error if the required placeholder is missing.
    pub fn new(name: impl Into<String>, body: impl Into<String>, required: &str) -> Result<Self> {
        let name = name.into();
        let body = body.into();
        if !body.contains(required) {
            return Err(Error::Prompt(format!(
                "template '{name}' is missing the {required} placeholder"
            )));
        }
        Ok(Self { name, body })
    }

    /// Label used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template text with its placeholders intact.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Substitutes every `(placeholder, value)` pair into the body.
    ///
    /// The body is scanned once, so a value that itself contains a
    /// placeholder is inserted literally. Unknown `{{...}}` markers are kept.
    #[must_use]
    pub fn render(&self, substitutions: &[(&str, &str)]) -> String {
        let mut rendered = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();

        while let Some(start) = rest.find(MARKER_OPEN) {
            let (before, marker) = rest.split_at(start);
            rendered.push_str(before);

            let (value, consumed) = substitutions
                .iter()
                .find(|(placeholder, _)| marker.starts_with(placeholder))
                .map_or((MARKER_OPEN, MARKER_OPEN.len()), |(placeholder, value)| {
                    (*value, placeholder.len())
                });
            rendered.push_str(value);
            rest = &marker[consumed..];
        }

        rendered.push_str(rest);
        rendered
    }
}

/// The pair of templates a pipeline run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    /// Splits a document into one thread per line
    pub segmentation: PromptTemplate,
    /// Produces the FMECA and case study for one thread
    pub analysis: PromptTemplate,
}

impl PromptTemplates {
    /// Templates compiled into the binary.
    ///
    /// # Errors
    /// Returns an error if an embedded prompt file is malformed.
    pub fn embedded() -> Result<Self> {
        Ok(Self {
            segmentation: PromptTemplate::new(
                "segmentation",
                extract_prompt_section(SEGMENTATION_MD)?,
                CONTENT_PLACEHOLDER,
            )?,
            analysis: PromptTemplate::new(
                "analysis",
                extract_prompt_section(ANALYSIS_MD)?,
                THREAD_PLACEHOLDER,
            )?,
        })
    }

    /// Embedded templates, with either one replaced by a file when a path is given.
    ///
    /// Override files may be plain text or markdown with a `## Prompt` section.
    ///
    /// # Errors
    /// Returns an error if an override cannot be read or lacks its placeholder.
    pub fn with_overrides(segmentation: Option<&Path>, analysis: Option<&Path>) -> Result<Self> {
        let mut templates = Self::embedded()?;
        if let Some(path) = segmentation {
            templates.segmentation =
                PromptTemplate::new("segmentation", read_template(path)?, CONTENT_PLACEHOLDER)?;
        }
        if let Some(path) = analysis {
            templates.analysis =
                PromptTemplate::new("analysis", read_template(path)?, THREAD_PLACEHOLDER)?;
        }
        Ok(templates)
    }
}

/// Formats extra instructions for the `{{instructions}}` slot.
///
/// Blank instructions render as nothing, so templates read cleanly without them.
#[must_use]
pub fn render_instructions(extra: &str) -> String {
    let trimmed = extra.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("Additional instructions:\n{trimmed}")
    }
}

fn read_template(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|err| Error::Prompt(format!("failed to read {}: {err}", path.display())))?;
    if content.contains("## Prompt") {
        extract_prompt_section(&content)
    } else {
        Ok(content.trim().to_owned())
    }
}

/// Extracts the Prompt section from a markdown file
///
/// # Errors
/// Returns an error if the Prompt section cannot be found
fn extract_prompt_section(content: &str) -> Result<String> {
    let prompt_start = content
        .find("## Prompt")
        .ok_or_else(|| Error::Prompt("Prompt section not found".to_owned()))?;

    // Skip past the header line
    let prompt_content_start = content[prompt_start..]
        .find('\n')
        .ok_or_else(|| Error::Prompt("Invalid prompt format".to_owned()))?
        + prompt_start
        + 1;

    // ## Prompt is always the last top-level section
    Ok(content[prompt_content_start..].trim().to_owned())
}
