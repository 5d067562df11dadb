//! Rendering of run reports for stdout.

use std::io::Write;

use anyhow::Result;
use fmea_core::Thread;
use fmea_pipeline::{RunReport, SegmentedDocument};
use serde::Serialize;

const RULE_WIDTH: usize = 80;

/// JSON shape of a full run.
#[derive(Debug, Serialize)]
struct ReportView<'report> {
    truncated: bool,
    stopped: Option<String>,
    succeeded: usize,
    failed: usize,
    threads: Vec<ThreadView<'report>>,
}

#[derive(Debug, Serialize)]
struct ThreadView<'report> {
    index: usize,
    content: &'report str,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'report str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'report str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'report> ReportView<'report> {
    fn new(report: &'report RunReport) -> Self {
        let threads = report
            .entries()
            .map(|(thread, result)| {
                let analysis = result.analysis.as_ref();
                ThreadView {
                    index: thread.index,
                    content: &thread.content,
                    analysis: analysis.map(|generated| generated.text.as_str()),
                    provider: analysis.map(|generated| generated.provider.as_str()),
                    latency_ms: analysis.map(|generated| generated.latency_ms),
                    tokens: analysis.map(|generated| generated.tokens_used.total()),
                    error: result.error.as_ref().map(ToString::to_string),
                }
            })
            .collect();

        Self {
            truncated: report.truncated,
            stopped: report.stopped.map(|reason| reason.to_string()),
            succeeded: report.success_count(),
            failed: report.failure_count(),
            threads,
        }
    }
}

/// Writes `report` as headed sections, one per thread.
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_report_text(out: &mut impl Write, report: &RunReport) -> Result<()> {
    if report.truncated {
        writeln!(
            out,
            "Note: the document exceeded the input limit; only its leading portion was analysed.\n"
        )?;
    }
    if report.threads.is_empty() {
        writeln!(out, "No threads found in the document.")?;
        return Ok(());
    }

    for (thread, result) in report.entries() {
        write_heading(out, thread)?;
        match (result.text(), &result.error) {
            (Some(text), _) => writeln!(out, "Analysis:\n{text}\n")?,
            (None, Some(error)) => writeln!(out, "Error: {error}\n")?,
            (None, None) => writeln!(out, "No analysis available.\n")?,
        }
    }

    let tokens = report.analysis_tokens();
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(
        out,
        "{} thread(s): {} analysed, {} failed; {} tokens ({} in, {} out)",
        report.threads.len(),
        report.success_count(),
        report.failure_count(),
        tokens.total(),
        tokens.input,
        tokens.output
    )?;
    if let Some(reason) = report.stopped {
        writeln!(out, "Run stopped early: {reason}")?;
    }
    Ok(())
}

/// Writes `report` as a single pretty-printed JSON document.
///
/// # Errors
/// Returns an error if serialization or writing fails.
pub fn write_report_json(out: &mut impl Write, report: &RunReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, &ReportView::new(report))?;
    writeln!(out)?;
    Ok(())
}

/// Writes segmented threads as headed sections.
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_threads_text(out: &mut impl Write, segmented: &SegmentedDocument) -> Result<()> {
    if segmented.truncated {
        writeln!(
            out,
            "Note: the document exceeded the input limit; only its leading portion was segmented.\n"
        )?;
    }
    for thread in &segmented.threads {
        write_heading(out, thread)?;
    }
    writeln!(out, "Total threads: {}", segmented.threads.len())?;
    Ok(())
}

/// Writes segmented threads as a JSON document.
///
/// # Errors
/// Returns an error if serialization or writing fails.
pub fn write_threads_json(out: &mut impl Write, segmented: &SegmentedDocument) -> Result<()> {
    #[derive(Serialize)]
    struct ThreadsView<'doc> {
        truncated: bool,
        threads: &'doc [Thread],
    }

    serde_json::to_writer_pretty(
        &mut *out,
        &ThreadsView {
            truncated: segmented.truncated,
            threads: &segmented.threads,
        },
    )?;
    writeln!(out)?;
    Ok(())
}

fn write_heading(out: &mut impl Write, thread: &Thread) -> Result<()> {
    writeln!(out, "Thread {}", thread.index)?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out, "{}\n", thread.content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmea_core::{GeneratedText, GenerationError, TokenUsage};
    use fmea_pipeline::{AnalysisError, AnalysisResult, StopReason};
    use serde_json::Value as JsonValue;

    fn sample_report() -> RunReport {
        RunReport {
            threads: vec![
                Thread::new(1, "Fuel pump tripped at sea"),
                Thread::new(2, "Steering gear alarm in port"),
            ],
            results: vec![
                AnalysisResult {
                    index: 1,
                    analysis: Some(GeneratedText {
                        text: "Failure Mode: fuel pump trips".to_owned(),
                        tokens_used: TokenUsage {
                            input: 120,
                            output: 30,
                        },
                        provider: "OpenAI/gpt-4".to_owned(),
                        latency_ms: 850,
                    }),
                    error: None,
                },
                AnalysisResult {
                    index: 2,
                    analysis: None,
                    error: Some(AnalysisError::Generation {
                        index: 2,
                        source: GenerationError::connection("reset by peer"),
                    }),
                },
            ],
            truncated: true,
            stopped: None,
        }
    }

    fn render(write: impl Fn(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_text_report_sections() {
        let report = sample_report();
        let text = render(|out| write_report_text(out, &report));

        assert!(text.starts_with("Note: the document exceeded"));
        assert!(text.contains("Thread 1\n"));
        assert!(text.contains("Analysis:\nFailure Mode: fuel pump trips"));
        assert!(text.contains("Thread 2\n"));
        assert!(text.contains("Error: Analysis of thread 2 failed"));
        assert!(text.contains("2 thread(s): 1 analysed, 1 failed; 150 tokens"));
        assert!(text.find("Thread 1").unwrap() < text.find("Thread 2").unwrap());
    }

    #[test]
    fn test_text_report_without_threads() {
        let report = RunReport {
            threads: Vec::new(),
            results: Vec::new(),
            truncated: false,
            stopped: None,
        };
        let text = render(|out| write_report_text(out, &report));
        assert_eq!(text, "No threads found in the document.\n");
    }

    #[test]
    fn test_text_report_mentions_early_stop() {
        let mut report = sample_report();
        report.stopped = Some(StopReason::CredentialRejected);
        let text = render(|out| write_report_text(out, &report));
        assert!(text.contains("Run stopped early: provider rejected the credential"));
    }

    #[test]
    fn test_json_report_shape() {
        let report = sample_report();
        let json: JsonValue =
            serde_json::from_str(&render(|out| write_report_json(out, &report))).unwrap();

        assert_eq!(json["truncated"], true);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["threads"][0]["index"], 1);
        assert_eq!(json["threads"][0]["analysis"], "Failure Mode: fuel pump trips");
        assert_eq!(json["threads"][0]["tokens"], 150);
        assert!(json["threads"][0].get("error").is_none());
        assert!(json["threads"][1].get("analysis").is_none());
        assert!(
            json["threads"][1]["error"]
                .as_str()
                .unwrap()
                .contains("reset by peer")
        );
    }

    #[test]
    fn test_threads_json() {
        let segmented = SegmentedDocument {
            threads: vec![Thread::new(1, "A"), Thread::new(2, "B")],
            truncated: false,
        };
        let json: JsonValue =
            serde_json::from_str(&render(|out| write_threads_json(out, &segmented))).unwrap();

        assert_eq!(json["threads"][1]["index"], 2);
        assert_eq!(json["threads"][1]["content"], "B");
    }
}
