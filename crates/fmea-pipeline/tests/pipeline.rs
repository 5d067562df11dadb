//! End-to-end pipeline runs against a scripted provider.
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
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use fmea_core::{
    Document, GenerationError, PromptTemplates, ProviderIdentity, RejectionKind, SamplingConfig,
};
use fmea_pipeline::{
    AnalysisError, BlankThreadPolicy, CancellationToken, PipelineOptions, PipelineOrchestrator,
    RunError, RunRequest, StopReason,
};
use fmea_providers::{MockProvider, ProviderRegistry};
use tokio::time::sleep;

/// Marker only present in the segmentation prompt.
const SEGMENTATION_MARKER: &str = "Document:";
const DOCUMENT: &str = "Engine room correspondence, MV Northern Star, March voyage";
const THREE_THREADS: &str = "Thread alpha: fuel pump tripped\n\
                             Thread beta: steering gear alarm\n\
                             Thread gamma: boiler flame failure";

fn fast_options() -> PipelineOptions {
    PipelineOptions::default()
        .with_call_timeout(Duration::from_secs(5))
        .with_max_retries(0)
}

fn orchestrator(provider: &MockProvider, options: PipelineOptions) -> PipelineOrchestrator {
    let registry =
        ProviderRegistry::new().with_provider(ProviderIdentity::OpenAi, Arc::new(provider.clone()));
    PipelineOrchestrator::new(registry, PromptTemplates::embedded().unwrap(), options)
}

fn three_thread_provider() -> MockProvider {
    MockProvider::new("mock/test").with_response(SEGMENTATION_MARKER, THREE_THREADS)
}

fn request() -> RunRequest {
    RunRequest::new(ProviderIdentity::OpenAi)
}

#[tokio::test]
async fn test_threads_numbered_in_segmenter_order() {
    let provider = three_thread_provider()
        .with_response("Thread alpha", "analysis alpha")
        .with_response("Thread beta", "analysis beta")
        .with_response("Thread gamma", "analysis gamma");

    let report = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    let indices: Vec<_> = report.threads.iter().map(|thread| thread.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(report.threads[1].content, "Thread beta: steering gear alarm");

    assert_eq!(report.results.len(), report.threads.len());
    let texts: Vec<_> = report.results.iter().map(|result| result.text().unwrap()).collect();
    assert_eq!(texts, vec!["analysis alpha", "analysis beta", "analysis gamma"]);
    assert!(!report.truncated);
    assert_eq!(report.stopped, None);

    // One segmentation call plus one per thread.
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn test_results_keep_thread_order_when_calls_finish_out_of_order() {
    let provider = three_thread_provider()
        .with_delayed_response("Thread alpha", Duration::from_millis(150), "slow alpha")
        .with_response("Thread beta", "fast beta")
        .with_response("Thread gamma", "fast gamma");

    let report = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    let indices: Vec<_> = report.results.iter().map(|result| result.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(report.results[0].text(), Some("slow alpha"));
}

#[tokio::test]
async fn test_segmentation_failure_yields_no_results() {
    let provider = MockProvider::new("mock/test")
        .with_failure(SEGMENTATION_MARKER, GenerationError::connection("refused"));

    let err = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap_err();

    match err {
        RunError::Segmentation(seg) => assert!(seg.source.is_transport()),
        other => panic!("expected segmentation error, got {other:?}"),
    }
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_empty_segmentation_is_valid_terminal_state() {
    let provider = MockProvider::new("mock/test").with_response(SEGMENTATION_MARKER, "");

    let report = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert!(report.threads.is_empty());
    assert!(report.results.is_empty());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_one_failing_thread_is_isolated() {
    let provider = three_thread_provider()
        .with_failure(
            "Thread beta",
            GenerationError::rejected(
                RejectionKind::InputTooLong,
                Some(400),
                "context_length_exceeded",
            ),
        )
        .with_default_response("analysis");

    let report = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.failure_count(), 1);
    assert!(report.results[0].is_success());
    assert!(report.results[2].is_success());

    let failed = &report.results[1];
    assert!(failed.analysis.is_none());
    assert!(matches!(
        failed.error,
        Some(AnalysisError::Generation { index: 2, .. })
    ));
}

#[tokio::test]
async fn test_timed_out_thread_reports_transport_error() {
    let provider = three_thread_provider()
        .with_delayed_response("Thread beta", Duration::from_millis(500), "too late")
        .with_default_response("analysis");
    let options = fast_options().with_call_timeout(Duration::from_millis(100));

    let report = orchestrator(&provider, options)
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    let indices: Vec<_> = report.results.iter().map(|result| result.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(report.results[0].text(), Some("analysis"));
    assert_eq!(report.results[2].text(), Some("analysis"));

    let error = report.results[1].error.as_ref().unwrap();
    assert!(error.is_transport());
    assert!(error.generation_error().unwrap().is_timeout());
}

#[tokio::test]
async fn test_long_document_truncated_before_segmentation() {
    let provider = MockProvider::new("mock/test").with_response(SEGMENTATION_MARKER, "");
    let long_document = format!("{DOCUMENT}{}", "y".repeat(20_000));

    let report = orchestrator(&provider, fast_options().with_max_input_chars(16_000))
        .run(Document::new(long_document), &request())
        .await
        .unwrap();

    assert!(report.truncated);
    let prompt = &provider.get_call_history()[0];
    let kept_ys = 16_000 - DOCUMENT.chars().count();
    assert!(prompt.contains(&"y".repeat(kept_ys)));
    assert!(!prompt.contains(&"y".repeat(kept_ys + 1)));
}

#[tokio::test]
async fn test_unknown_provider_fails_before_any_call() {
    let parse_err = "Unknown".parse::<ProviderIdentity>().unwrap_err();
    assert!(parse_err.is_configuration());

    let provider = three_thread_provider();
    let err = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &RunRequest::new(ProviderIdentity::Groq))
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Configuration(_)));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_transient_failure_retried() {
    let provider = three_thread_provider()
        .with_failures_then_response(
            "Thread beta",
            vec![GenerationError::rejected(RejectionKind::Unavailable, Some(503), "overloaded")],
            "analysis beta",
        )
        .with_default_response("analysis");
    let mut options = fast_options().with_max_retries(1);
    options.call_policy.base_delay = Duration::from_millis(1);

    let report = orchestrator(&provider, options)
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert_eq!(report.failure_count(), 0);
    assert_eq!(report.results[1].text(), Some("analysis beta"));
    assert_eq!(provider.call_count(), 5);
}

#[tokio::test]
async fn test_rejected_credential_stops_further_analyses() {
    let provider = three_thread_provider()
        .with_failure(
            "Thread alpha",
            GenerationError::rejected(
                RejectionKind::InvalidCredential,
                Some(401),
                "invalid api key",
            ),
        )
        .with_default_response("analysis");

    let report = orchestrator(&provider, fast_options().with_max_concurrent(1))
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.stopped, Some(StopReason::CredentialRejected));
    let first_error = report.results[0].error.as_ref().unwrap();
    assert!(first_error.generation_error().unwrap().is_credential_failure());
    for (position, result) in report.results.iter().enumerate().skip(1) {
        assert_eq!(
            result.error,
            Some(AnalysisError::NotAttempted {
                index: position + 1,
                reason: StopReason::CredentialRejected,
            })
        );
    }
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_cancellation_keeps_completed_work() {
    let provider = three_thread_provider()
        .with_delayed_response("Thread alpha", Duration::from_millis(200), "analysis alpha")
        .with_default_response("analysis");
    let orchestrator = orchestrator(&provider, fast_options().with_max_concurrent(1));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = orchestrator
        .run_with_cancel(Document::new(DOCUMENT), &request(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.stopped, Some(StopReason::Cancelled));
    assert_eq!(report.results[0].text(), Some("analysis alpha"));
    assert!(matches!(
        report.results[2].error,
        Some(AnalysisError::NotAttempted {
            index: 3,
            reason: StopReason::Cancelled
        })
    ));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_cancelled_before_segmentation() {
    let provider = three_thread_provider();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(&provider, fast_options())
        .run_with_cancel(Document::new(DOCUMENT), &request(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Cancelled));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_blank_threads_kept_or_dropped() {
    let reply = "Thread alpha: fuel pump tripped\n   \nThread gamma: boiler flame failure";

    let keeping_provider = MockProvider::new("mock/test")
        .with_response(SEGMENTATION_MARKER, reply)
        .with_default_response("analysis");
    let kept = orchestrator(&keeping_provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();
    assert_eq!(kept.threads.len(), 3);
    assert!(kept.threads[1].is_blank());

    let dropping_provider = MockProvider::new("mock/test")
        .with_response(SEGMENTATION_MARKER, reply)
        .with_default_response("analysis");
    let dropped = orchestrator(
        &dropping_provider,
        fast_options().with_blank_threads(BlankThreadPolicy::Drop),
    )
    .run(Document::new(DOCUMENT), &request())
    .await
    .unwrap();
    assert_eq!(dropped.threads.len(), 2);
    assert_eq!(dropped.threads[1].index, 2);
    assert_eq!(dropped.threads[1].content, "Thread gamma: boiler flame failure");
}

#[tokio::test]
async fn test_sampling_clamped_and_instructions_forwarded() {
    let provider = three_thread_provider().with_default_response("analysis");
    let sampling = SamplingConfig {
        temperature: 3.5,
        frequency_penalty: -1.0,
        max_output_tokens: 0,
        ..SamplingConfig::default()
    };

    orchestrator(&provider, fast_options())
        .run(
            Document::new(DOCUMENT),
            &request()
                .with_sampling(sampling)
                .with_instructions("Focus on the fuel system"),
        )
        .await
        .unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 4);
    for call in &calls {
        assert!((call.config.temperature - 1.0).abs() < f32::EPSILON);
        assert!(call.config.frequency_penalty.abs() < f32::EPSILON);
        assert_eq!(call.config.max_output_tokens, 1);
        assert!(call.prompt.contains("Focus on the fuel system"));
    }
}

#[tokio::test]
async fn test_segment_only_skips_analysis() {
    let provider = three_thread_provider();

    let segmented = orchestrator(&provider, fast_options())
        .segment(Document::new(DOCUMENT), &request(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(segmented.threads.len(), 3);
    assert!(!segmented.truncated);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_pending_retries() {
    let provider = three_thread_provider()
        .with_failure("Thread alpha", GenerationError::connection("reset"))
        .with_default_response("analysis");
    let mut options = fast_options().with_max_retries(3).with_max_concurrent(1);
    options.call_policy.base_delay = Duration::from_millis(100);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = orchestrator(&provider, options)
        .run_with_cancel(Document::new(DOCUMENT), &request(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.stopped, Some(StopReason::Cancelled));
    assert!(report.results[0].error.as_ref().unwrap().is_transport());
    assert!(matches!(
        report.results[1].error,
        Some(AnalysisError::NotAttempted {
            index: 2,
            reason: StopReason::Cancelled
        })
    ));
    // Segmentation plus the first alpha attempt; the backoff was cut short.
    assert_eq!(provider.call_count(), 2);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_rejected_credential_stops_retries_of_running_analyses() {
    let provider = three_thread_provider()
        .with_failure(
            "Thread alpha",
            GenerationError::rejected(RejectionKind::InvalidCredential, Some(401), "bad key"),
        )
        .with_failure("Thread beta", GenerationError::connection("reset"))
        .with_default_response("analysis");
    let mut options = fast_options().with_max_retries(3).with_max_concurrent(2);
    options.call_policy.base_delay = Duration::from_secs(10);

    let started = Instant::now();
    let report = orchestrator(&provider, options)
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert_eq!(report.stopped, Some(StopReason::CredentialRejected));
    assert!(report.results[1].error.as_ref().unwrap().is_transport());
    assert!(matches!(
        report.results[2].error,
        Some(AnalysisError::NotAttempted {
            index: 3,
            reason: StopReason::CredentialRejected
        })
    ));
    // Segmentation, alpha, and beta's single attempt.
    assert_eq!(provider.call_count(), 3);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_concurrency_limit_bounds_in_flight_analyses() {
    let threads: Vec<String> = (1..=6).map(|number| format!("Thread {number}: alarm")).collect();
    let provider = MockProvider::new("mock/test")
        .with_response(SEGMENTATION_MARKER, threads.join("\n"))
        .with_delayed_response("alarm", Duration::from_millis(60), "analysis");

    let started = Instant::now();
    let report = orchestrator(&provider, fast_options().with_max_concurrent(2))
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert_eq!(report.success_count(), 6);
    assert_eq!(provider.peak_in_flight(), 2);
    // Three waves of two.
    assert!(started.elapsed() >= Duration::from_millis(180));
}

#[tokio::test]
async fn test_default_concurrency_is_four() {
    let threads: Vec<String> = (1..=8).map(|number| format!("Thread {number}: alarm")).collect();
    let provider = MockProvider::new("mock/test")
        .with_response(SEGMENTATION_MARKER, threads.join("\n"))
        .with_delayed_response("alarm", Duration::from_millis(40), "analysis");

    let report = orchestrator(&provider, fast_options())
        .run(Document::new(DOCUMENT), &request())
        .await
        .unwrap();

    assert_eq!(report.success_count(), 8);
    assert_eq!(provider.peak_in_flight(), 4);
}
