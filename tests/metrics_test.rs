//! Tests for metrics emitted by the dispatcher.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::future::Future;

use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use llm_dispatch::telemetry;
use llm_dispatch::{
    AttemptContext, CallError, DispatchConfig, DispatchOptions, Dispatcher, ProviderSettings,
    RequestPolicy,
};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a metric name and, optionally, a label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((k, v)) => key.key().labels().any(|l| l.key() == k && l.value() == v),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Number of histogram observations recorded for a metric name.
fn histogram_count(snapshot: &SnapshotVec, name: &str) -> usize {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Histogram(v) => v.len(),
            _ => 0,
        })
        .sum()
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the dispatch.
fn capture<F: Future>(fut: F) -> (F::Output, SnapshotVec) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    });
    (output, snapshotter.snapshot().into_vec())
}

fn dispatcher() -> Dispatcher {
    Dispatcher::new(DispatchConfig::default().provider_priority(["openai", "anthropic"])).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_attempt_records_start_ok_and_latency() {
    let dispatcher = dispatcher();
    let (result, snapshot) = capture(dispatcher.dispatch(
        &RequestPolicy::new(),
        |_ctx: AttemptContext| async { Ok::<_, CallError>(()) },
        DispatchOptions::new(),
    ));
    assert!(result.is_ok());

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "start"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "ok"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("model", "gpt-4o-mini"))),
        2
    );
    assert_eq!(histogram_count(&snapshot, telemetry::LATENCY_MS), 1);
    assert_eq!(counter_total(&snapshot, telemetry::DISPATCH_EXHAUSTED_TOTAL, None), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failures_are_labelled_with_their_code() {
    let dispatcher = dispatcher();
    let (result, snapshot) = capture(dispatcher.dispatch(
        &RequestPolicy::new(),
        |ctx: AttemptContext| async move {
            Err::<(), _>(match ctx.provider.as_str() {
                "openai" => CallError::Timeout,
                _ => CallError::from_code("429", "too many requests"),
            })
        },
        DispatchOptions::new(),
    ));
    assert!(result.is_err());

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "start"))),
        2
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "timeout"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "429"))),
        1
    );
    assert_eq!(histogram_count(&snapshot, telemetry::LATENCY_MS), 2);
    assert_eq!(counter_total(&snapshot, telemetry::DISPATCH_EXHAUSTED_TOTAL, None), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn transport_failures_keep_their_code() {
    let dispatcher = dispatcher();
    let (result, snapshot) = capture(dispatcher.dispatch(
        &RequestPolicy::new(),
        |ctx: AttemptContext| async move {
            match ctx.provider.as_str() {
                "openai" => Err(CallError::from_code("ECONNRESET", "socket hang up")),
                _ => Ok(()),
            }
        },
        DispatchOptions::new(),
    ));
    assert!(result.is_ok());

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "ECONNRESET"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("phase", "network"))),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cost_overrun_is_counted() {
    let dispatcher = dispatcher();
    let (result, snapshot) = capture(dispatcher.dispatch(
        &RequestPolicy::new().max_cost(0.001),
        |_ctx: AttemptContext| async { Ok::<_, CallError>(()) },
        DispatchOptions::new().cost_estimator(|_: &()| Some(0.01)),
    ));
    assert!(result.is_err());

    assert_eq!(counter_total(&snapshot, telemetry::COST_EXCEEDED_TOTAL, None), 2);
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::COST_EXCEEDED_TOTAL,
            Some(("provider", "anthropic"))
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn static_fallback_is_counted() {
    let config = DispatchConfig::default()
        .provider_priority(["openai"])
        .provider(
            "openai",
            ProviderSettings {
                max_concurrent: Some(1),
                ..Default::default()
            },
        );
    let dispatcher = Dispatcher::new(config).unwrap();
    dispatcher.selector().increment_load("openai");

    let (result, snapshot) = capture(dispatcher.dispatch(
        &RequestPolicy::new(),
        |_ctx: AttemptContext| async { Ok::<_, CallError>(()) },
        DispatchOptions::new(),
    ));
    assert!(result.is_ok());
    assert_eq!(counter_total(&snapshot, telemetry::SELECTION_FALLBACK_TOTAL, None), 1);
}

#[tokio::test]
async fn dispatch_without_recorder_is_a_no_op() {
    let dispatcher = dispatcher();
    let result = dispatcher
        .dispatch(
            &RequestPolicy::new(),
            |_ctx: AttemptContext| async { Ok::<_, CallError>(1) },
            DispatchOptions::new(),
        )
        .await;
    assert_eq!(result.unwrap(), 1);
}
