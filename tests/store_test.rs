//! Integration tests for the sample ledger.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use llm_dispatch::{MAX_SAMPLES, MetricsStore, PerformanceSample};

#[test]
fn default_capacity_keeps_the_newest_thousand() {
    let store = MetricsStore::new();
    for i in 0..(MAX_SAMPLES + 1) {
        store.record(PerformanceSample::success(
            "openai",
            format!("m{i}"),
            Duration::from_millis(10),
            1,
            0.0,
        ));
    }
    assert_eq!(store.len(), MAX_SAMPLES);
    let samples = store.samples();
    assert_eq!(samples.first().unwrap().model, "m1");
    assert_eq!(samples.last().unwrap().model, format!("m{MAX_SAMPLES}"));
}

#[test]
fn concurrent_recording_loses_nothing() {
    let store = Arc::new(MetricsStore::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store.record(PerformanceSample::failure(
                        format!("p{t}"),
                        "m",
                        Duration::from_millis(5),
                        "timeout",
                    ));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 400);
    let agg = store.aggregate(Duration::from_secs(60));
    assert_eq!(agg.len(), 8);
    assert!(agg.values().all(|a| a.total_requests == 50 && a.success_rate == 0.0));
}

#[test]
fn aggregates_mix_success_and_failure() {
    let store = MetricsStore::new();
    let now = SystemTime::now();
    store.record(
        PerformanceSample::success("anthropic", "claude", Duration::from_millis(800), 200, 0.004)
            .at(now),
    );
    store.record(
        PerformanceSample::success("anthropic", "claude", Duration::from_millis(1200), 100, 0.002)
            .at(now),
    );
    store.record(
        PerformanceSample::failure("anthropic", "claude", Duration::from_millis(4000), "429").at(now),
    );

    let agg = &store.aggregate_at(now, Duration::from_secs(3600))["anthropic"];
    assert_eq!(agg.total_requests, 3);
    assert_eq!(agg.successful_requests, 2);
    assert!((agg.success_rate - 2.0 / 3.0).abs() < 1e-12);
    assert!((agg.avg_latency_ms - 2000.0).abs() < 1e-9);
    assert!((agg.total_cost - 0.006).abs() < 1e-12);
    assert_eq!(agg.total_tokens, 300);
}
