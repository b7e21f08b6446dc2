//! Integration tests for scored provider selection.

use std::sync::Arc;
use std::time::Duration;

use llm_dispatch::providers::PREFERENCE_BONUS;
use llm_dispatch::{
    ActiveLoad, DispatchConfig, DispatchError, MetricsStore, ModelType, PerformanceSample,
    ProviderConfig, ProviderSelector, SelectionPreferences,
};

fn selector(store: Arc<MetricsStore>) -> ProviderSelector {
    ProviderSelector::from_config(
        &DispatchConfig::default().provider_priority(["openai", "anthropic", "google", "ollama"]),
        store,
        Arc::new(ActiveLoad::new()),
    )
}

fn record_many(store: &MetricsStore, provider: &str, n: usize, latency_ms: u64, success: bool) {
    for _ in 0..n {
        let latency = Duration::from_millis(latency_ms);
        let sample = if success {
            PerformanceSample::success(provider, "m", latency, 100, 0.0)
        } else {
            PerformanceSample::failure(provider, "m", latency, "boom")
        };
        store.record(sample);
    }
}

fn prefer(provider: &str) -> SelectionPreferences {
    SelectionPreferences {
        preferred_provider: Some(provider.to_string()),
        ..Default::default()
    }
}

const ALL: [&str; 4] = ["openai", "anthropic", "google", "ollama"];

// ============================================================================
// Ranking
// ============================================================================

#[test]
fn cold_start_follows_priority() {
    let selector = selector(Arc::new(MetricsStore::new()));
    let decision = selector
        .select_provider(&ALL, ModelType::Chat, &SelectionPreferences::default())
        .unwrap();

    assert_eq!(decision.provider, "openai");
    assert_eq!(decision.model, "gpt-4o-mini");
    let alternatives: Vec<_> = decision.alternatives.iter().map(|c| c.provider.as_str()).collect();
    assert_eq!(alternatives, vec!["anthropic", "google", "ollama"]);
    assert!(!decision.reason.is_empty());
}

#[test]
fn history_outweighs_priority() {
    let store = Arc::new(MetricsStore::new());
    record_many(&store, "openai", 10, 4800, false);
    record_many(&store, "anthropic", 10, 400, true);
    let selector = selector(store);

    let decision = selector
        .select_provider(&ALL, ModelType::Reasoning, &SelectionPreferences::default())
        .unwrap();
    assert_eq!(decision.provider, "anthropic");
    assert_eq!(decision.model, "claude-3-7-sonnet-latest");
    assert_eq!(decision.alternatives.last().unwrap().provider, "openai");
}

#[test]
fn preference_adds_exactly_the_bonus() {
    let store = Arc::new(MetricsStore::new());
    // Drag google's score down so the bonus is not clamped away.
    record_many(&store, "google", 5, 6000, false);
    let selector = selector(store);

    let score_of = |prefs: &SelectionPreferences| {
        selector
            .rank(&ALL, ModelType::Chat, prefs)
            .unwrap()
            .into_iter()
            .find(|c| c.provider == "google")
            .unwrap()
            .score
    };
    let base = score_of(&SelectionPreferences::default());
    let preferred = score_of(&prefer("google"));

    assert!(base + PREFERENCE_BONUS <= 1.0);
    assert!((preferred - base - PREFERENCE_BONUS).abs() < 1e-9);
}

#[test]
fn scores_stay_in_unit_interval() {
    let store = Arc::new(MetricsStore::new());
    record_many(&store, "openai", 3, 50, true);
    record_many(&store, "anthropic", 3, 9000, false);
    store.record(PerformanceSample::success(
        "google",
        "m",
        Duration::from_millis(10),
        10,
        50.0,
    ));
    let selector = selector(store);

    for provider in ALL {
        for candidate in selector.rank(&ALL, ModelType::Chat, &prefer(provider)).unwrap() {
            assert!(
                (0.0..=1.0).contains(&candidate.score),
                "{} scored {}",
                candidate.provider,
                candidate.score
            );
        }
    }
}

#[test]
fn equal_scores_keep_candidate_order() {
    let providers = vec![
        ("a".to_string(), ProviderConfig::new("A", 1)),
        ("b".to_string(), ProviderConfig::new("B", 1)),
    ];
    let selector = ProviderSelector::new(
        providers,
        Arc::new(MetricsStore::new()),
        Arc::new(ActiveLoad::new()),
    );

    let ranked = selector
        .rank(&["b", "a"], ModelType::Chat, &SelectionPreferences::default())
        .unwrap();
    assert_eq!(ranked[0].score, ranked[1].score);
    assert_eq!(ranked[0].provider, "b");
}

#[test]
fn duplicate_candidates_are_scored_once() {
    let selector = selector(Arc::new(MetricsStore::new()));
    let ranked = selector
        .rank(
            &["google", "google", "openai"],
            ModelType::Chat,
            &SelectionPreferences::default(),
        )
        .unwrap();
    assert_eq!(ranked.len(), 2);
}

// ============================================================================
// Eligibility
// ============================================================================

#[test]
fn saturated_provider_is_never_selected() {
    let load = Arc::new(ActiveLoad::new());
    let selector = ProviderSelector::new(
        vec![
            ("a".to_string(), ProviderConfig::new("A", 1).max_concurrent(1)),
            ("b".to_string(), ProviderConfig::new("B", 2)),
        ],
        Arc::new(MetricsStore::new()),
        Arc::clone(&load),
    );
    let _busy = load.acquire("a");

    let decision = selector
        .select_provider(&["a", "b"], ModelType::Chat, &prefer("a"))
        .unwrap();
    assert_eq!(decision.provider, "b");
    assert!(decision.alternatives.is_empty());

    let err = selector
        .select_provider(&["a"], ModelType::Chat, &SelectionPreferences::default())
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::NoEligibleProvider {
            candidates: vec!["a".into()]
        }
    );
}

#[test]
fn disabled_provider_is_skipped_until_re_enabled() {
    let selector = selector(Arc::new(MetricsStore::new()));
    selector.set_enabled("openai", false).unwrap();

    let decision = selector
        .select_provider(&ALL, ModelType::Chat, &SelectionPreferences::default())
        .unwrap();
    assert_eq!(decision.provider, "anthropic");

    selector.set_enabled("openai", true).unwrap();
    let decision = selector
        .select_provider(&ALL, ModelType::Chat, &SelectionPreferences::default())
        .unwrap();
    assert_eq!(decision.provider, "openai");
}

#[test]
fn set_enabled_on_unknown_provider_fails() {
    let selector = selector(Arc::new(MetricsStore::new()));
    assert!(matches!(
        selector.set_enabled("mystery", false),
        Err(DispatchError::Configuration(_))
    ));
}

#[test]
fn reconfigure_adds_and_validates_providers() {
    let selector = selector(Arc::new(MetricsStore::new()));
    selector
        .reconfigure("mistral", ProviderConfig::new("Mistral", 5).max_concurrent(3))
        .unwrap();
    assert_eq!(selector.provider("mistral").unwrap().max_concurrent, 3);
    assert_eq!(selector.priority_order().last().unwrap(), "mistral");

    assert!(selector
        .reconfigure("mistral", ProviderConfig::new("Mistral", 0))
        .is_err());
    assert_eq!(selector.provider("mistral").unwrap().priority, 5);
}

#[test]
fn latency_budget_penalises_slow_history() {
    let store = Arc::new(MetricsStore::new());
    record_many(&store, "openai", 5, 1500, true);
    record_many(&store, "anthropic", 5, 1400, true);
    let selector = selector(store);

    let prefs = SelectionPreferences {
        max_latency_ms: Some(1450),
        ..Default::default()
    };
    let ranked = selector.rank(&["openai", "anthropic"], ModelType::Chat, &prefs).unwrap();
    let openai = ranked.iter().find(|c| c.provider == "openai").unwrap();
    assert_eq!(openai.breakdown.latency, 0.0);
    assert_eq!(ranked[0].provider, "anthropic");
}

#[test]
fn latency_budget_leaves_cold_providers_at_fallback_score() {
    let store = Arc::new(MetricsStore::new());
    record_many(&store, "openai", 5, 1600, true);
    let selector = selector(store);

    // The budget sits below the 2000 ms fallback, but only measured history
    // is held against it.
    let prefs = SelectionPreferences {
        max_latency_ms: Some(1500),
        ..Default::default()
    };
    let ranked = selector.rank(&["openai", "google"], ModelType::Chat, &prefs).unwrap();
    let openai = ranked.iter().find(|c| c.provider == "openai").unwrap();
    let google = ranked.iter().find(|c| c.provider == "google").unwrap();
    assert_eq!(openai.breakdown.latency, 0.0);
    assert!((google.breakdown.latency - 0.75).abs() < 1e-9);
}

#[test]
fn load_accounting_round_trips() {
    let selector = selector(Arc::new(MetricsStore::new()));
    selector.increment_load("google");
    selector.increment_load("google");
    assert_eq!(selector.active_load("google"), 2);
    selector.decrement_load("google");
    selector.decrement_load("google");
    selector.decrement_load("google");
    assert_eq!(selector.active_load("google"), 0);
}
