//! Scored provider selection with admission control.
//!
//! [`ProviderSelector`] turns a pool of candidate provider ids into a ranked
//! [`LoadBalancingDecision`]. Each selection:
//!
//! 1. drops candidates that are unknown, disabled, or at their concurrency
//!    ceiling (admission control);
//! 2. scores the rest from the [`MetricsStore`] aggregates and the live
//!    [`ActiveLoad`] snapshot;
//! 3. sorts by score (stable, so ties keep input order) and maps the winner
//!    to a concrete model via the [`ModelTable`].
//!
//! # Scoring
//!
//! ```text
//! final = cost·cost_weight + latency·latency_weight + reliability·reliability_weight
//!       + load·0.10 + priority·0.10 + preference_bonus        (clamped to [0, 1])
//! ```
//!
//! | signal        | value                                                         |
//! |---------------|---------------------------------------------------------------|
//! | cost          | `max(0, 1 − recent_cost / base_unit_cost)`; 0 over `max_cost` |
//! | latency       | 1 at ≤ 1000 ms, 0 at ≥ 5000 ms, linear between; 0 over budget |
//! | reliability   | success rate                                                  |
//! | load          | `1 − in_flight / max_concurrent`                              |
//! | priority      | `1 / priority`                                                |
//! | preference    | 0.2 for the preferred provider                                |
//!
//! Providers without samples in the window score latency as 2000 ms (0.75)
//! and reliability as 0.95.
//!
//! Selection only reads shared state. The capacity check here and the
//! increment done by the dispatcher are separate steps, see
//! [`AdmissionMode`](crate::AdmissionMode).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::debug;

use super::catalog::{ModelTable, PricingTable};
use super::load::ActiveLoad;
use crate::config::{DEFAULT_WINDOW, DispatchConfig, ProviderConfig};
use crate::store::MetricsStore;
use crate::types::{
    LoadBalancingDecision, ModelType, ProviderAggregate, ScoreBreakdown, ScoredCandidate,
    SelectionPreferences,
};
use crate::{DispatchError, Result};

/// Average latency at or below which the latency signal is 1.
pub const LATENCY_FLOOR_MS: f64 = 1000.0;
/// Average latency at or above which the latency signal is 0.
pub const LATENCY_CEILING_MS: f64 = 5000.0;
/// Latency assumed for providers without recent samples.
pub const FALLBACK_LATENCY_MS: f64 = 2000.0;
/// Success rate assumed for providers without recent samples.
pub const FALLBACK_RELIABILITY: f64 = 0.95;
/// Fixed weight of the load signal.
pub const LOAD_WEIGHT: f64 = 0.10;
/// Fixed weight of the priority signal.
pub const PRIORITY_WEIGHT: f64 = 0.10;
/// Added to the preferred provider's score.
pub const PREFERENCE_BONUS: f64 = 0.2;
/// Number of runners-up returned in a decision.
pub const MAX_ALTERNATIVES: usize = 3;

struct SelectorState {
    /// Insertion order is the tie-break order for equal priorities.
    providers: Vec<(String, ProviderConfig)>,
    window: Duration,
}

impl SelectorState {
    fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|(p, _)| p == id).map(|(_, c)| c)
    }

    fn upsert(&mut self, id: &str, config: ProviderConfig) {
        match self.providers.iter_mut().find(|(p, _)| p == id) {
            Some((_, existing)) => *existing = config,
            None => self.providers.push((id.to_string(), config)),
        }
    }
}

/// Ranks providers for each request.
///
/// Holds the static provider table and shares the live [`ActiveLoad`] and
/// [`MetricsStore`] with the dispatcher.
pub struct ProviderSelector {
    state: RwLock<SelectorState>,
    load: Arc<ActiveLoad>,
    store: Arc<MetricsStore>,
    models: ModelTable,
    pricing: PricingTable,
}

impl ProviderSelector {
    /// Create a selector over an explicit provider table.
    pub fn new(
        providers: Vec<(String, ProviderConfig)>,
        store: Arc<MetricsStore>,
        load: Arc<ActiveLoad>,
    ) -> Self {
        Self {
            state: RwLock::new(SelectorState {
                providers,
                window: DEFAULT_WINDOW,
            }),
            load,
            store,
            models: ModelTable::default(),
            pricing: PricingTable::default(),
        }
    }

    /// Create a selector from a [`DispatchConfig`].
    pub fn from_config(
        config: &DispatchConfig,
        store: Arc<MetricsStore>,
        load: Arc<ActiveLoad>,
    ) -> Self {
        let selector = Self::new(config.provider_configs(), store, load);
        selector.write().window = config.window();
        selector
    }

    /// Replace the provider → model type → model table.
    pub fn with_models(mut self, models: ModelTable) -> Self {
        self.models = models;
        self
    }

    /// Replace the pricing table.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Override the aggregate window.
    pub fn with_window(self, window: Duration) -> Self {
        self.write().window = window;
        self
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn window(&self) -> Duration {
        self.read().window
    }

    // ========================================================================
    // Provider table
    // ========================================================================

    /// Configuration for one provider.
    pub fn provider(&self, id: &str) -> Option<ProviderConfig> {
        self.read().get(id).cloned()
    }

    /// Snapshot of the provider table in insertion order.
    pub fn providers(&self) -> Vec<(String, ProviderConfig)> {
        self.read().providers.clone()
    }

    /// Provider ids sorted by priority (stable on insertion order).
    pub fn priority_order(&self) -> Vec<String> {
        let mut providers = self.providers();
        providers.sort_by_key(|(_, c)| c.priority);
        providers.into_iter().map(|(id, _)| id).collect()
    }

    /// Insert or replace one provider's configuration.
    pub fn reconfigure(&self, id: &str, config: ProviderConfig) -> Result<()> {
        config.validate(id)?;
        debug!(provider = id, ?config, "provider reconfigured");
        self.write().upsert(id, config);
        Ok(())
    }

    /// Enable or disable a provider. Providers are never removed.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut state = self.write();
        match state.providers.iter_mut().find(|(p, _)| p == id) {
            Some((_, config)) => {
                config.enabled = enabled;
                Ok(())
            }
            None => Err(DispatchError::Configuration(format!(
                "unknown provider: {id}"
            ))),
        }
    }

    /// Apply a whole [`DispatchConfig`]: every listed provider is replaced,
    /// providers missing from the new priority list are disabled.
    pub fn apply_config(&self, config: &DispatchConfig) -> Result<()> {
        let table = config.provider_configs();
        for (id, provider) in &table {
            provider.validate(id)?;
        }
        let listed: HashSet<&str> = table.iter().map(|(id, _)| id.as_str()).collect();
        let mut state = self.write();
        for (id, existing) in state.providers.iter_mut() {
            if !listed.contains(id.as_str()) {
                existing.enabled = false;
            }
        }
        for (id, provider) in table.iter().cloned() {
            state.upsert(&id, provider);
        }
        state.window = config.window();
        Ok(())
    }

    // ========================================================================
    // Load accounting
    // ========================================================================

    pub fn increment_load(&self, provider: &str) {
        self.load.increment(provider);
    }

    pub fn decrement_load(&self, provider: &str) {
        self.load.decrement(provider);
    }

    pub fn active_load(&self, provider: &str) -> u32 {
        self.load.get(provider)
    }

    pub(crate) fn load_tracker(&self) -> &Arc<ActiveLoad> {
        &self.load
    }

    /// Concrete model for a provider and model type.
    pub fn model_for(&self, provider: &str, model_type: ModelType) -> String {
        self.models.resolve(provider, model_type)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Pick the best provider among `candidates`.
    ///
    /// Returns [`DispatchError::NoEligibleProvider`] when every candidate is
    /// unknown, disabled, or saturated.
    pub fn select_provider<S: AsRef<str>>(
        &self,
        candidates: &[S],
        model_type: ModelType,
        preferences: &SelectionPreferences,
    ) -> Result<LoadBalancingDecision> {
        let mut ranked = self.rank(candidates, model_type, preferences)?.into_iter();
        let Some(best) = ranked.next() else {
            return Err(no_eligible(candidates));
        };
        let alternatives: Vec<_> = ranked.take(MAX_ALTERNATIVES).collect();
        debug!(
            provider = %best.provider,
            model = %best.model,
            score = best.score,
            alternatives = alternatives.len(),
            "provider selected"
        );
        Ok(LoadBalancingDecision {
            provider: best.provider,
            model: best.model,
            score: best.score,
            reason: best.reason,
            alternatives,
        })
    }

    /// Score every eligible candidate, best first.
    pub fn rank<S: AsRef<str>>(
        &self,
        candidates: &[S],
        model_type: ModelType,
        preferences: &SelectionPreferences,
    ) -> Result<Vec<ScoredCandidate>> {
        let state = self.read();
        let aggregates = self.store.aggregate(state.window);
        let mut seen = HashSet::new();
        let mut scored = Vec::new();

        for candidate in candidates {
            let id: &str = candidate.as_ref();
            if !seen.insert(id) {
                continue;
            }
            let Some(config) = state.get(id) else {
                debug!(provider = id, "skipping unconfigured provider");
                continue;
            };
            if !config.enabled {
                continue;
            }
            let active = self.load.get(id);
            if active >= config.max_concurrent {
                debug!(provider = id, active, max = config.max_concurrent, "provider saturated");
                continue;
            }
            let breakdown = score_breakdown(
                id,
                config,
                aggregates.get(id),
                active,
                self.pricing.base_unit_cost(id),
                preferences,
            );
            scored.push(ScoredCandidate {
                provider: id.to_string(),
                model: self.models.resolve(id, model_type),
                score: final_score(config, &breakdown),
                reason: breakdown.reason(),
                breakdown,
            });
        }

        if scored.is_empty() {
            return Err(no_eligible(candidates));
        }
        // Stable: equal scores keep candidate order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }

    /// Per-provider aggregates over the selector's window.
    pub fn aggregates(&self) -> HashMap<String, ProviderAggregate> {
        self.store.aggregate(self.window())
    }

    fn read(&self) -> RwLockReadGuard<'_, SelectorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SelectorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn no_eligible<S: AsRef<str>>(candidates: &[S]) -> DispatchError {
    DispatchError::NoEligibleProvider {
        candidates: candidates
            .iter()
            .map(|c| {
                let id: &str = c.as_ref();
                id.to_string()
            })
            .collect(),
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Compute every scoring signal for one provider.
pub(crate) fn score_breakdown(
    provider: &str,
    config: &ProviderConfig,
    aggregate: Option<&ProviderAggregate>,
    active: u32,
    base_unit_cost: f64,
    preferences: &SelectionPreferences,
) -> ScoreBreakdown {
    let history = aggregate.filter(|a| !a.is_empty());

    let recent_cost = history.map_or(0.0, |a| a.total_cost);
    let cost = match preferences.max_cost {
        Some(max) if recent_cost > max => 0.0,
        _ if base_unit_cost <= f64::EPSILON => 1.0,
        _ => (1.0 - recent_cost / base_unit_cost).max(0.0),
    };

    let latency = match (history, preferences.max_latency_ms) {
        (Some(a), Some(max)) if a.avg_latency_ms > max as f64 => 0.0,
        (Some(a), _) => latency_score(a.avg_latency_ms),
        (None, _) => latency_score(FALLBACK_LATENCY_MS),
    };

    let reliability = history.map_or(FALLBACK_RELIABILITY, |a| a.success_rate);

    let max_concurrent = config.max_concurrent.max(1);
    let load = 1.0 - f64::from(active.min(max_concurrent)) / f64::from(max_concurrent);

    let priority = 1.0 / f64::from(config.priority.max(1));

    let preference_bonus = if preferences.preferred_provider.as_deref() == Some(provider) {
        PREFERENCE_BONUS
    } else {
        0.0
    };

    ScoreBreakdown {
        cost,
        latency,
        reliability,
        load,
        priority,
        preference_bonus,
        has_history: history.is_some(),
    }
}

/// Weighted sum of the signals, clamped to [0, 1].
pub(crate) fn final_score(config: &ProviderConfig, b: &ScoreBreakdown) -> f64 {
    let weighted = b.cost * config.cost_weight
        + b.latency * config.latency_weight
        + b.reliability * config.reliability_weight
        + b.load * LOAD_WEIGHT
        + b.priority * PRIORITY_WEIGHT;
    (weighted + b.preference_bonus).clamp(0.0, 1.0)
}

/// Piecewise-linear latency signal.
pub(crate) fn latency_score(avg_latency_ms: f64) -> f64 {
    if avg_latency_ms <= LATENCY_FLOOR_MS {
        1.0
    } else if avg_latency_ms >= LATENCY_CEILING_MS {
        0.0
    } else {
        1.0 - (avg_latency_ms - LATENCY_FLOOR_MS) / (LATENCY_CEILING_MS - LATENCY_FLOOR_MS)
    }
}
