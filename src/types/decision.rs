//! Selection output.

use serde::Serialize;

/// Individual scoring signals for one candidate, each in [0, 1]
/// (the preference bonus is 0 or 0.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub cost: f64,
    pub latency: f64,
    pub reliability: f64,
    pub load: f64,
    pub priority: f64,
    pub preference_bonus: f64,
    /// Whether the aggregate had samples for this provider; if not the
    /// latency and reliability signals are neutral fallbacks.
    pub has_history: bool,
}

impl ScoreBreakdown {
    /// Human-readable explanation, e.g. `"cost 0.90, latency 0.75 (no history), ..."`.
    pub fn reason(&self) -> String {
        let mut reason = format!(
            "cost {:.2}, latency {:.2}, reliability {:.2}, load {:.2}, priority {:.2}",
            self.cost, self.latency, self.reliability, self.load, self.priority
        );
        if !self.has_history {
            reason.push_str(" (no history)");
        }
        if self.preference_bonus > 0.0 {
            reason.push_str(", preferred");
        }
        reason
    }
}

/// A scored (provider, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub provider: String,
    pub model: String,
    /// Final score, clamped to [0, 1].
    pub score: f64,
    pub reason: String,
    pub breakdown: ScoreBreakdown,
}

/// Ranked result of a selection: the winner plus up to three alternatives in
/// descending score order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadBalancingDecision {
    pub provider: String,
    pub model: String,
    pub score: f64,
    pub reason: String,
    pub alternatives: Vec<ScoredCandidate>,
}

impl LoadBalancingDecision {
    /// Every ranked (provider, model) pair, winner first.
    pub fn ranked(&self) -> impl Iterator<Item = (&str, &str)> {
        std::iter::once((self.provider.as_str(), self.model.as_str())).chain(
            self.alternatives
                .iter()
                .map(|c| (c.provider.as_str(), c.model.as_str())),
        )
    }
}
