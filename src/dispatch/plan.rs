//! The ordered attempt list for one request.

use serde::Serialize;

use crate::types::LoadBalancingDecision;

/// How the attempt list was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPath {
    /// Scored selection succeeded: winner, alternatives, then the rest of
    /// the pool.
    Scored,
    /// Every candidate was saturated: the pool in static priority order.
    Static,
}

impl SelectionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionPath::Scored => "scored",
            SelectionPath::Static => "static",
        }
    }
}

/// One (provider, model) pair to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptTarget {
    pub provider: String,
    pub model: String,
}

impl AttemptTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Attempt list for one request. Each provider appears at most once.
#[derive(Debug, Clone)]
pub struct AttemptPlan {
    pub path: SelectionPath,
    /// Present on the scored path.
    pub decision: Option<LoadBalancingDecision>,
    pub targets: Vec<AttemptTarget>,
}

impl AttemptPlan {
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.provider.as_str())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
