//! Attempt outcomes and the aggregates derived from them.

use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Outcome of one dispatch attempt. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    /// Estimated token count (0 when unknown).
    pub tokens: u64,
    /// Estimated cost in USD (0 for failures).
    pub cost: f64,
    pub timestamp: SystemTime,
    pub success: bool,
    pub error: Option<String>,
}

impl PerformanceSample {
    /// A successful attempt, timestamped now.
    pub fn success(
        provider: impl Into<String>,
        model: impl Into<String>,
        latency: Duration,
        tokens: u64,
        cost: f64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            latency_ms: duration_ms(latency),
            tokens,
            cost: cost.max(0.0),
            timestamp: SystemTime::now(),
            success: true,
            error: None,
        }
    }

    /// A failed attempt, timestamped now. Failures carry no cost.
    pub fn failure(
        provider: impl Into<String>,
        model: impl Into<String>,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            latency_ms: duration_ms(latency),
            tokens: 0,
            cost: 0.0,
            timestamp: SystemTime::now(),
            success: false,
            error: Some(error.into()),
        }
    }

    /// Override the timestamp (backfill and tests).
    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Trailing-window statistics for one provider, or one (provider, model) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderAggregate {
    pub total_requests: u64,
    pub successful_requests: u64,
    /// `successful_requests / total_requests`; 0 when empty.
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_tokens: f64,
    pub total_cost: f64,
    pub total_tokens: u64,
}

impl ProviderAggregate {
    pub fn is_empty(&self) -> bool {
        self.total_requests == 0
    }

    /// `total_cost / total_tokens`, 0 when no tokens were recorded.
    pub fn cost_per_token(&self) -> f64 {
        if self.total_tokens == 0 {
            0.0
        } else {
            self.total_cost / self.total_tokens as f64
        }
    }

    #[cfg(test)]
    pub(crate) fn from_samples<'a>(samples: impl IntoIterator<Item = &'a PerformanceSample>) -> Self {
        let mut agg = AggregateBuilder::default();
        for sample in samples {
            agg.push(sample);
        }
        agg.finish()
    }
}

/// Running sums, finalised into a [`ProviderAggregate`].
#[derive(Debug, Default)]
pub(crate) struct AggregateBuilder {
    total: u64,
    successful: u64,
    latency_sum: u64,
    tokens_sum: u64,
    cost_sum: f64,
}

impl AggregateBuilder {
    pub(crate) fn push(&mut self, sample: &PerformanceSample) {
        self.total += 1;
        if sample.success {
            self.successful += 1;
        }
        self.latency_sum = self.latency_sum.saturating_add(sample.latency_ms);
        self.tokens_sum = self.tokens_sum.saturating_add(sample.tokens);
        self.cost_sum += sample.cost;
    }

    pub(crate) fn finish(self) -> ProviderAggregate {
        if self.total == 0 {
            return ProviderAggregate::default();
        }
        let n = self.total as f64;
        ProviderAggregate {
            total_requests: self.total,
            successful_requests: self.successful,
            success_rate: self.successful as f64 / n,
            avg_latency_ms: self.latency_sum as f64 / n,
            avg_tokens: self.tokens_sum as f64 / n,
            total_cost: self.cost_sum,
            total_tokens: self.tokens_sum,
        }
    }
}
