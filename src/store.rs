//! Capacity-bounded ledger of attempt outcomes.
//!
//! [`MetricsStore`] keeps the most recent [`PerformanceSample`]s in a FIFO
//! ring and derives trailing-window aggregates from them on demand. The ring
//! is a sliding approximation of recent behaviour: under bursty traffic the
//! oldest samples are evicted by count before they age out of the window.
//!
//! Nothing is persisted. After a restart scoring runs on neutral fallbacks
//! until samples accumulate again.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::types::{AggregateBuilder, PerformanceSample, ProviderAggregate};

/// Default ledger capacity.
pub const MAX_SAMPLES: usize = 1000;

/// (provider, model) key used by [`MetricsStore::aggregate_by_model`].
pub type ModelKey = (String, String);

/// Append-only, FIFO-evicting sample ledger.
///
/// Shared across every in-flight dispatch; all methods take `&self`.
#[derive(Debug)]
pub struct MetricsStore {
    samples: Mutex<VecDeque<PerformanceSample>>,
    capacity: usize,
}

impl MetricsStore {
    /// Create an empty store holding at most [`MAX_SAMPLES`] entries.
    pub fn new() -> Self {
        Self::with_capacity(MAX_SAMPLES)
    }

    /// Create an empty store with a custom capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest entries past capacity.
    ///
    /// Never fails. A poisoned lock is recovered rather than propagated so
    /// that recording can never break a dispatch.
    pub fn record(&self, sample: PerformanceSample) {
        let mut samples = self.lock();
        while samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Per-provider aggregates over the trailing `window`.
    ///
    /// Providers with no samples in the window are absent from the map.
    pub fn aggregate(&self, window: Duration) -> HashMap<String, ProviderAggregate> {
        self.aggregate_at(SystemTime::now(), window)
    }

    /// [`aggregate`](Self::aggregate) evaluated at an explicit instant.
    pub fn aggregate_at(
        &self,
        now: SystemTime,
        window: Duration,
    ) -> HashMap<String, ProviderAggregate> {
        let cutoff = cutoff(now, window);
        let samples = self.lock();
        let mut groups: HashMap<String, AggregateBuilder> = HashMap::new();
        for sample in samples.iter().filter(|s| s.timestamp >= cutoff) {
            groups.entry(sample.provider.clone()).or_default().push(sample);
        }
        groups.into_iter().map(|(k, b)| (k, b.finish())).collect()
    }

    /// Aggregates grouped by (provider, model) over the trailing `window`.
    ///
    /// Use [`ProviderAggregate::cost_per_token`] for the per-model unit cost.
    pub fn aggregate_by_model(&self, window: Duration) -> HashMap<ModelKey, ProviderAggregate> {
        self.aggregate_by_model_at(SystemTime::now(), window)
    }

    /// [`aggregate_by_model`](Self::aggregate_by_model) evaluated at an explicit instant.
    pub fn aggregate_by_model_at(
        &self,
        now: SystemTime,
        window: Duration,
    ) -> HashMap<ModelKey, ProviderAggregate> {
        let cutoff = cutoff(now, window);
        let samples = self.lock();
        let mut groups: HashMap<ModelKey, AggregateBuilder> = HashMap::new();
        for sample in samples.iter().filter(|s| s.timestamp >= cutoff) {
            groups
                .entry((sample.provider.clone(), sample.model.clone()))
                .or_default()
                .push(sample);
        }
        groups.into_iter().map(|(k, b)| (k, b.finish())).collect()
    }

    /// Snapshot of all retained samples, oldest first.
    pub fn samples(&self) -> Vec<PerformanceSample> {
        self.lock().iter().cloned().collect()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every sample.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PerformanceSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cutoff(now: SystemTime, window: Duration) -> SystemTime {
    now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH)
}
