//! Monitoring snapshot.

use std::time::Duration;

use serde::Serialize;

use crate::config::ProviderConfig;
use crate::types::ProviderAggregate;

/// State of one provider at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub config: ProviderConfig,
    pub active_load: u32,
    /// Empty when the provider has no samples in the window.
    pub aggregate: ProviderAggregate,
}

impl ProviderStatus {
    pub fn is_saturated(&self) -> bool {
        self.active_load >= self.config.max_concurrent
    }
}

/// Point-in-time view of every configured provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchStats {
    #[serde(serialize_with = "serialize_secs")]
    pub window: Duration,
    /// Samples currently held in the ledger, regardless of window.
    pub samples: usize,
    /// Provider table order.
    pub providers: Vec<ProviderStatus>,
}

impl DispatchStats {
    pub fn provider(&self, id: &str) -> Option<&ProviderStatus> {
        self.providers.iter().find(|p| p.id == id)
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}
