//! Builder for [`Dispatcher`].

use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::collaborators::{AuditSink, DEFAULT_COLLABORATOR_TIMEOUT, LatencyAlerter};
use super::executor::{DispatchSettings, Dispatcher};
use crate::config::DispatchConfig;
use crate::providers::{ActiveLoad, ModelTable, PricingTable, ProviderSelector};
use crate::store::MetricsStore;
use crate::Result;

/// Assembles a [`Dispatcher`] from a configuration plus optional tables and
/// collaborators.
///
/// ```rust
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use llm_dispatch::{DispatchConfig, Dispatcher, ThresholdAlerter};
/// let dispatcher = Dispatcher::builder(DispatchConfig::default())
///     .alerter(Arc::new(ThresholdAlerter::new(Duration::from_secs(5))))
///     .build()?;
/// # Ok::<(), llm_dispatch::DispatchError>(())
/// ```
pub struct DispatcherBuilder {
    config: DispatchConfig,
    models: Option<ModelTable>,
    pricing: Option<PricingTable>,
    store: Option<Arc<MetricsStore>>,
    alerter: Option<Arc<dyn LatencyAlerter>>,
    audit: Option<Arc<dyn AuditSink>>,
    collaborator_timeout: Duration,
}

impl DispatcherBuilder {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            models: None,
            pricing: None,
            store: None,
            alerter: None,
            audit: None,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    /// Replace the default provider → model type → model table.
    pub fn models(mut self, models: ModelTable) -> Self {
        self.models = Some(models);
        self
    }

    /// Replace the default pricing table.
    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Share an existing sample ledger (e.g. pre-seeded history).
    pub fn store(mut self, store: Arc<MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn alerter(mut self, alerter: Arc<dyn LatencyAlerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Upper bound on each alerter or audit sink call.
    pub fn collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// Validate the configuration and build.
    pub fn build(self) -> Result<Dispatcher> {
        self.config.validate()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MetricsStore::with_capacity(self.config.max_samples)));
        let load = Arc::new(ActiveLoad::new());

        let mut selector = ProviderSelector::from_config(&self.config, Arc::clone(&store), load);
        if let Some(models) = self.models {
            selector = selector.with_models(models);
        }
        if let Some(pricing) = self.pricing {
            selector = selector.with_pricing(pricing);
        }

        Ok(Dispatcher {
            selector,
            store,
            settings: RwLock::new(DispatchSettings::from_config(&self.config)),
            alerter: self.alerter,
            audit: self.audit,
            collaborator_timeout: self.collaborator_timeout,
        })
    }
}
