//! The dispatch cascade.
//!
//! One logical request becomes a sequence of attempts. Each attempt runs
//! under its own timeout and cancellation token, holds a [`LoadGuard`] for
//! its whole duration, and leaves exactly one [`PerformanceSample`] behind.
//! Retryable failures (timeouts, rate limits, transport errors, cost
//! overruns) advance to the next candidate; anything else propagates.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::builder::DispatcherBuilder;
use super::collaborators::{
    AttemptRecord, AuditSink, DispatchAuditEvent, LatencyAlerter, LatencyObservation,
};
use super::context::{AttemptContext, DispatchOptions};
use super::plan::{AttemptPlan, AttemptTarget, SelectionPath};
use super::stats::{DispatchStats, ProviderStatus};
use crate::config::{AdmissionMode, DispatchConfig};
use crate::providers::{LoadGuard, ProviderSelector};
use crate::store::MetricsStore;
use crate::telemetry;
use crate::types::{PerformanceSample, RequestPolicy, SelectionPreferences};
use crate::{CallError, DispatchError, Result};

/// Settings that [`Dispatcher::reconfigure`] can swap at runtime.
#[derive(Debug, Clone)]
pub(crate) struct DispatchSettings {
    pub(crate) timeout: Duration,
    pub(crate) max_cost: Option<f64>,
    pub(crate) max_latency_ms: Option<u64>,
    pub(crate) admission: AdmissionMode,
}

impl DispatchSettings {
    pub(crate) fn from_config(config: &DispatchConfig) -> Self {
        Self {
            timeout: config.provider_timeout_duration(),
            max_cost: config.max_cost_per_request,
            max_latency_ms: config.max_latency_ms,
            admission: config.admission,
        }
    }
}

/// How one attempt ended.
enum Raced<T> {
    Done(std::result::Result<T, CallError>),
    TimedOut,
    Cancelled,
}

/// Runs provider calls across a ranked cascade of candidates.
///
/// Create one per process and share it (`Arc<Dispatcher>`); all state is
/// internally synchronised.
pub struct Dispatcher {
    pub(crate) selector: ProviderSelector,
    pub(crate) store: Arc<MetricsStore>,
    pub(crate) settings: RwLock<DispatchSettings>,
    pub(crate) alerter: Option<Arc<dyn LatencyAlerter>>,
    pub(crate) audit: Option<Arc<dyn AuditSink>>,
    pub(crate) collaborator_timeout: Duration,
}

impl Dispatcher {
    /// Build a dispatcher with default tables and no collaborators.
    pub fn new(config: DispatchConfig) -> Result<Self> {
        DispatcherBuilder::new(config).build()
    }

    pub fn builder(config: DispatchConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.store
    }

    /// Default per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.settings().timeout
    }

    pub fn admission(&self) -> AdmissionMode {
        self.settings().admission
    }

    /// Swap weights, limits, timeout and priority order at runtime.
    ///
    /// In-flight dispatches keep the plan they started with. Providers that
    /// disappear from the priority list are disabled, not removed.
    pub fn reconfigure(&self, config: &DispatchConfig) -> Result<()> {
        config.validate()?;
        self.selector.apply_config(config)?;
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = DispatchSettings::from_config(config);
        debug!(
            providers = config.provider_priority.len(),
            timeout_ms = config.provider_timeout_ms,
            "dispatcher reconfigured"
        );
        Ok(())
    }

    /// Monitoring snapshot over `window`.
    pub fn stats(&self, window: Duration) -> DispatchStats {
        let aggregates = self.store.aggregate(window);
        let providers = self
            .selector
            .providers()
            .into_iter()
            .map(|(id, config)| ProviderStatus {
                active_load: self.selector.active_load(&id),
                aggregate: aggregates.get(&id).cloned().unwrap_or_default(),
                config,
                id,
            })
            .collect();
        DispatchStats {
            window,
            samples: self.store.len(),
            providers,
        }
    }

    // ========================================================================
    // Planning
    // ========================================================================

    /// Build the attempt list for a policy without running anything.
    pub fn plan(&self, policy: &RequestPolicy) -> Result<AttemptPlan> {
        let model_type = policy.resolved_model_type();
        let pool = match &policy.providers {
            Some(providers) if !providers.is_empty() => providers.clone(),
            _ => self.selector.priority_order(),
        };
        if pool.is_empty() {
            return Err(DispatchError::NoProvider);
        }

        let preferences = self.preferences(policy);
        match self.selector.select_provider(pool.as_slice(), model_type, &preferences) {
            Ok(decision) => {
                let mut targets: Vec<AttemptTarget> = decision
                    .ranked()
                    .map(|(provider, model)| AttemptTarget::new(provider, model))
                    .collect();
                for provider in &pool {
                    if targets.iter().any(|t| &t.provider == provider) {
                        continue;
                    }
                    if self.selector.provider(provider).is_some_and(|c| c.enabled) {
                        targets.push(AttemptTarget::new(
                            provider.as_str(),
                            self.selector.model_for(provider, model_type),
                        ));
                    }
                }
                Ok(AttemptPlan {
                    path: SelectionPath::Scored,
                    decision: Some(decision),
                    targets,
                })
            }
            Err(DispatchError::NoEligibleProvider { candidates }) => {
                let mut eligible: Vec<(u32, &String)> = Vec::new();
                for provider in &pool {
                    if eligible.iter().any(|(_, p)| *p == provider) {
                        continue;
                    }
                    if let Some(config) = self.selector.provider(provider)
                        && config.enabled
                    {
                        eligible.push((config.priority, provider));
                    }
                }
                if eligible.is_empty() {
                    return Err(DispatchError::NoEligibleProvider { candidates });
                }
                eligible.sort_by_key(|(priority, _)| *priority);
                let targets = eligible
                    .into_iter()
                    .map(|(_, provider)| {
                        AttemptTarget::new(
                            provider.as_str(),
                            self.selector.model_for(provider, model_type),
                        )
                    })
                    .collect();
                Ok(AttemptPlan {
                    path: SelectionPath::Static,
                    decision: None,
                    targets,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Policy preferences with the global budgets filled in.
    fn preferences(&self, policy: &RequestPolicy) -> SelectionPreferences {
        let settings = self.settings();
        let mut preferences = policy.preferences();
        preferences.max_cost = preferences.max_cost.or(settings.max_cost);
        preferences.max_latency_ms = preferences.max_latency_ms.or(settings.max_latency_ms);
        preferences
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run `call` against the best provider for `policy`, falling through
    /// the ranked alternatives on retryable failures.
    ///
    /// Returns the first acceptable result, the first fatal error, or the
    /// last observed error once every candidate has been tried.
    #[instrument(
        skip_all,
        fields(
            operation = "dispatch",
            model_type = %policy.resolved_model_type(),
            request_id = policy.request_id.as_deref().unwrap_or(""),
        )
    )]
    pub async fn dispatch<T, F, Fut>(
        &self,
        policy: &RequestPolicy,
        call: F,
        options: DispatchOptions<T>,
    ) -> Result<T>
    where
        F: Fn(AttemptContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, CallError>>,
    {
        let plan = match self.plan(policy) {
            Ok(plan) => plan,
            Err(e) => return self.finish(AuditTrail::new(policy, None), Err(e)).await,
        };
        if plan.path == SelectionPath::Static {
            metrics::counter!(telemetry::SELECTION_FALLBACK_TOTAL).increment(1);
            warn!(
                providers = ?plan.providers().collect::<Vec<_>>(),
                "no provider has spare capacity, falling back to priority order"
            );
        }

        let settings = self.settings();
        let timeout = options.timeout.unwrap_or(settings.timeout);
        let max_cost = policy.max_cost.or(settings.max_cost);
        let mut audit = AuditTrail::new(policy, Some(plan.path));
        let mut last_err = None;

        for (attempt, target) in plan.targets.iter().enumerate() {
            if options.cancellation.as_ref().is_some_and(|t| t.is_cancelled()) {
                return self.finish(audit, Err(DispatchError::Cancelled)).await;
            }
            let AttemptTarget { provider, model } = target;

            let Some(guard) = self.admit(provider, settings.admission) else {
                debug!(provider = %provider, attempt, "provider saturated, skipping");
                if last_err.is_none() {
                    last_err = Some(DispatchError::NoEligibleProvider {
                        candidates: vec![provider.clone()],
                    });
                }
                continue;
            };

            let token = options
                .cancellation
                .as_ref()
                .map_or_else(CancellationToken::new, CancellationToken::child_token);
            let ctx = AttemptContext {
                provider: provider.clone(),
                model: model.clone(),
                attempt,
                request_id: policy.request_id.clone(),
                cancellation: token.clone(),
            };

            record_phase(provider, model, "start");
            let started = Instant::now();
            let outcome = {
                let _guard: LoadGuard = guard;
                race(call(ctx), timeout, &token, options.cancellation.as_ref()).await
            };
            let elapsed = started.elapsed();
            metrics::histogram!(telemetry::LATENCY_MS,
                "provider" => provider.clone(),
                "model" => model.clone(),
            )
            .record(elapsed.as_secs_f64() * 1000.0);

            let value = match outcome {
                Raced::Done(Ok(value)) => value,
                Raced::Done(Err(call_err)) => {
                    let phase = call_err.code();
                    let err = DispatchError::from_call(provider, call_err, elapsed);
                    self.record_failure(target, elapsed, &phase, &err, policy, &mut audit)
                        .await;
                    if err.is_retryable() {
                        warn!(provider = %provider, model = %model, attempt, error = %err, "attempt failed, trying next provider");
                        last_err = Some(err);
                        continue;
                    }
                    return self.finish(audit, Err(err)).await;
                }
                Raced::TimedOut => {
                    let err = DispatchError::Timeout {
                        provider: provider.clone(),
                        elapsed,
                    };
                    self.record_failure(target, elapsed, "timeout", &err, policy, &mut audit)
                        .await;
                    warn!(provider = %provider, model = %model, attempt, timeout_ms = timeout.as_millis() as u64, "attempt timed out, trying next provider");
                    last_err = Some(err);
                    continue;
                }
                Raced::Cancelled => {
                    let err = DispatchError::Cancelled;
                    self.record_failure(target, elapsed, "cancelled", &err, policy, &mut audit)
                        .await;
                    return self.finish(audit, Err(err)).await;
                }
            };

            // Success: cost comes from the estimator, else tokens × unit price.
            let tokens = options.estimate_tokens(&value).unwrap_or(0);
            let cost = options
                .estimate_cost(&value)
                .unwrap_or_else(|| self.selector.pricing().estimate(provider, model, tokens));
            self.store.record(PerformanceSample::success(
                provider.as_str(),
                model.as_str(),
                elapsed,
                tokens,
                cost,
            ));
            record_phase(provider, model, "ok");
            self.notify_alerter(target, elapsed, true, policy).await;

            if let Some(max_cost) = max_cost
                && cost > max_cost
            {
                metrics::counter!(telemetry::COST_EXCEEDED_TOTAL,
                    "provider" => provider.clone(),
                    "model" => model.clone(),
                )
                .increment(1);
                let err = DispatchError::CostExceeded {
                    provider: provider.clone(),
                    cost,
                    max_cost,
                };
                warn!(provider = %provider, model = %model, attempt, cost, max_cost, "result over cost ceiling, trying next provider");
                audit.push(target, elapsed, cost, err.kind().as_str());
                last_err = Some(err);
                continue;
            }

            audit.push(target, elapsed, cost, "ok");
            audit.event.provider = Some(provider.clone());
            debug!(provider = %provider, model = %model, attempt, latency_ms = elapsed.as_millis() as u64, cost, "dispatch succeeded");
            return self.finish(audit, Ok(value)).await;
        }

        metrics::counter!(telemetry::DISPATCH_EXHAUSTED_TOTAL).increment(1);
        let err = last_err.unwrap_or(DispatchError::NoProvider);
        warn!(attempts = plan.len(), error = %err, "all providers failed");
        self.finish(audit, Err(err)).await
    }

    fn admit(&self, provider: &str, mode: AdmissionMode) -> Option<LoadGuard> {
        let load = self.selector.load_tracker();
        match mode {
            AdmissionMode::BestEffort => Some(load.acquire(provider)),
            AdmissionMode::Strict => {
                let limit = self.selector.provider(provider)?.max_concurrent;
                load.try_acquire(provider, limit)
            }
        }
    }

    async fn record_failure(
        &self,
        target: &AttemptTarget,
        elapsed: Duration,
        phase: &str,
        err: &DispatchError,
        policy: &RequestPolicy,
        audit: &mut AuditTrail,
    ) {
        self.store.record(PerformanceSample::failure(
            target.provider.as_str(),
            target.model.as_str(),
            elapsed,
            err.to_string(),
        ));
        record_phase(&target.provider, &target.model, phase);
        self.notify_alerter(target, elapsed, false, policy).await;
        audit.push(target, elapsed, 0.0, err.kind().as_str());
    }

    async fn notify_alerter(
        &self,
        target: &AttemptTarget,
        elapsed: Duration,
        success: bool,
        policy: &RequestPolicy,
    ) {
        let Some(alerter) = &self.alerter else {
            return;
        };
        let observation = LatencyObservation {
            provider: target.provider.clone(),
            model: target.model.clone(),
            latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            success,
            request_id: policy.request_id.clone(),
        };
        let observed =
            tokio::time::timeout(self.collaborator_timeout, alerter.observe(&observation));
        match observed.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(provider = %target.provider, error = %e, "latency alerter failed"),
            Err(_) => warn!(
                provider = %target.provider,
                timeout_ms = self.collaborator_timeout.as_millis() as u64,
                "latency alerter timed out"
            ),
        }
    }

    async fn finish<T>(&self, audit: AuditTrail, result: Result<T>) -> Result<T> {
        if let Some(sink) = &self.audit {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.kind().as_str(),
            };
            let event = audit.into_event(outcome);
            match tokio::time::timeout(self.collaborator_timeout, sink.record(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "audit sink failed"),
                Err(_) => warn!(
                    timeout_ms = self.collaborator_timeout.as_millis() as u64,
                    "audit sink timed out"
                ),
            }
        }
        result
    }

    fn settings(&self) -> DispatchSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Race the call against its timeout and the caller's cancellation. The
/// attempt token is cancelled whenever the call is abandoned.
async fn race<T, Fut>(
    call: Fut,
    timeout: Duration,
    token: &CancellationToken,
    parent: Option<&CancellationToken>,
) -> Raced<T>
where
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let parent_cancelled = async {
        match parent {
            Some(parent) => parent.cancelled().await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        () = parent_cancelled => {
            token.cancel();
            Raced::Cancelled
        }
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(result) => Raced::Done(result),
            Err(_) => {
                token.cancel();
                Raced::TimedOut
            }
        },
    }
}

fn record_phase(provider: &str, model: &str, phase: &str) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "model" => model.to_owned(),
        "phase" => phase.to_owned(),
    )
    .increment(1);
}

/// Accumulates the audit record for one request.
struct AuditTrail {
    event: DispatchAuditEvent,
}

impl AuditTrail {
    fn new(policy: &RequestPolicy, path: Option<SelectionPath>) -> Self {
        Self {
            event: DispatchAuditEvent {
                request_id: policy.request_id.clone(),
                model_type: policy.resolved_model_type(),
                path,
                attempts: Vec::new(),
                provider: None,
                outcome: String::new(),
                total_cost: 0.0,
            },
        }
    }

    fn push(&mut self, target: &AttemptTarget, elapsed: Duration, cost: f64, outcome: &str) {
        self.event.total_cost += cost;
        self.event.attempts.push(AttemptRecord {
            provider: target.provider.clone(),
            model: target.model.clone(),
            latency_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            cost,
            outcome: outcome.to_owned(),
        });
    }

    fn into_event(mut self, outcome: &str) -> DispatchAuditEvent {
        self.event.outcome = outcome.to_owned();
        self.event
    }
}
