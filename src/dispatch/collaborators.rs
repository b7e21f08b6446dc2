//! Best-effort outbound collaborators.
//!
//! The dispatcher reports to two optional sinks:
//!
//! - a [`LatencyAlerter`], told about every attempt;
//! - an [`AuditSink`], handed one [`DispatchAuditEvent`] per logical request.
//!
//! Both are write-only. Their errors are logged at `warn` and never reach
//! the dispatch caller. Each call is bounded by
//! [`DEFAULT_COLLABORATOR_TIMEOUT`] unless the builder sets another limit;
//! a call that overruns is abandoned.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::plan::SelectionPath;
use crate::types::ModelType;

/// How long the dispatcher waits on a single collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type returned by collaborators.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Latency of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyObservation {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub success: bool,
    pub request_id: Option<String>,
}

/// Receives a latency observation for every attempt.
#[async_trait]
pub trait LatencyAlerter: Send + Sync {
    async fn observe(&self, observation: &LatencyObservation) -> Result<(), SinkError>;
}

/// Logs a warning for attempts slower than a threshold.
#[derive(Debug, Clone)]
pub struct ThresholdAlerter {
    threshold: Duration,
}

impl ThresholdAlerter {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl LatencyAlerter for ThresholdAlerter {
    async fn observe(&self, observation: &LatencyObservation) -> Result<(), SinkError> {
        let threshold_ms = u64::try_from(self.threshold.as_millis()).unwrap_or(u64::MAX);
        if observation.latency_ms > threshold_ms {
            warn!(
                provider = %observation.provider,
                model = %observation.model,
                latency_ms = observation.latency_ms,
                threshold_ms,
                "provider latency above threshold"
            );
        }
        Ok(())
    }
}

/// One attempt as it appears in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub cost: f64,
    /// `"ok"` or the failure kind (`"timeout"`, `"cost_exceeded"`, ...).
    pub outcome: String,
}

/// Compliance record for one logical request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchAuditEvent {
    pub request_id: Option<String>,
    pub model_type: ModelType,
    /// `None` when no attempt list could be built.
    pub path: Option<SelectionPath>,
    pub attempts: Vec<AttemptRecord>,
    /// Provider that produced the returned result, if any.
    pub provider: Option<String>,
    /// `"ok"` or the failure kind of the propagated error.
    pub outcome: String,
    /// Sum of attempt costs, including successful calls rejected for cost.
    pub total_cost: f64,
}

/// Write-only compliance sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &DispatchAuditEvent) -> Result<(), SinkError>;
}

/// Writes audit events as JSON at `info` level under the
/// `llm_dispatch::audit` target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &DispatchAuditEvent) -> Result<(), SinkError> {
        let json = serde_json::to_string(event)?;
        info!(target: "llm_dispatch::audit", event = %json, "dispatch audit");
        Ok(())
    }
}
