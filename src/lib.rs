//! llm-dispatch - Multi-provider inference dispatcher
//!
//! Routes each LLM call to the best available provider and falls through to
//! ranked alternatives when a provider times out, throttles, drops the
//! connection, or returns a result that breaches the cost ceiling.
//!
//! The crate never talks to a vendor itself. Callers hand [`Dispatcher::dispatch`]
//! a closure that performs one call against the provider and model named in
//! its [`AttemptContext`]; the dispatcher decides where, how long, and what
//! to do when it fails.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_dispatch::{
//!     AttemptContext, CallError, DispatchConfig, DispatchOptions, Dispatcher, ModelType,
//!     RequestPolicy,
//! };
//!
//! # async fn complete(_: &str, _: &str) -> Result<String, CallError> { Ok(String::new()) }
//! #[tokio::main]
//! async fn main() -> llm_dispatch::Result<()> {
//!     let dispatcher = Dispatcher::new(DispatchConfig::from_env()?)?;
//!
//!     let policy = RequestPolicy::new()
//!         .model_type(ModelType::Reasoning)
//!         .preferred_provider("anthropic")
//!         .max_cost(0.05);
//!
//!     let answer = dispatcher
//!         .dispatch(
//!             &policy,
//!             |ctx: AttemptContext| async move { complete(&ctx.provider, &ctx.model).await },
//!             DispatchOptions::new().token_estimator(|s: &String| Some(s.len() as u64 / 4)),
//!         )
//!         .await?;
//!
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod providers;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use config::{AdmissionMode, DispatchConfig, ProviderConfig, ProviderSettings, Weights};
pub use dispatch::{
    AttemptContext, AttemptPlan, AttemptRecord, AttemptTarget, AuditSink,
    DEFAULT_COLLABORATOR_TIMEOUT, DispatchAuditEvent, DispatchOptions, DispatchStats, Dispatcher,
    DispatcherBuilder, LatencyAlerter, LatencyObservation, ProviderStatus, SelectionPath,
    SinkError, ThresholdAlerter, TracingAuditSink,
};
pub use error::{CallError, DispatchError, FailureKind, Result};
pub use providers::{ActiveLoad, LoadGuard, ModelTable, PricingTable, ProviderSelector};
pub use store::{MAX_SAMPLES, MetricsStore};
pub use types::{
    LoadBalancingDecision, ModelType, PerformanceSample, ProviderAggregate, RequestPolicy,
    ScoreBreakdown, ScoredCandidate, SelectionPreferences,
};

// Attempt contexts and dispatch options carry this token type.
pub use tokio_util::sync::CancellationToken;
