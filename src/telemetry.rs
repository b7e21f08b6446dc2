//! Telemetry metric name constants.
//!
//! Centralised metric names for dispatcher operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Common labels
//!
//! - `provider`: provider id (e.g. "openai", "ollama")
//! - `model`: concrete model the attempt was sent to
//! - `phase`: "start", "ok", "timeout", or the failing error code

/// Attempt lifecycle counter.
///
/// Labels: `provider`, `model`, `phase`.
pub const REQUESTS_TOTAL: &str = "ai_requests_total";

/// Attempt latency in milliseconds.
///
/// Labels: `provider`, `model`.
pub const LATENCY_MS: &str = "ai_latency_ms";

/// Successful calls rejected because their estimated cost breached the ceiling.
///
/// Labels: `provider`, `model`.
pub const COST_EXCEEDED_TOTAL: &str = "ai_cost_exceeded_total";

/// Dispatches that fell back to static priority order because scoring found
/// no eligible provider.
pub const SELECTION_FALLBACK_TOTAL: &str = "ai_selection_fallback_total";

/// Dispatches that ran out of candidates.
pub const DISPATCH_EXHAUSTED_TOTAL: &str = "ai_dispatch_exhausted_total";
