//! Per-attempt context and per-dispatch options.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Handed to the caller's provider call for every attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub provider: String,
    pub model: String,
    /// Zero-based position in the candidate cascade.
    pub attempt: usize,
    pub request_id: Option<String>,
    /// Cancelled when the attempt times out or the dispatch is cancelled.
    /// Long-running calls should watch it and return
    /// [`CallError::Aborted`](crate::CallError::Aborted).
    pub cancellation: CancellationToken,
}

type CostEstimator<T> = Box<dyn Fn(&T) -> Option<f64> + Send + Sync>;
type TokenEstimator<T> = Box<dyn Fn(&T) -> Option<u64> + Send + Sync>;

/// Optional hooks and overrides for one dispatch.
///
/// ```rust
/// # use std::time::Duration;
/// # use llm_dispatch::DispatchOptions;
/// struct Reply { tokens: u64 }
///
/// let options = DispatchOptions::<Reply>::new()
///     .token_estimator(|r| Some(r.tokens))
///     .timeout(Duration::from_secs(10));
/// ```
pub struct DispatchOptions<T> {
    pub(crate) cost_estimator: Option<CostEstimator<T>>,
    pub(crate) token_estimator: Option<TokenEstimator<T>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl<T> DispatchOptions<T> {
    pub fn new() -> Self {
        Self {
            cost_estimator: None,
            token_estimator: None,
            timeout: None,
            cancellation: None,
        }
    }

    /// Estimate the USD cost of a successful result.
    ///
    /// Returning `None` falls back to `tokens × unit price` when a token
    /// estimate is available.
    pub fn cost_estimator<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Option<f64> + Send + Sync + 'static,
    {
        self.cost_estimator = Some(Box::new(f));
        self
    }

    /// Estimate the token count of a successful result.
    pub fn token_estimator<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Option<u64> + Send + Sync + 'static,
    {
        self.token_estimator = Some(Box::new(f));
        self
    }

    /// Per-attempt timeout for this dispatch only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancelling this token stops the whole cascade. Each attempt gets a
    /// child token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn estimate_cost(&self, value: &T) -> Option<f64> {
        self.cost_estimator
            .as_ref()
            .and_then(|f| f(value))
            .filter(|c| c.is_finite())
            .map(|c| c.max(0.0))
    }

    pub(crate) fn estimate_tokens(&self, value: &T) -> Option<u64> {
        self.token_estimator.as_ref().and_then(|f| f(value))
    }
}

impl<T> Default for DispatchOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DispatchOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOptions")
            .field("cost_estimator", &self.cost_estimator.is_some())
            .field("token_estimator", &self.token_estimator.is_some())
            .field("timeout", &self.timeout)
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}
