//! Dispatcher error types and failure classification.
//!
//! Two layers:
//!
//! - [`CallError`] is what an injected provider call returns. It is a tagged
//!   variant produced by the caller's boundary adapter, so classification
//!   never has to probe ad-hoc error shapes.
//! - [`DispatchError`] is what [`Dispatcher::dispatch`](crate::Dispatcher::dispatch)
//!   returns to its caller. Every variant maps to a [`FailureKind`], and
//!   [`FailureKind::is_retryable`] decides whether the cascade advances.

use std::fmt;
use std::time::Duration;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No enabled provider had spare concurrency. Fatal for selection; the
    /// dispatcher answers it by switching to static priority order.
    CapacityExhausted,
    /// The attempt exceeded its clock or was aborted.
    Timeout,
    /// The vendor throttled the request (HTTP 429 or equivalent).
    RateLimited,
    /// Connection reset, fetch failure and similar transport errors.
    Network,
    /// The call succeeded but its estimated cost breached the policy ceiling.
    CostExceeded,
    /// The caller cancelled the whole dispatch.
    Cancelled,
    /// Anything else: auth failures, malformed requests, configuration.
    Fatal,
}

impl FailureKind {
    /// Whether the dispatcher should advance to the next candidate.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::RateLimited
                | FailureKind::Network
                | FailureKind::CostExceeded
        )
    }

    /// Short label used for the `phase` metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::CapacityExhausted => "capacity_exhausted",
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Network => "network",
            FailureKind::CostExceeded => "cost_exceeded",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by an injected provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("request timed out")]
    Timeout,

    /// The call observed its cancellation token and gave up.
    #[error("request aborted")]
    Aborted,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure. `code` is the transport code (`"ECONNRESET"`,
    /// `"fetch_failed"`, ...) or `"network"` when none is known.
    #[error("network error ({code}): {message}")]
    Network { code: String, message: String },

    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("vendor error ({code}): {message}")]
    Vendor { code: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl CallError {
    /// Build a call error from a vendor error code string.
    ///
    /// Recognises `"AbortError"`, `"ETIMEDOUT"`, `"ECONNRESET"`,
    /// `"fetch_failed"`, `"rate_limited"` and numeric HTTP statuses.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "AbortError" => CallError::Aborted,
            "ETIMEDOUT" | "timeout" => CallError::Timeout,
            "ECONNRESET" | "ECONNREFUSED" | "EPIPE" | "fetch_failed" => CallError::Network {
                code: code.to_owned(),
                message,
            },
            "rate_limited" | "rate_limit_exceeded" => CallError::RateLimited { retry_after: None },
            other => match other.parse::<u16>() {
                Ok(429) => CallError::RateLimited { retry_after: None },
                Ok(status) => CallError::Status { status, message },
                Err(_) => CallError::Vendor {
                    code: other.to_owned(),
                    message,
                },
            },
        }
    }

    /// Transport failure without a specific code.
    pub fn network(message: impl Into<String>) -> Self {
        CallError::Network {
            code: "network".to_owned(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            CallError::Timeout | CallError::Aborted => FailureKind::Timeout,
            CallError::RateLimited { .. } => FailureKind::RateLimited,
            CallError::Status { status: 429, .. } => FailureKind::RateLimited,
            CallError::Network { .. } => FailureKind::Network,
            CallError::Status { .. } | CallError::Vendor { .. } | CallError::Other(_) => {
                FailureKind::Fatal
            }
        }
    }

    /// Code recorded in metrics and samples (`"429"`, `"ECONNRESET"`, ...).
    pub fn code(&self) -> String {
        match self {
            CallError::Timeout | CallError::Aborted => "timeout".to_owned(),
            CallError::RateLimited { .. } => "429".to_owned(),
            CallError::Network { code, .. } => code.clone(),
            CallError::Status { status, .. } => status.to_string(),
            CallError::Vendor { code, .. } => code.clone(),
            CallError::Other(_) => "error".to_owned(),
        }
    }
}

/// Dispatcher error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    // Selection errors
    #[error("no eligible provider among {candidates:?}")]
    NoEligibleProvider { candidates: Vec<String> },

    #[error("no provider configured")]
    NoProvider,

    // Attempt errors
    #[error("{provider} timed out after {elapsed:?}")]
    Timeout { provider: String, elapsed: Duration },

    #[error("{provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} network error: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} cost {cost:.6} exceeds ceiling {max_cost:.6}")]
    CostExceeded {
        provider: String,
        cost: f64,
        max_cost: f64,
    },

    /// Fatal error reported by the vendor; stops the cascade.
    #[error("{provider} failed ({code}): {message}")]
    Provider {
        provider: String,
        code: String,
        message: String,
    },

    #[error("dispatch cancelled")]
    Cancelled,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// Wrap a call error with the provider it came from.
    pub fn from_call(provider: &str, err: CallError, elapsed: Duration) -> Self {
        let provider = provider.to_owned();
        match err {
            CallError::Timeout | CallError::Aborted => DispatchError::Timeout { provider, elapsed },
            CallError::RateLimited { retry_after } => DispatchError::RateLimited {
                provider,
                retry_after,
            },
            CallError::Status { status: 429, .. } => DispatchError::RateLimited {
                provider,
                retry_after: None,
            },
            CallError::Network { message, .. } => DispatchError::Network { provider, message },
            other => DispatchError::Provider {
                provider,
                code: other.code(),
                message: other.to_string(),
            },
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::NoEligibleProvider { .. } => FailureKind::CapacityExhausted,
            DispatchError::Timeout { .. } => FailureKind::Timeout,
            DispatchError::RateLimited { .. } => FailureKind::RateLimited,
            DispatchError::Network { .. } => FailureKind::Network,
            DispatchError::CostExceeded { .. } => FailureKind::CostExceeded,
            DispatchError::Cancelled => FailureKind::Cancelled,
            DispatchError::NoProvider
            | DispatchError::Provider { .. }
            | DispatchError::Configuration(_) => FailureKind::Fatal,
        }
    }

    /// Whether the cascade should move on to the next candidate.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Provider the error is attributed to, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            DispatchError::Timeout { provider, .. }
            | DispatchError::RateLimited { provider, .. }
            | DispatchError::Network { provider, .. }
            | DispatchError::CostExceeded { provider, .. }
            | DispatchError::Provider { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

/// Result type alias for dispatcher operations
pub type Result<T> = std::result::Result<T, DispatchError>;
