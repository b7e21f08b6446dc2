//! Per-request routing policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DispatchError;

/// Kind of model a request needs.
///
/// Each provider maps every model type to one concrete model name
/// (see [`ModelTable`](crate::providers::ModelTable)).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Chat,
    Vision,
    Reasoning,
    Artifact,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [
        ModelType::Chat,
        ModelType::Vision,
        ModelType::Reasoning,
        ModelType::Artifact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Chat => "chat",
            ModelType::Vision => "vision",
            ModelType::Reasoning => "reasoning",
            ModelType::Artifact => "artifact",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(ModelType::Chat),
            "vision" => Ok(ModelType::Vision),
            "reasoning" => Ok(ModelType::Reasoning),
            "artifact" => Ok(ModelType::Artifact),
            other => Err(DispatchError::Configuration(format!(
                "unknown model type: {other}"
            ))),
        }
    }
}

/// Routing policy for one logical request.
///
/// ```rust
/// # use llm_dispatch::{ModelType, RequestPolicy};
/// let policy = RequestPolicy::new()
///     .model_type(ModelType::Reasoning)
///     .preferred_provider("anthropic")
///     .max_cost(0.05)
///     .request_id("req-42");
/// assert_eq!(policy.preferred_provider.as_deref(), Some("anthropic"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPolicy {
    #[serde(default)]
    pub model_type: Option<ModelType>,
    /// Provider that receives the preference bonus when scoring.
    #[serde(default)]
    pub preferred_provider: Option<String>,
    /// Cost ceiling (USD) for a single request.
    #[serde(default)]
    pub max_cost: Option<f64>,
    /// Latency ceiling in milliseconds.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Explicit candidate pool, replacing the configured priority order.
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    /// Correlation id carried into logs, attempt contexts and audit events.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl RequestPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = Some(model_type);
        self
    }

    pub fn preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    pub fn max_cost(mut self, cost: f64) -> Self {
        self.max_cost = Some(cost);
        self
    }

    pub fn max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    pub fn providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Model type, defaulting to chat.
    pub fn resolved_model_type(&self) -> ModelType {
        self.model_type.unwrap_or_default()
    }

    /// The scoring-relevant subset of this policy.
    pub fn preferences(&self) -> SelectionPreferences {
        SelectionPreferences {
            preferred_provider: self.preferred_provider.clone(),
            max_cost: self.max_cost,
            max_latency_ms: self.max_latency_ms,
        }
    }
}

/// Soft preferences consulted while scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionPreferences {
    pub preferred_provider: Option<String>,
    pub max_cost: Option<f64>,
    pub max_latency_ms: Option<u64>,
}
