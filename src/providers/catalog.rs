//! Static provider data: which model serves each model type, and what it costs.
//!
//! Both tables are configuration data. They ship with defaults for the
//! built-in providers and can be extended with builder-style setters.

use std::collections::HashMap;

use crate::types::ModelType;

/// Cost reference used for providers missing from the base-cost table.
pub const DEFAULT_BASE_UNIT_COST: f64 = 1.0;

/// Provider → model type → model name.
#[derive(Debug, Clone)]
pub struct ModelTable {
    models: HashMap<String, HashMap<ModelType, String>>,
}

impl ModelTable {
    /// An empty table. Every lookup falls back to the provider id.
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Set the model serving `model_type` on `provider`.
    pub fn with_model(
        mut self,
        provider: impl Into<String>,
        model_type: ModelType,
        model: impl Into<String>,
    ) -> Self {
        self.insert(provider, model_type, model);
        self
    }

    pub fn insert(
        &mut self,
        provider: impl Into<String>,
        model_type: ModelType,
        model: impl Into<String>,
    ) {
        self.models
            .entry(provider.into())
            .or_default()
            .insert(model_type, model.into());
    }

    /// Resolve the concrete model for a provider and model type.
    ///
    /// Falls back to the provider's chat model, then to the provider id
    /// itself, so resolution never fails.
    pub fn resolve(&self, provider: &str, model_type: ModelType) -> String {
        self.models
            .get(provider)
            .and_then(|m| m.get(&model_type).or_else(|| m.get(&ModelType::Chat)))
            .cloned()
            .unwrap_or_else(|| provider.to_string())
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        let rows: &[(&str, [&str; 4])] = &[
            ("openai", ["gpt-4o-mini", "gpt-4o", "o3-mini", "gpt-4o"]),
            (
                "anthropic",
                [
                    "claude-3-5-haiku-latest",
                    "claude-3-5-sonnet-latest",
                    "claude-3-7-sonnet-latest",
                    "claude-3-5-sonnet-latest",
                ],
            ),
            (
                "google",
                [
                    "gemini-1.5-flash",
                    "gemini-1.5-pro",
                    "gemini-2.0-flash-thinking-exp",
                    "gemini-1.5-pro",
                ],
            ),
            ("ollama", ["llama3.1", "llava", "deepseek-r1", "llama3.1"]),
        ];
        let mut table = Self::empty();
        for (provider, models) in rows {
            for (model_type, model) in ModelType::ALL.iter().zip(models) {
                table.insert(*provider, *model_type, *model);
            }
        }
        table
    }
}

/// Reference prices used for cost scoring and cost estimation.
///
/// - *base unit cost*: per-provider reference price a provider's recent
///   spend is compared against while scoring. Self-hosted providers have a
///   base of 0 and always score full marks on cost.
/// - *unit price*: USD per token for a (provider, model) pair, used to
///   derive a sample's cost from its token estimate.
#[derive(Debug, Clone)]
pub struct PricingTable {
    base_unit_cost: HashMap<String, f64>,
    unit_price: HashMap<(String, String), f64>,
}

impl PricingTable {
    pub fn empty() -> Self {
        Self {
            base_unit_cost: HashMap::new(),
            unit_price: HashMap::new(),
        }
    }

    pub fn with_base_unit_cost(mut self, provider: impl Into<String>, cost: f64) -> Self {
        self.base_unit_cost.insert(provider.into(), cost.max(0.0));
        self
    }

    pub fn with_unit_price(
        mut self,
        provider: impl Into<String>,
        model: impl Into<String>,
        usd_per_token: f64,
    ) -> Self {
        self.unit_price
            .insert((provider.into(), model.into()), usd_per_token.max(0.0));
        self
    }

    /// Reference cost for a provider ([`DEFAULT_BASE_UNIT_COST`] if unknown).
    pub fn base_unit_cost(&self, provider: &str) -> f64 {
        self.base_unit_cost
            .get(provider)
            .copied()
            .unwrap_or(DEFAULT_BASE_UNIT_COST)
    }

    /// USD per token for a pair, if known.
    pub fn unit_price(&self, provider: &str, model: &str) -> Option<f64> {
        self.unit_price
            .get(&(provider.to_string(), model.to_string()))
            .copied()
    }

    /// Estimated cost of `tokens` on a pair; 0 when the price is unknown.
    pub fn estimate(&self, provider: &str, model: &str, tokens: u64) -> f64 {
        self.unit_price(provider, model)
            .map(|price| price * tokens as f64)
            .unwrap_or(0.0)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        // Blended prompt/completion USD per token.
        let prices: &[(&str, &str, f64)] = &[
            ("openai", "gpt-4o-mini", 0.000_000_375),
            ("openai", "gpt-4o", 0.000_006_25),
            ("openai", "o3-mini", 0.000_002_75),
            ("anthropic", "claude-3-5-haiku-latest", 0.000_002_4),
            ("anthropic", "claude-3-5-sonnet-latest", 0.000_009),
            ("anthropic", "claude-3-7-sonnet-latest", 0.000_009),
            ("google", "gemini-1.5-flash", 0.000_000_19),
            ("google", "gemini-1.5-pro", 0.000_003_125),
            ("google", "gemini-2.0-flash-thinking-exp", 0.000_000_25),
        ];
        let mut table = Self::empty()
            .with_base_unit_cost("openai", 0.03)
            .with_base_unit_cost("anthropic", 0.015)
            .with_base_unit_cost("google", 0.01)
            .with_base_unit_cost("ollama", 0.0);
        for (provider, model, price) in prices {
            table = table.with_unit_price(*provider, *model, *price);
        }
        table
    }
}
