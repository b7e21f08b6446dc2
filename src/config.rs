//! Dispatcher configuration.
//!
//! Configuration is sourced from, in order of precedence:
//! 1. Environment variables (`AI_*`, see [`DispatchConfig::from_env`])
//! 2. A TOML file (see [`DispatchConfig::load`])
//! 3. Built-in defaults
//!
//! It is read once at startup and can be swapped at runtime through
//! [`Dispatcher::reconfigure`](crate::Dispatcher::reconfigure).
//!
//! ```toml
//! provider_priority = ["anthropic", "openai", "ollama"]
//! provider_timeout_ms = 20000
//! max_cost_per_request = 0.25
//! admission = "strict"
//!
//! [weights]
//! cost = 0.2
//! latency = 0.3
//! reliability = 0.3
//!
//! [providers.ollama]
//! max_concurrent = 2
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DispatchError, Result};

/// Default per-attempt timeout.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 30_000;

/// Default trailing window for aggregates.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default concurrency ceiling for providers without an explicit setting.
pub const DEFAULT_MAX_CONCURRENT: u32 = 10;

/// Providers configured when nothing else is specified, highest priority first.
pub const DEFAULT_PROVIDER_PRIORITY: &[&str] = &["openai", "anthropic", "google", "ollama"];

/// Environment variable names.
pub mod env {
    pub const COST_WEIGHT: &str = "AI_COST_WEIGHT";
    pub const LATENCY_WEIGHT: &str = "AI_LATENCY_WEIGHT";
    pub const RELIABILITY_WEIGHT: &str = "AI_RELIABILITY_WEIGHT";
    pub const MAX_COST_PER_REQUEST: &str = "AI_MAX_COST_PER_REQUEST";
    pub const MAX_LATENCY_MS: &str = "AI_MAX_LATENCY_MS";
    pub const PROVIDER_TIMEOUT_MS: &str = "AI_PROVIDER_TIMEOUT_MS";
    pub const PROVIDER_PRIORITY: &str = "AI_PROVIDER_PRIORITY";
    pub const ADMISSION_MODE: &str = "AI_ADMISSION_MODE";
}

/// Static, admin-configured settings for one provider.
///
/// Weights are independent multipliers in [0, 1]; they need not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name.
    pub name: String,
    /// 1 = highest. Scored as `1 / priority`.
    pub priority: u32,
    pub max_concurrent: u32,
    pub cost_weight: f64,
    pub latency_weight: f64,
    pub reliability_weight: f64,
    pub enabled: bool,
}

impl ProviderConfig {
    /// A provider with the given priority and default weights.
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        let weights = Weights::default();
        Self {
            name: name.into(),
            priority,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cost_weight: weights.cost,
            latency_weight: weights.latency,
            reliability_weight: weights.reliability,
            enabled: true,
        }
    }

    pub fn max_concurrent(mut self, n: u32) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.cost_weight = weights.cost;
        self.latency_weight = weights.latency;
        self.reliability_weight = weights.reliability;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self, id: &str) -> Result<()> {
        if self.priority == 0 {
            return Err(DispatchError::Configuration(format!(
                "provider {id}: priority must be >= 1"
            )));
        }
        if self.max_concurrent == 0 {
            return Err(DispatchError::Configuration(format!(
                "provider {id}: max_concurrent must be >= 1"
            )));
        }
        for (label, w) in [
            ("cost_weight", self.cost_weight),
            ("latency_weight", self.latency_weight),
            ("reliability_weight", self.reliability_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(DispatchError::Configuration(format!(
                    "provider {id}: {label} {w} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

/// Process-wide scoring weights.
///
/// The defaults leave headroom for the fixed load (0.10) and priority (0.10)
/// terms so that the best possible unpreferred score is 0.8.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub cost: f64,
    pub latency: f64,
    pub reliability: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cost: 0.25,
            latency: 0.25,
            reliability: 0.30,
        }
    }
}

/// How strictly concurrency ceilings are enforced at attempt time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// The ceiling is only consulted while scoring. Two concurrent requests
    /// can both pick a provider with one free slot and overshoot by one.
    #[default]
    BestEffort,
    /// Check-and-increment under the load lock when an attempt starts; a
    /// saturated candidate is skipped.
    Strict,
}

impl std::str::FromStr for AdmissionMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(AdmissionMode::BestEffort),
            "strict" => Ok(AdmissionMode::Strict),
            other => Err(DispatchError::Configuration(format!(
                "unknown admission mode: {other}"
            ))),
        }
    }
}

/// Per-provider overrides. Unset fields fall back to the global defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub weights: Option<Weights>,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub weights: Weights,
    /// Default cost ceiling when a request policy sets none.
    pub max_cost_per_request: Option<f64>,
    /// Default latency ceiling when a request policy sets none.
    pub max_latency_ms: Option<u64>,
    pub provider_timeout_ms: u64,
    /// Provider ids, highest priority first.
    pub provider_priority: Vec<String>,
    pub admission: AdmissionMode,
    /// Trailing aggregate window in hours.
    pub window_hours: u64,
    /// Sample ledger capacity.
    pub max_samples: usize,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        // Self-hosted models are usually a single GPU box.
        providers.insert(
            "ollama".to_string(),
            ProviderSettings {
                name: Some("Ollama".to_string()),
                max_concurrent: Some(2),
                ..Default::default()
            },
        );
        Self {
            weights: Weights::default(),
            max_cost_per_request: None,
            max_latency_ms: None,
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            provider_priority: DEFAULT_PROVIDER_PRIORITY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            admission: AdmissionMode::default(),
            window_hours: 24,
            max_samples: crate::store::MAX_SAMPLES,
            providers,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn max_cost_per_request(mut self, cost: f64) -> Self {
        self.max_cost_per_request = Some(cost);
        self
    }

    pub fn max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn provider_priority<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provider_priority = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn admission(mut self, mode: AdmissionMode) -> Self {
        self.admission = mode;
        self
    }

    pub fn max_samples(mut self, n: usize) -> Self {
        self.max_samples = n;
        self
    }

    /// Add or replace the overrides for one provider.
    pub fn provider(mut self, id: impl Into<String>, settings: ProviderSettings) -> Self {
        self.providers.insert(id.into(), settings);
        self
    }

    pub fn provider_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_hours.saturating_mul(3600))
    }

    /// Resolve the full provider table, in priority order.
    ///
    /// Priority numbers follow list position (first = 1). Weights come from
    /// the global [`Weights`] unless the provider overrides them.
    pub fn provider_configs(&self) -> Vec<(String, ProviderConfig)> {
        self.provider_priority
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                let settings = self.providers.get(id).cloned().unwrap_or_default();
                let priority = u32::try_from(idx + 1).unwrap_or(u32::MAX);
                let config = ProviderConfig::new(settings.name.unwrap_or_else(|| id.clone()), priority)
                    .max_concurrent(settings.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT))
                    .weights(settings.weights.unwrap_or(self.weights))
                    .enabled(settings.enabled.unwrap_or(true));
                (id.clone(), config)
            })
            .collect()
    }

    /// Check ranges and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.provider_priority.is_empty() {
            return Err(DispatchError::Configuration(
                "provider_priority must name at least one provider".into(),
            ));
        }
        if self.provider_timeout_ms == 0 {
            return Err(DispatchError::Configuration(
                "provider_timeout_ms must be > 0".into(),
            ));
        }
        if self.max_samples == 0 {
            return Err(DispatchError::Configuration("max_samples must be > 0".into()));
        }
        if let Some(cost) = self.max_cost_per_request
            && (cost.is_nan() || cost < 0.0)
        {
            return Err(DispatchError::Configuration(format!(
                "max_cost_per_request {cost} must be >= 0"
            )));
        }
        for (id, config) in self.provider_configs() {
            config.validate(&id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Environment
    // ========================================================================

    /// Defaults overlaid with the `AI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overlaid with `AI_*` variables from an arbitrary source.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::default().with_vars(vars)
    }

    /// Overlay `AI_*` variables from an arbitrary source onto this config.
    ///
    /// Weights are given as percentages (`AI_COST_WEIGHT=40` → 0.4). The
    /// priority list is comma-separated. Unrelated variables are ignored.
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                env::COST_WEIGHT => self.weights.cost = parse_percent(env::COST_WEIGHT, value)?,
                env::LATENCY_WEIGHT => {
                    self.weights.latency = parse_percent(env::LATENCY_WEIGHT, value)?
                }
                env::RELIABILITY_WEIGHT => {
                    self.weights.reliability = parse_percent(env::RELIABILITY_WEIGHT, value)?
                }
                env::MAX_COST_PER_REQUEST => {
                    self.max_cost_per_request = Some(parse(env::MAX_COST_PER_REQUEST, value)?)
                }
                env::MAX_LATENCY_MS => {
                    self.max_latency_ms = Some(parse(env::MAX_LATENCY_MS, value)?)
                }
                env::PROVIDER_TIMEOUT_MS => {
                    self.provider_timeout_ms = parse(env::PROVIDER_TIMEOUT_MS, value)?
                }
                env::PROVIDER_PRIORITY => {
                    self.provider_priority = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                env::ADMISSION_MODE => self.admission = value.parse()?,
                _ => {}
            }
        }
        Ok(self)
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DispatchError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.llm-dispatch/config.toml`
    /// 3. `/etc/llm-dispatch/config.toml`
    /// 4. Built-in defaults
    ///
    /// Environment variables are applied on top in every case.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let base = match Self::resolve_config_path(explicit_path)? {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    DispatchError::Configuration(format!(
                        "Failed to read config file {path:?}: {e}"
                    ))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        let config = base.with_vars(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(DispatchError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".llm-dispatch").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/llm-dispatch/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

fn parse<T: std::str::FromStr>(var: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| DispatchError::Configuration(format!("{var}={value:?}: {e}")))
}

fn parse_percent(var: &str, value: &str) -> Result<f64> {
    let pct: f64 = parse(var, value)?;
    if !(0.0..=100.0).contains(&pct) {
        return Err(DispatchError::Configuration(format!(
            "{var}={value:?}: percentage outside 0..=100"
        )));
    }
    Ok(pct / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.provider_timeout_ms, 30_000);
        assert_eq!(config.window(), DEFAULT_WINDOW);
        assert_eq!(config.max_samples, 1000);
        assert_eq!(config.admission, AdmissionMode::BestEffort);
        assert_eq!(
            config.provider_priority,
            vec!["openai", "anthropic", "google", "ollama"]
        );
        config.validate().unwrap();
    }

    #[test]
    fn provider_configs_follow_priority_order() {
        let configs = DispatchConfig::default().provider_configs();
        let ids: Vec<_> = configs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["openai", "anthropic", "google", "ollama"]);
        assert_eq!(configs[0].1.priority, 1);
        assert_eq!(configs[3].1.priority, 4);
        assert_eq!(configs[3].1.max_concurrent, 2);
        assert_eq!(configs[3].1.name, "Ollama");
        assert_eq!(configs[0].1.cost_weight, 0.25);
    }

    #[test]
    fn env_vars_overlay_defaults() {
        let config = DispatchConfig::default()
            .with_vars([
                ("AI_COST_WEIGHT", "40"),
                ("AI_LATENCY_WEIGHT", "20"),
                ("AI_RELIABILITY_WEIGHT", "10"),
                ("AI_MAX_COST_PER_REQUEST", "0.05"),
                ("AI_MAX_LATENCY_MS", "8000"),
                ("AI_PROVIDER_TIMEOUT_MS", "15000"),
                ("AI_PROVIDER_PRIORITY", " anthropic, ollama ,,openai"),
                ("AI_ADMISSION_MODE", "strict"),
                ("HOME", "/root"),
            ])
            .unwrap();
        assert_eq!(config.weights.cost, 0.4);
        assert_eq!(config.weights.latency, 0.2);
        assert_eq!(config.weights.reliability, 0.1);
        assert_eq!(config.max_cost_per_request, Some(0.05));
        assert_eq!(config.max_latency_ms, Some(8000));
        assert_eq!(config.provider_timeout_ms, 15_000);
        assert_eq!(config.provider_priority, vec!["anthropic", "ollama", "openai"]);
        assert_eq!(config.admission, AdmissionMode::Strict);
    }

    #[test]
    fn env_weight_out_of_range_is_rejected() {
        let err = DispatchConfig::default()
            .with_vars([("AI_COST_WEIGHT", "150")])
            .unwrap_err();
        assert!(err.to_string().contains("AI_COST_WEIGHT"));
    }

    #[test]
    fn env_garbage_is_rejected() {
        assert!(
            DispatchConfig::default()
                .with_vars([("AI_PROVIDER_TIMEOUT_MS", "soon")])
                .is_err()
        );
    }

    #[test]
    fn parse_toml_config() {
        let config = DispatchConfig::from_toml_str(
            r#"
            provider_priority = ["anthropic", "ollama"]
            provider_timeout_ms = 20000
            admission = "strict"

            [weights]
            cost = 0.1

            [providers.anthropic]
            max_concurrent = 3
            enabled = false
        "#,
        )
        .unwrap();
        assert_eq!(config.provider_timeout_ms, 20_000);
        assert_eq!(config.admission, AdmissionMode::Strict);
        assert_eq!(config.weights.cost, 0.1);
        // Unset weights keep their defaults
        assert_eq!(config.weights.latency, 0.25);
        let table = config.provider_configs();
        assert_eq!(table[0].1.max_concurrent, 3);
        assert!(!table[0].1.enabled);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let config = DispatchConfig::default().provider(
            "openai",
            ProviderSettings {
                max_concurrent: Some(0),
                ..Default::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_priority() {
        let config = DispatchConfig::default().provider_priority(Vec::<String>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_not_found_returns_error() {
        let err = DispatchConfig::load(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
