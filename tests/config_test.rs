//! Integration tests for configuration loading.

use std::io::Write;
use std::time::Duration;

use llm_dispatch::{AdmissionMode, DispatchConfig, Dispatcher, RequestPolicy};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_reads_explicit_toml_file() {
    let file = write_config(
        r#"
        provider_priority = ["google", "ollama"]
        provider_timeout_ms = 12000
        max_cost_per_request = 0.25
        window_hours = 6

        [providers.ollama]
        max_concurrent = 1
        "#,
    );

    let config = DispatchConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.provider_priority, vec!["google", "ollama"]);
    assert_eq!(config.provider_timeout_duration(), Duration::from_secs(12));
    assert_eq!(config.max_cost_per_request, Some(0.25));
    assert_eq!(config.window(), Duration::from_secs(6 * 3600));

    let table = config.provider_configs();
    assert_eq!(table[1].0, "ollama");
    assert_eq!(table[1].1.max_concurrent, 1);
    assert_eq!(table[1].1.priority, 2);
}

#[test]
fn invalid_toml_is_a_configuration_error() {
    let file = write_config("provider_priority = [\"openai\"\n");
    let err = DispatchConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn loaded_config_is_validated() {
    let file = write_config("provider_timeout_ms = 0\n");
    assert!(DispatchConfig::load(Some(file.path())).is_err());
}

#[test]
fn env_style_vars_drive_a_dispatcher() {
    let config = DispatchConfig::from_vars([
        ("AI_PROVIDER_PRIORITY", "ollama, anthropic"),
        ("AI_COST_WEIGHT", "40"),
        ("AI_ADMISSION_MODE", "strict"),
        ("AI_MAX_LATENCY_MS", "2500"),
        ("UNRELATED", "ignored"),
    ])
    .unwrap();
    assert_eq!(config.weights.cost, 0.4);
    assert_eq!(config.admission, AdmissionMode::Strict);
    assert_eq!(config.max_latency_ms, Some(2500));

    let dispatcher = Dispatcher::new(config).unwrap();
    assert_eq!(dispatcher.admission(), AdmissionMode::Strict);
    let plan = dispatcher.plan(&RequestPolicy::new()).unwrap();
    assert_eq!(plan.providers().collect::<Vec<_>>(), vec!["ollama", "anthropic"]);
}

#[test]
fn resolved_config_survives_toml_round_trip() {
    let config = DispatchConfig::default()
        .max_latency_ms(4000)
        .admission(AdmissionMode::Strict);
    let text = toml::to_string_pretty(&config).unwrap();
    let parsed = DispatchConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed, config);
}
