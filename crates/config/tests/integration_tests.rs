//! Integration tests for the config crate

use dispense_config::{validate_config, AppConfig, ConfigError, ConfigLoader};
use std::io::Write;
use std::path::{Path, PathBuf};

fn sample(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../config")
        .join(name)
}

#[test]
fn test_load_local_config() {
    let config = ConfigLoader::from_file(&sample("local.toml")).expect("Failed to load local config");

    assert!(config.backend.server_batch);
    assert_eq!(config.logging.level, "trace");
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_load_lab_config() {
    let config = ConfigLoader::from_file(&sample("lab.toml")).expect("Failed to load lab config");

    assert_eq!(config.backend.base_url, "https://dispenser.lab.internal");
    assert_eq!(config.execution.completion_timeout_secs, 600);
    // Unset keys fall back to defaults
    assert_eq!(config.execution.settle_delay_ms, 500);
    assert_eq!(config.push.topic, "/topic/dispense-status");
    assert!(config.logging.json);
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_load_sequential_yaml() {
    let config =
        ConfigLoader::from_file(&sample("sequential.yaml")).expect("Failed to load yaml config");

    assert!(!config.backend.server_batch);
    assert!(!config.push.enabled);
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_invalid_file_fails_validation() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[backend]
base_url = "dispenser"

[push]
url = "http://not-a-websocket"
"#
    )
    .unwrap();

    let config = ConfigLoader::from_file(file.path()).unwrap();
    match validate_config(&config) {
        Err(ConfigError::ValidationError(message)) => {
            assert!(message.contains("backend.base_url"));
            assert!(message.contains("push.url"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{{ \"backend\": ").unwrap();

    assert!(matches!(
        ConfigLoader::from_file(file.path()),
        Err(ConfigError::JsonError(_))
    ));
}

#[test]
fn test_builder_layers_file_and_defaults() {
    let config = ConfigLoader::builder()
        .add_file(&sample("lab.toml"), true)
        .add_file(Path::new("/nonexistent/override.toml"), false)
        .set_default("execution.min_volume", "0.5")
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(config.backend.request_timeout_ms, 15000);
    assert_eq!(config.execution.min_volume, 0.5);
}

#[test]
fn test_file_with_env_overrides_single_key() {
    std::env::set_var("DISPENSEIT_EXECUTION__SETTLE_DELAY_MS", "50");

    let config = ConfigLoader::from_file_with_env(&sample("lab.toml"), "DISPENSEIT").unwrap();
    assert_eq!(config.execution.settle_delay_ms, 50);
    assert_eq!(config.execution.completion_timeout_secs, 600);

    std::env::remove_var("DISPENSEIT_EXECUTION__SETTLE_DELAY_MS");
}

#[test]
fn test_missing_file_with_env() {
    assert!(matches!(
        ConfigLoader::from_file_with_env(Path::new("/nonexistent/dispense.toml"), "DISPENSE"),
        Err(ConfigError::LoadError(_))
    ));
}

#[test]
fn test_default_values() {
    let config = AppConfig::default();
    let roundtrip = ConfigLoader::from_json(&serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(roundtrip, config);
}
