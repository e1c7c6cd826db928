//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "DISPENSE";

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading config file");

        match extension {
            "toml" => Self::from_toml(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from environment variables with the `DISPENSE` prefix
    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load configuration from environment variables with custom prefix
    ///
    /// Variables are named `PREFIX_SECTION__KEY`, for example
    /// `DISPENSE_BACKEND__BASE_URL`. Unset keys keep their defaults.
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        Self::builder().add_env(prefix).build()
    }

    /// Merge two configurations section by section, with overlay taking precedence
    /// for every section that differs from its default
    pub fn merge(base: AppConfig, overlay: AppConfig) -> AppConfig {
        let defaults = AppConfig::default();
        AppConfig {
            backend: if overlay.backend != defaults.backend {
                overlay.backend
            } else {
                base.backend
            },
            push: if overlay.push != defaults.push {
                overlay.push
            } else {
                base.push
            },
            execution: if overlay.execution != defaults.execution {
                overlay.execution
            } else {
                base.execution
            },
            logging: if overlay.logging != defaults.logging {
                overlay.logging
            } else {
                base.logging
            },
        }
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Individual keys set in the environment replace the file's values.
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ConfigError::LoadError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::builder().add_file(path, true).add_env(env_prefix).build()
    }

    /// Build configuration using the config crate's builder pattern
    ///
    /// This allows for more complex configuration scenarios with multiple sources
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

/// Builder for complex configuration loading scenarios
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    /// Add a configuration file source
    pub fn add_file(mut self, path: &Path, required: bool) -> Self {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };

        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    /// Set a default value for a key such as `backend.base_url`
    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    /// Set a value that overrides every source
    pub fn set_override(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Build the final configuration
    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_toml() {
        let toml = r#"
            [backend]
            base_url = "http://dispenser.lab:8080"
            server_batch = false

            [execution]
            settle_delay_ms = 250

            [logging]
            level = "debug"
        "#;

        let config = ConfigLoader::from_toml(toml).unwrap();
        assert_eq!(config.backend.base_url, "http://dispenser.lab:8080");
        assert!(!config.backend.server_batch);
        assert_eq!(config.execution.settle_delay_ms, 250);
        assert_eq!(config.execution.completion_timeout_secs, 300);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
backend:
  base_url: "http://dispenser.lab:8080"
push:
  url: "ws://dispenser.lab:8080/ws/websocket"
  reconnect_delay_ms: 1000
execution:
  min_volume: 0.5
        "#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.push.reconnect_delay_ms, 1000);
        assert_eq!(config.execution.min_volume, 0.5);
        assert!(config.push.enabled);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"
{
  "backend": { "base_url": "https://dispenser.lab", "request_timeout_ms": 10000 },
  "logging": { "level": "warn", "json": true }
}
        "#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.backend.request_timeout_ms, 10000);
        assert!(config.logging.json);
        assert_eq!(config.push.topic, "/topic/dispense-status");
    }

    #[test]
    fn test_load_from_file() {
        let toml = r#"
[backend]
base_url = "http://dispenser.lab:8080"

[push]
enabled = false
        "#;

        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert!(!config.push.enabled);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            ConfigLoader::from_file(file.path()),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_env_overrides_single_keys() {
        std::env::set_var("DISPENSETEST_BACKEND__SERVER_BATCH", "false");
        std::env::set_var("DISPENSETEST_EXECUTION__SETTLE_DELAY_MS", "100");

        let config = ConfigLoader::from_env_with_prefix("DISPENSETEST").unwrap();
        assert!(!config.backend.server_batch);
        assert_eq!(config.execution.settle_delay_ms, 100);
        assert_eq!(config.backend.base_url, "http://localhost:8080");

        std::env::remove_var("DISPENSETEST_BACKEND__SERVER_BATCH");
        std::env::remove_var("DISPENSETEST_EXECUTION__SETTLE_DELAY_MS");
    }

    #[test]
    fn test_builder_override() {
        let config = ConfigLoader::builder()
            .set_override("logging.level", "trace")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_merge_configs() {
        let base = AppConfig {
            backend: crate::BackendConfig {
                base_url: "http://base:8080".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let overlay = AppConfig {
            logging: crate::LoggingConfig {
                level: "debug".to_string(),
                json: true,
            },
            ..Default::default()
        };

        let merged = ConfigLoader::merge(base, overlay);
        assert_eq!(merged.backend.base_url, "http://base:8080");
        assert_eq!(merged.logging.level, "debug");
    }
}
