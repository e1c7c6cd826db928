//! Core configuration structures for the reagent dispense client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// REST backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Push status channel
    #[serde(default)]
    pub push: PushConfig,

    /// Plan execution
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// REST backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Origin serving `/api/dispense`, `/api/plates` and `/api/reagents`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Use server-side batches; `false` submits plans one operation at a time
    #[serde(default = "default_true")]
    pub server_batch: bool,
}

/// Push channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Subscribe to status events at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// WebSocket endpoint of the STOMP broker
    #[serde(default = "default_push_url")]
    pub url: String,

    /// Virtual host sent in CONNECT
    #[serde(default = "default_push_host")]
    pub host: String,

    /// Destination carrying status envelopes
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Delay before reconnecting a dropped connection, in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

/// Plan execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Pause between sequential submissions, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How long an accepted batch may run without a completion event
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,

    /// Smallest volume accepted into a plan
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives (e.g. `info,dispense=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines
    #[serde(default)]
    pub json: bool,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PushConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl ExecutionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_push_url() -> String {
    "ws://localhost:8080/ws/websocket".to_string()
}

fn default_push_host() -> String {
    "localhost".to_string()
}

fn default_topic() -> String {
    "/topic/dispense-status".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_completion_timeout_secs() -> u64 {
    300 // 5 minutes
}

fn default_min_volume() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info,dispense=debug".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            server_batch: default_true(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            url: default_push_url(),
            host: default_push_host(),
            topic: default_topic(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            completion_timeout_secs: default_completion_timeout_secs(),
            min_volume: default_min_volume(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.backend.server_batch);
        assert_eq!(config.push.topic, "/topic/dispense-status");
        assert_eq!(config.execution.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.execution.completion_timeout(), Duration::from_secs(300));
        assert_eq!(config.push.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_sections_take_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"backend": {"server_batch": false}}"#).unwrap();
        assert!(!config.backend.server_batch);
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert_eq!(config.execution, ExecutionConfig::default());
    }
}
