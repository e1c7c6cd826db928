//! Configuration validation

use crate::{AppConfig, ConfigError, Result};

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Validation error details
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every problem in `config`, in section order
pub fn collect_errors(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Backend
    if let Err(e) = validate_url(&config.backend.base_url, &["http://", "https://"]) {
        errors.push(ValidationError::new("backend.base_url", e));
    }

    if config.backend.request_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "backend.request_timeout_ms",
            "must be greater than 0",
        ));
    }

    // Push
    if config.push.enabled {
        if let Err(e) = validate_url(&config.push.url, &["ws://", "wss://"]) {
            errors.push(ValidationError::new("push.url", e));
        }

        if !config.push.topic.starts_with('/') {
            errors.push(ValidationError::new(
                "push.topic",
                "destination must start with '/'",
            ));
        }

        if config.push.reconnect_delay_ms == 0 {
            errors.push(ValidationError::new(
                "push.reconnect_delay_ms",
                "must be greater than 0",
            ));
        }
    }

    // Execution
    if config.execution.completion_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "execution.completion_timeout_secs",
            "must be greater than 0",
        ));
    }

    if !config.execution.min_volume.is_finite() || config.execution.min_volume <= 0.0 {
        errors.push(ValidationError::new(
            "execution.min_volume",
            "must be a positive volume",
        ));
    }

    // Logging
    if let Err(e) = validate_log_level(&config.logging.level) {
        errors.push(e);
    }

    errors
}

/// Validate the entire application configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_msg = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    Err(ConfigError::ValidationError(error_msg))
}

/// Validate a URL against the allowed schemes
pub fn validate_url(url: &str, schemes: &[&str]) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(format!("URL must start with {}", schemes.join(" or ")));
    }

    Ok(())
}

/// Validate filter directives such as `info,dispense=debug`
fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    if level.trim().is_empty() {
        return Err(ValidationError::new("logging.level", "cannot be empty"));
    }

    for directive in level.split(',') {
        let level = directive
            .rsplit_once('=')
            .map_or(directive, |(_, level)| level)
            .trim()
            .to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ValidationError::new(
                "logging.level",
                format!("invalid level in directive '{directive}'"),
            ));
        }
    }

    Ok(())
}
