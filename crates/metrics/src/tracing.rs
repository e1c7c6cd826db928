use std::sync::Arc;
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::MetricsCollector;

const DEFAULT_FILTER: &str = "info,dispense=debug";

/// Subscriber settings, usually taken from the `logging` config section
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

/// Initialize tracing with metrics integration, JSON output and the default filter
pub fn init_tracing_with_metrics(collector: Arc<MetricsCollector>) -> Result<(), TracingError> {
    init_tracing(
        &LoggingOptions {
            json: true,
            ..LoggingOptions::default()
        },
        collector,
    )
}

/// Install the global subscriber: env filter, fmt layer and [`MetricsLayer`]
pub fn init_tracing(
    options: &LoggingOptions,
    collector: Arc<MetricsCollector>,
) -> Result<(), TracingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.level)
            .map_err(|e| TracingError::InvalidFilter(e.to_string()))?,
    };

    let (json_layer, text_layer) = if options.json {
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .json();
        (Some(layer), None)
    } else {
        let layer = fmt::layer().with_target(true).with_level(true);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(MetricsLayer::new(collector))
        .try_init()
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    Ok(())
}

/// Tracing layer that counts warning and error events carrying an `error_type` field
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl MetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level != Level::ERROR && level != Level::WARN {
            return;
        }

        let mut visitor = ErrorTypeVisitor::default();
        event.record(&mut visitor);

        if let Some(error_type) = visitor.error_type.as_deref() {
            self.collector.record_error(error_type);
        }
    }
}

#[derive(Default)]
struct ErrorTypeVisitor {
    error_type: Option<String>,
}

impl Visit for ErrorTypeVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "error_type" {
            self.error_type = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "error_type" {
            self.error_type = Some(value.to_string());
        }
    }
}

/// Correlation ID tying together the log lines of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    /// Generate a new correlation ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the correlation ID as a string
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one plan execution
#[derive(Debug, Clone)]
pub struct ExecutionSpan {
    pub correlation_id: CorrelationId,
    pub plate_id: i64,
    pub strategy: &'static str,
}

impl ExecutionSpan {
    pub fn new(plate_id: i64, strategy: &'static str) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            plate_id,
            strategy,
        }
    }

    /// Span to instrument the execution future with
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "execution",
            correlation_id = %self.correlation_id,
            plate_id = self.plate_id,
            strategy = self.strategy,
        )
    }
}

/// Tracing error types
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),

    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
}
