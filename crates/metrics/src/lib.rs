//! Metrics and tracing for the reagent dispense client
//!
//! Counters and gauges are registered once in the default prometheus
//! registry; [`MetricsCollector`] is the recording API the orchestrator
//! calls and renders the text exposition for whatever shell embeds the
//! library.
//!
//! # Example
//!
//! ```no_run
//! use dispense_metrics::{init_tracing, LoggingOptions, MetricsCollector};
//! use std::sync::Arc;
//!
//! let collector = Arc::new(MetricsCollector::new());
//! init_tracing(&LoggingOptions::default(), collector.clone()).unwrap();
//!
//! collector.record_operation_planned();
//! println!("{}", collector.export_metrics().unwrap());
//! ```

pub mod collector;
pub mod metrics;
pub mod tracing;

pub use collector::{BatchOutcome, MetricsCollector, MetricsError, ReloadTrigger};
pub use crate::tracing::{
    init_tracing, init_tracing_with_metrics, CorrelationId, ExecutionSpan, LoggingOptions,
    MetricsLayer, TracingError,
};
