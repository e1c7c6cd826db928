use std::time::Duration;

use dispense_types::PlannedOperationStatus;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::metrics::*;

/// How a plan execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every operation reached a terminal status through normal completion
    Completed,
    /// Batch creation or an add call failed; nothing was executed
    SetupFailed,
    /// The completion deadline expired first
    TimedOut,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::Completed => "completed",
            BatchOutcome::SetupFailed => "setup_failed",
            BatchOutcome::TimedOut => "timed_out",
        }
    }
}

/// Why the wells were reloaded from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    SessionOpened,
    BatchCompleted,
    SequentialFinished,
    DeadlineExpired,
    Manual,
}

impl ReloadTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadTrigger::SessionOpened => "session_opened",
            ReloadTrigger::BatchCompleted => "batch_completed",
            ReloadTrigger::SequentialFinished => "sequential_finished",
            ReloadTrigger::DeadlineExpired => "deadline_expired",
            ReloadTrigger::Manual => "manual",
        }
    }
}

/// Metrics collector for the dispense client
#[derive(Debug)]
pub struct MetricsCollector {
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Self {
        let registry = Registry::new();
        Self { registry }
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PLAN METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_operation_planned(&self) {
        OPERATIONS_PLANNED.inc();
    }

    pub fn record_validation_rejected(&self, reason: &str) {
        VALIDATION_REJECTIONS.with_label_values(&[reason]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXECUTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a plan execution starting with `operations` planned operations
    pub fn record_execution_started(&self, strategy: &str, operations: usize) {
        BATCHES_STARTED.inc();
        ACTIVE_EXECUTIONS.inc();
        OPERATIONS_SUBMITTED
            .with_label_values(&[strategy])
            .inc_by(operations as u64);
    }

    /// Record a plan execution returning to idle
    pub fn record_execution_finished(&self, outcome: BatchOutcome, duration: Duration) {
        BATCHES_FINISHED.with_label_values(&[outcome.as_str()]).inc();
        ACTIVE_EXECUTIONS.dec();
        EXECUTION_DURATION.observe(duration.as_millis() as f64);
    }

    /// Record an applied planned operation transition
    pub fn record_operation_status(&self, status: PlannedOperationStatus) {
        let status_str = match status {
            PlannedOperationStatus::Planned => "planned",
            PlannedOperationStatus::Executing => "executing",
            PlannedOperationStatus::Completed => "completed",
            PlannedOperationStatus::Failed => "failed",
            PlannedOperationStatus::TimedOut => "timed_out",
        };

        OPERATION_STATUS_COUNT.with_label_values(&[status_str]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PUSH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_push_event(&self, kind: &str) {
        PUSH_EVENTS.with_label_values(&[kind]).inc();
    }

    pub fn record_push_dropped(&self, reason: &str) {
        PUSH_MESSAGES_DROPPED.with_label_values(&[reason]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BACKEND METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_wells_reload(&self, trigger: ReloadTrigger) {
        WELL_RELOADS.with_label_values(&[trigger.as_str()]).inc();
    }

    pub fn record_error(&self, error_type: &str) {
        ERRORS.with_label_values(&[error_type]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format.
    ///
    /// Includes the default registry and anything registered in the
    /// collector's own registry.
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut metric_families = prometheus::gather();
        metric_families.extend(self.registry.gather());

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        assert!(collector.export_metrics().is_ok());
    }

    #[test]
    fn test_record_plan_metrics() {
        let collector = MetricsCollector::new();

        collector.record_operation_planned();
        collector.record_validation_rejected("exceeds_capacity");

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("dispense_operations_planned_total"));
        assert!(metrics.contains("dispense_validation_rejections_total"));
        assert!(metrics.contains("exceeds_capacity"));
    }

    #[test]
    fn test_record_execution_metrics() {
        let collector = MetricsCollector::new();

        collector.record_execution_started("server_batch", 3);
        collector.record_operation_status(PlannedOperationStatus::Executing);
        collector.record_operation_status(PlannedOperationStatus::TimedOut);
        collector.record_execution_finished(BatchOutcome::TimedOut, Duration::from_secs(300));

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("dispense_operations_submitted_total"));
        assert!(metrics.contains("server_batch"));
        assert!(metrics.contains("dispense_batches_finished_total"));
        assert!(metrics.contains("timed_out"));
        assert!(metrics.contains("dispense_execution_duration_ms"));
    }

    #[test]
    fn test_record_push_and_reload_metrics() {
        let collector = MetricsCollector::new();

        collector.record_push_event("OPERATION_STATUS_CHANGE");
        collector.record_push_dropped("malformed");
        collector.record_wells_reload(ReloadTrigger::BatchCompleted);

        let metrics = collector.export_metrics().unwrap();
        assert!(metrics.contains("dispense_push_events_total"));
        assert!(metrics.contains("dispense_push_messages_dropped_total"));
        assert!(metrics.contains("batch_completed"));
    }
}
