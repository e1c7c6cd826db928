use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // PLAN METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Operations accepted into a plan
    pub static ref OPERATIONS_PLANNED: IntCounter = register_int_counter!(
        "dispense_operations_planned_total",
        "Total number of operations added to a plan"
    )
    .unwrap();

    /// Operations refused by the planning validator
    pub static ref VALIDATION_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "dispense_validation_rejections_total",
        "Planned operations rejected before reaching the plan",
        &["reason"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // EXECUTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Operations handed to the backend, by submission strategy
    pub static ref OPERATIONS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "dispense_operations_submitted_total",
        "Total operations submitted to the backend",
        &["strategy"]
    )
    .unwrap();

    /// Planned operation transitions by target status
    pub static ref OPERATION_STATUS_COUNT: IntCounterVec = register_int_counter_vec!(
        "dispense_operation_status_total",
        "Planned operation transitions by status",
        &["status"]
    )
    .unwrap();

    /// Executions started
    pub static ref BATCHES_STARTED: IntCounter = register_int_counter!(
        "dispense_batches_started_total",
        "Total number of plan executions started"
    )
    .unwrap();

    /// Executions finished, by outcome
    pub static ref BATCHES_FINISHED: IntCounterVec = register_int_counter_vec!(
        "dispense_batches_finished_total",
        "Total number of plan executions finished",
        &["outcome"]
    )
    .unwrap();

    /// Executions currently in flight
    pub static ref ACTIVE_EXECUTIONS: IntGauge = register_int_gauge!(
        "dispense_executions_active",
        "Number of plate sessions currently executing"
    )
    .unwrap();

    /// Execution duration histogram (in milliseconds)
    pub static ref EXECUTION_DURATION: Histogram = register_histogram!(
        "dispense_execution_duration_ms",
        "Time from execute to the session returning idle, in milliseconds",
        vec![100.0, 500.0, 1000.0, 5000.0, 30000.0, 120000.0, 300000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // PUSH METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Decoded push events by envelope type
    pub static ref PUSH_EVENTS: IntCounterVec = register_int_counter_vec!(
        "dispense_push_events_total",
        "Push events received by type",
        &["type"]
    )
    .unwrap();

    /// Push messages dropped without effect
    pub static ref PUSH_MESSAGES_DROPPED: IntCounterVec = register_int_counter_vec!(
        "dispense_push_messages_dropped_total",
        "Push messages dropped by the status listener",
        &["reason"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // BACKEND METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Authoritative well reloads by trigger
    pub static ref WELL_RELOADS: IntCounterVec = register_int_counter_vec!(
        "dispense_well_reloads_total",
        "Full well reloads from the backend",
        &["trigger"]
    )
    .unwrap();

    /// Errors observed in logs or returned by the backend
    pub static ref ERRORS: IntCounterVec = register_int_counter_vec!(
        "dispense_errors_total",
        "Errors by type",
        &["error_type"]
    )
    .unwrap();
}
