use dispense_metrics::{BatchOutcome, ReloadTrigger};
use dispense_types::{PlannedOperation, PlannedOperationStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::orchestrator::SessionCore;

/// Result of expiring an execution that never reported completion
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredExecution {
    pub generation: u64,
    /// Operations moved from `Executing` to `TimedOut`
    pub timed_out: Vec<String>,
}

/// Spawn the completion deadline for one accepted server batch.
///
/// The task is a no-op if the execution it was armed for has already ended.
pub(crate) fn arm_deadline(
    core: Arc<SessionCore>,
    generation: u64,
    timeout: Duration,
) -> JoinHandle<()> {
    info!(
        plate_id = core.plate_id,
        generation,
        timeout_secs = timeout.as_secs(),
        "completion deadline armed"
    );
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(expired) = expire_execution(&core, generation, timeout).await {
            warn!(
                plate_id = core.plate_id,
                generation = expired.generation,
                timed_out = expired.timed_out.len(),
                error_type = "completion_timeout",
                "no completion event before deadline"
            );
        }
    })
}

/// Time out every operation still executing, go idle and reload wells once
pub(crate) async fn expire_execution(
    core: &SessionCore,
    generation: u64,
    timeout: Duration,
) -> Option<ExpiredExecution> {
    let message = format!(
        "No completion received within {}s; check the instrument before retrying",
        timeout.as_secs()
    );

    let (started, snapshots) = {
        let mut state = core.write();
        if !state.is_current(generation) {
            return None;
        }

        let executing = state
            .plan
            .ids_with_status(PlannedOperationStatus::Executing);
        let mut snapshots: Vec<PlannedOperation> = Vec::with_capacity(executing.len());
        for id in &executing {
            let outcome = state.plan.apply_status(
                id,
                PlannedOperationStatus::TimedOut,
                Some(message.clone()),
            );
            if outcome.is_applied() {
                if let Some(op) = state.plan.get(id) {
                    snapshots.push(op.clone());
                }
            }
        }
        state.last_error = Some(message.clone());
        (state.end_execution(generation), snapshots)
    };

    for snapshot in &snapshots {
        core.notify(snapshot);
    }
    if let Some(started) = started {
        core.record_finished(started, BatchOutcome::TimedOut);
    }
    core.reload_wells_logged(ReloadTrigger::DeadlineExpired).await;

    Some(ExpiredExecution {
        generation,
        timed_out: snapshots.into_iter().map(|op| op.id).collect(),
    })
}
