use dispense_metrics::{BatchOutcome, ReloadTrigger};
use dispense_push::PushSubscription;
use dispense_types::{
    BatchStatusPayload, OperationStatus, OperationStatusPayload, PlannedOperationStatus, PushEvent,
    TransitionOutcome,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::SessionCore;

/// Error recorded on an operation the backend failed without a message
pub const DEFAULT_FAILURE_MESSAGE: &str = "Operation failed";

/// Why a push message left the session untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Malformed,
    OtherPlate,
    UnhandledType,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::Malformed => "malformed",
            IgnoreReason::OtherPlate => "other_plate",
            IgnoreReason::UnhandledType => "unhandled_type",
        }
    }
}

/// What one push message did to the session
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    StatusChange {
        /// Planned operation the update was matched to
        operation_id: Option<String>,
        transition: TransitionOutcome,
        /// Volume stored for the well, after clamping to capacity
        well_volume: Option<f64>,
    },
    BatchCompleted {
        /// Whether a running execution was ended by this event
        ended_execution: bool,
        reloaded: bool,
    },
    Ignored(IgnoreReason),
}

/// Applies push events for one plate session
#[derive(Clone)]
pub struct StatusReconciler {
    core: Arc<SessionCore>,
}

impl StatusReconciler {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Decode a raw message body and apply it
    pub async fn handle_message(&self, body: &str) -> ReconcileOutcome {
        match PushEvent::parse(body) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!(
                    plate_id = self.core.plate_id,
                    error = %e,
                    error_type = "push_decode",
                    "dropping malformed push message"
                );
                self.ignore(IgnoreReason::Malformed)
            }
        }
    }

    pub async fn handle_event(&self, event: PushEvent) -> ReconcileOutcome {
        self.core.metrics.record_push_event(event.kind());

        if let Some(plate_id) = event.plate_id() {
            if plate_id != self.core.plate_id {
                return self.ignore(IgnoreReason::OtherPlate);
            }
        }

        match event {
            PushEvent::OperationStatusChange(payload) => self.operation_status_changed(payload),
            PushEvent::BatchExecutionCompleted(payload) => self.batch_completed(payload).await,
            PushEvent::BatchExecutionStarted(payload) => {
                debug!(plate_id = payload.plate_id, batch_id = ?payload.id, "batch execution started");
                self.ignore(IgnoreReason::UnhandledType)
            }
            PushEvent::Other { kind } => {
                debug!(kind = %kind, "unhandled push event type");
                self.ignore(IgnoreReason::UnhandledType)
            }
        }
    }

    fn ignore(&self, reason: IgnoreReason) -> ReconcileOutcome {
        self.core.metrics.record_push_dropped(reason.as_str());
        ReconcileOutcome::Ignored(reason)
    }

    fn operation_status_changed(&self, payload: OperationStatusPayload) -> ReconcileOutcome {
        let target = match payload.status {
            OperationStatus::Completed => Some(PlannedOperationStatus::Completed),
            OperationStatus::Failed => Some(PlannedOperationStatus::Failed),
            _ => None,
        };

        let (operation_id, transition, snapshot, well_volume) = {
            let mut state = self.core.write();

            let operation_id = state
                .plan
                .find_for_update(payload.id, &payload.well_position, payload.reagent_id)
                .map(|op| op.id.clone());

            let transition = match (&operation_id, target) {
                (Some(id), Some(status)) => {
                    let error = (status == PlannedOperationStatus::Failed).then(|| {
                        payload
                            .error_message
                            .clone()
                            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
                    });
                    state.plan.apply_status(id, status, error)
                }
                _ => TransitionOutcome::Unchanged,
            };

            let snapshot = match (&operation_id, transition) {
                (Some(id), TransitionOutcome::Applied) => state.plan.get(id).cloned(),
                _ => None,
            };

            let well_volume = payload
                .well_volume
                .and_then(|volume| state.apply_well_volume(&payload.well_position, volume));

            (operation_id, transition, snapshot, well_volume)
        };

        if let Some(snapshot) = &snapshot {
            self.core.notify(snapshot);
        }

        debug!(
            plate_id = payload.plate_id,
            server_id = ?payload.id,
            well = %payload.well_position,
            status = %payload.status,
            operation = ?operation_id,
            transition = ?transition,
            "operation status reconciled"
        );

        ReconcileOutcome::StatusChange {
            operation_id,
            transition,
            well_volume,
        }
    }

    async fn batch_completed(&self, payload: BatchStatusPayload) -> ReconcileOutcome {
        let started = self.core.write().end_server_batch(payload.id);
        let ended_execution = started.is_some();
        if let Some(started) = started {
            self.core.disarm_deadline();
            self.core.record_finished(started, BatchOutcome::Completed);
        }

        info!(
            plate_id = payload.plate_id,
            batch_id = ?payload.id,
            status = %payload.status,
            ended_execution,
            "batch execution completed"
        );

        let reloaded = match self.core.reload_wells(ReloadTrigger::BatchCompleted).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    plate_id = self.core.plate_id,
                    error = %e,
                    error_type = "wells_reload",
                    "failed to reload wells after batch completion"
                );
                false
            }
        };

        ReconcileOutcome::BatchCompleted {
            ended_execution,
            reloaded,
        }
    }
}

/// Feed every message of `subscription` to `reconciler` until the channel closes
pub(crate) fn spawn_listener(
    reconciler: StatusReconciler,
    mut subscription: PushSubscription,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(destination = subscription.destination(), "status listener started");
        while let Some(body) = subscription.next().await {
            reconciler.handle_message(&body).await;
        }
        warn!(
            destination = subscription.destination(),
            "status subscription closed"
        );
    })
}
