use dispense_client::{Backend, ClientError};
use dispense_metrics::{BatchOutcome, ExecutionSpan, MetricsCollector, ReloadTrigger};
use dispense_push::{PushError, PushSubscriber};
use dispense_types::{
    DispenseOperation, DispenseRequest, PlannedOperation, Plate, Reagent, Well,
    DISPENSE_STATUS_TOPIC,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use crate::reconciler::{spawn_listener, StatusReconciler};
use crate::recovery::arm_deadline;
use crate::store::{Confirmation, OperationPlan};
use crate::submission::{
    DispenseSubmitter, OperationObserver, SubmissionError, SubmissionStrategy,
    DEFAULT_SETTLE_DELAY,
};
use crate::validator::{PlanValidator, ValidationError, DEFAULT_MIN_VOLUME};

/// Default wait for `BATCH_EXECUTION_COMPLETED` after a batch was accepted
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for a plate session
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Strategy used by `execute`; `Single` is reserved for `dispense_now`
    pub strategy: SubmissionStrategy,

    /// Pause between sequential submissions
    pub settle_delay: Duration,

    /// How long an accepted server batch may stay executing
    pub completion_timeout: Duration,

    /// Smallest volume accepted into a plan
    pub min_volume: f64,

    /// Push destination carrying status envelopes
    pub status_topic: String,
}

impl OrchestratorConfig {
    pub fn with_strategy(mut self, strategy: SubmissionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_min_volume(mut self, min_volume: f64) -> Self {
        self.min_volume = min_volume;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: SubmissionStrategy::ServerBatch,
            settle_delay: DEFAULT_SETTLE_DELAY,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            min_volume: DEFAULT_MIN_VOLUME,
            status_topic: DISPENSE_STATUS_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("an execution is already in progress")]
    ExecutionInProgress,

    #[error("plan cannot be executed: {reason}")]
    NotExecutable { reason: String },

    #[error("backend request failed: {0}")]
    Backend(#[from] ClientError),

    #[error("push subscription failed: {0}")]
    Push(#[from] PushError),

    #[error(transparent)]
    Dispense(#[from] SubmissionError),
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION STATE
// ═══════════════════════════════════════════════════════════════════════════

/// Whether the session is driving an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Idle,
    Executing {
        /// Distinguishes consecutive executions of the same session
        generation: u64,
        strategy: SubmissionStrategy,
        batch_id: Option<i64>,
    },
}

impl ExecutionPhase {
    pub fn is_executing(&self) -> bool {
        matches!(self, ExecutionPhase::Executing { .. })
    }
}

/// Everything a plate view shows
#[derive(Debug, Clone)]
pub struct SessionState {
    pub plate: Plate,
    pub wells: Vec<Well>,
    pub reagents: Vec<Reagent>,
    pub plan: OperationPlan,
    pub phase: ExecutionPhase,
    /// Operator-facing message of the last failed execution
    pub last_error: Option<String>,
    generation: u64,
    started_at: Option<Instant>,
}

impl SessionState {
    fn new(plate: Plate, wells: Vec<Well>, reagents: Vec<Reagent>) -> Self {
        Self {
            plate,
            wells,
            reagents,
            plan: OperationPlan::new(),
            phase: ExecutionPhase::Idle,
            last_error: None,
            generation: 0,
            started_at: None,
        }
    }

    pub fn well(&self, position: &str) -> Option<&Well> {
        self.wells.iter().find(|w| w.position == position)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        matches!(self.phase, ExecutionPhase::Executing { generation: g, .. } if g == generation)
    }

    /// Return to idle if `generation` is the running execution
    pub(crate) fn end_execution(&mut self, generation: u64) -> Option<Instant> {
        if !self.is_current(generation) {
            return None;
        }
        self.phase = ExecutionPhase::Idle;
        Some(self.started_at.take().unwrap_or_else(Instant::now))
    }

    /// Return to idle if a server batch is running and `reported` names it.
    ///
    /// Sequential runs end only when their own submission loop finishes. Before
    /// the batch id is known any report for the plate is accepted.
    pub(crate) fn end_server_batch(&mut self, reported: Option<i64>) -> Option<Instant> {
        match self.phase {
            ExecutionPhase::Executing {
                generation,
                strategy: SubmissionStrategy::ServerBatch,
                batch_id,
            } if batch_id.is_none() || batch_id == reported => self.end_execution(generation),
            _ => None,
        }
    }

    /// Store a pushed volume for one well, clamped to its capacity
    pub(crate) fn apply_well_volume(&mut self, position: &str, volume: f64) -> Option<f64> {
        self.wells
            .iter_mut()
            .find(|w| w.position == position)
            .map(|w| w.apply_volume(volume))
    }
}

/// State and collaborators shared by the session, its listener and its deadline
pub(crate) struct SessionCore {
    pub(crate) plate_id: i64,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) metrics: Arc<MetricsCollector>,
    observer: Option<OperationObserver>,
    state: RwLock<SessionState>,
    deadline: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCore {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report an applied transition to metrics and the embedding shell
    pub(crate) fn notify(&self, snapshot: &PlannedOperation) {
        self.metrics.record_operation_status(snapshot.status);
        if let Some(observer) = &self.observer {
            observer(snapshot);
        }
    }

    /// Fold a submitter snapshot into the plan, then notify
    fn observe(&self, snapshot: &PlannedOperation) {
        let outcome = self.write().plan.sync(snapshot);
        if outcome.is_applied() {
            self.notify(snapshot);
        } else {
            debug!(
                operation = %snapshot.id,
                status = %snapshot.status,
                outcome = ?outcome,
                "submitter update already reflected"
            );
        }
    }

    pub(crate) fn record_finished(&self, started_at: Instant, outcome: BatchOutcome) {
        self.metrics
            .record_execution_finished(outcome, started_at.elapsed());
        info!(plate_id = self.plate_id, outcome = outcome.as_str(), "execution finished");
    }

    pub(crate) fn disarm_deadline(&self) {
        let handle = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!(plate_id = self.plate_id, "completion deadline disarmed");
        }
    }

    fn set_deadline(&self, handle: JoinHandle<()>) {
        let previous = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Replace the cached wells with the backend's
    pub(crate) async fn reload_wells(&self, trigger: ReloadTrigger) -> Result<(), ClientError> {
        let wells = self.backend.wells(self.plate_id).await?;
        debug!(plate_id = self.plate_id, wells = wells.len(), trigger = trigger.as_str(), "wells reloaded");
        self.write().wells = wells;
        self.metrics.record_wells_reload(trigger);
        Ok(())
    }

    /// Reload, logging instead of failing; used where no caller can act on the error
    pub(crate) async fn reload_wells_logged(&self, trigger: ReloadTrigger) {
        if let Err(e) = self.reload_wells(trigger).await {
            warn!(
                plate_id = self.plate_id,
                trigger = trigger.as_str(),
                error = %e,
                error_type = "wells_reload",
                "failed to reload wells"
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EXECUTION REPORT
// ═══════════════════════════════════════════════════════════════════════════

/// What `execute` did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub strategy: SubmissionStrategy,
    /// Server batch id, once one was created
    pub batch_id: Option<i64>,
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    /// The session stays executing until the backend reports completion
    pub awaiting_completion: bool,
    pub error: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════
// PLATE SESSION
// ═══════════════════════════════════════════════════════════════════════════

/// Builder for [`PlateSession`]
pub struct PlateSessionBuilder {
    backend: Arc<dyn Backend>,
    plate_id: i64,
    config: OrchestratorConfig,
    metrics: Option<Arc<MetricsCollector>>,
    observer: Option<OperationObserver>,
    push: Option<Arc<dyn PushSubscriber>>,
}

impl PlateSessionBuilder {
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Observer called after every applied operation transition
    pub fn with_observer(mut self, observer: OperationObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Subscribe to the status topic as part of `open`
    pub fn with_push(mut self, push: Arc<dyn PushSubscriber>) -> Self {
        self.push = Some(push);
        self
    }

    /// Load the plate, its wells and the reagent list, then start listening
    pub async fn open(self) -> Result<PlateSession, OrchestratorError> {
        let plate_id = self.plate_id;
        let plate = self.backend.plate(plate_id).await?;
        let wells = self.backend.wells(plate_id).await?;
        let reagents = self.backend.reagents().await?;

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new()));
        metrics.record_wells_reload(ReloadTrigger::SessionOpened);

        info!(
            plate_id,
            barcode = %plate.barcode,
            wells = wells.len(),
            reagents = reagents.len(),
            strategy = %self.config.strategy,
            "plate session opened"
        );

        let core = Arc::new(SessionCore {
            plate_id,
            backend: self.backend,
            config: self.config,
            metrics,
            observer: self.observer,
            state: RwLock::new(SessionState::new(plate, wells, reagents)),
            deadline: Mutex::new(None),
        });

        let session = PlateSession {
            core,
            listener: Mutex::new(None),
        };
        if let Some(push) = self.push {
            session.listen(push.as_ref()).await?;
        }
        Ok(session)
    }
}

/// One operator visit to a plate view.
///
/// Owns the plan, the cached plate data and the execution state. The plan
/// lives exactly as long as the session; `close` discards it.
pub struct PlateSession {
    core: Arc<SessionCore>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PlateSession {
    pub fn builder(backend: Arc<dyn Backend>, plate_id: i64) -> PlateSessionBuilder {
        PlateSessionBuilder {
            backend,
            plate_id,
            config: OrchestratorConfig::default(),
            metrics: None,
            observer: None,
            push: None,
        }
    }

    /// Open with the default configuration and no push channel
    pub async fn open(backend: Arc<dyn Backend>, plate_id: i64) -> Result<Self, OrchestratorError> {
        Self::builder(backend, plate_id).open().await
    }

    /// Subscribe to the status topic and reconcile events in a background task.
    ///
    /// A previous listener is replaced.
    pub async fn listen(&self, push: &dyn PushSubscriber) -> Result<(), OrchestratorError> {
        let subscription = push.subscribe(&self.core.config.status_topic).await?;
        let handle = spawn_listener(self.reconciler(), subscription);

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    /// Reconciler bound to this session, for feeding events directly
    pub fn reconciler(&self) -> StatusReconciler {
        StatusReconciler::new(self.core.clone())
    }

    pub fn plate_id(&self) -> i64 {
        self.core.plate_id
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.core.config
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.core.read().clone()
    }

    pub fn plate(&self) -> Plate {
        self.core.read().plate.clone()
    }

    pub fn wells(&self) -> Vec<Well> {
        self.core.read().wells.clone()
    }

    pub fn well(&self, position: &str) -> Option<Well> {
        self.core.read().well(position).cloned()
    }

    pub fn reagents(&self) -> Vec<Reagent> {
        self.core.read().reagents.clone()
    }

    pub fn plan(&self) -> OperationPlan {
        self.core.read().plan.clone()
    }

    pub fn operations(&self) -> Vec<PlannedOperation> {
        self.core.read().plan.operations().to_vec()
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.core.read().phase
    }

    pub fn is_executing(&self) -> bool {
        self.core.read().phase.is_executing()
    }

    pub fn last_error(&self) -> Option<String> {
        self.core.read().last_error.clone()
    }

    pub fn can_execute(&self) -> bool {
        let state = self.core.read();
        state.plan.can_execute(state.phase.is_executing())
    }

    pub fn status_message(&self) -> String {
        let state = self.core.read();
        state.plan.status_message(state.phase.is_executing())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PLANNING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Validate and append a planned operation
    pub fn plan_operation(
        &self,
        well_position: &str,
        reagent_id: Option<i64>,
        volume: f64,
    ) -> Result<PlannedOperation, OrchestratorError> {
        let validator = PlanValidator::new(self.core.config.min_volume);
        let mut state = self.core.write();
        if state.phase.is_executing() {
            return Err(OrchestratorError::ExecutionInProgress);
        }

        let validated = validator.validate(
            &state.wells,
            &state.reagents,
            well_position,
            reagent_id,
            volume,
        );
        let target = match validated {
            Ok(target) => target,
            Err(e) => {
                drop(state);
                debug!(well = well_position, reason = e.reason(), "planned operation rejected");
                self.core.metrics.record_validation_rejected(e.reason());
                return Err(e.into());
            }
        };

        let operation = PlannedOperation::new(well_position, target.reagent.id.unwrap_or_default(), volume)
            .with_well_id(target.well.id)
            .with_reagent_name(Some(target.reagent.name.clone()));
        state.plan.add(operation.clone());
        drop(state);

        self.core.metrics.record_operation_planned();
        info!(
            plate_id = self.core.plate_id,
            operation = %operation.id,
            well = %operation.well_position,
            reagent_id = operation.reagent_id,
            volume,
            "operation planned"
        );
        Ok(operation)
    }

    pub fn remove_operation(&self, id: &str) -> Result<Option<PlannedOperation>, OrchestratorError> {
        let mut state = self.core.write();
        if state.phase.is_executing() {
            return Err(OrchestratorError::ExecutionInProgress);
        }
        let removed = state.plan.remove(id);
        if removed.is_some() {
            debug!(plate_id = self.core.plate_id, operation = id, "operation removed");
        }
        Ok(removed)
    }

    pub fn clear_plan(&self, confirmation: &dyn Confirmation) -> Result<bool, OrchestratorError> {
        let mut state = self.core.write();
        if state.phase.is_executing() {
            return Err(OrchestratorError::ExecutionInProgress);
        }
        let cleared = state.plan.clear(confirmation);
        if cleared {
            info!(plate_id = self.core.plate_id, "plan cleared");
        }
        Ok(cleared)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Dispense one operation immediately, outside the plan
    pub async fn dispense_now(
        &self,
        well_position: &str,
        reagent_id: Option<i64>,
        volume: f64,
    ) -> Result<DispenseOperation, OrchestratorError> {
        let request = {
            let state = self.core.read();
            if state.phase.is_executing() {
                return Err(OrchestratorError::ExecutionInProgress);
            }
            let target = PlanValidator::new(self.core.config.min_volume).validate(
                &state.wells,
                &state.reagents,
                well_position,
                reagent_id,
                volume,
            )?;
            DispenseRequest {
                plate_barcode: state.plate.barcode.clone(),
                well_position: well_position.to_string(),
                reagent_id: target.reagent.id.unwrap_or_default(),
                volume,
            }
        };

        let executed = self.submitter().submit_single(&request).await?;
        self.core.reload_wells_logged(ReloadTrigger::Manual).await;
        Ok(executed)
    }

    /// Submit every planned operation with the configured strategy.
    ///
    /// Returns `Ok(None)` when the operator declines. Backend failures do not
    /// surface as errors; they become operation statuses and `last_error`.
    pub async fn execute(
        &self,
        confirmation: &dyn Confirmation,
    ) -> Result<Option<ExecutionReport>, OrchestratorError> {
        let count = {
            let state = self.core.read();
            check_executable(&state)?;
            state.plan.total_operations()
        };

        if !confirmation.confirm(&format!("Execute {count} dispense operation(s)?")) {
            debug!(plate_id = self.core.plate_id, "execution declined");
            return Ok(None);
        }

        let strategy = match self.core.config.strategy {
            SubmissionStrategy::Single => SubmissionStrategy::Sequential,
            other => other,
        };

        let (generation, barcode, operations) = {
            let mut state = self.core.write();
            check_executable(&state)?;
            state.generation += 1;
            let generation = state.generation;
            state.phase = ExecutionPhase::Executing {
                generation,
                strategy,
                batch_id: None,
            };
            state.started_at = Some(Instant::now());
            state.last_error = None;
            (
                generation,
                state.plate.barcode.clone(),
                state.plan.operations().to_vec(),
            )
        };

        let submitted = operations.len();
        self.core
            .metrics
            .record_execution_started(strategy.as_str(), submitted);
        let span = ExecutionSpan::new(self.core.plate_id, strategy.as_str());
        info!(
            plate_id = self.core.plate_id,
            correlation_id = %span.correlation_id,
            operations = submitted,
            strategy = %strategy,
            "execution started"
        );

        let report = match strategy {
            SubmissionStrategy::ServerBatch => {
                self.execute_server_batch(generation, &barcode, operations)
                    .instrument(span.span())
                    .await
            }
            _ => {
                self.execute_sequential(generation, &barcode, operations)
                    .instrument(span.span())
                    .await
            }
        };
        Ok(Some(report))
    }

    async fn execute_sequential(
        &self,
        generation: u64,
        barcode: &str,
        operations: Vec<PlannedOperation>,
    ) -> ExecutionReport {
        let core = self.core.clone();
        let observer = move |op: &PlannedOperation| core.observe(op);

        let report = self
            .submitter()
            .submit_sequential(barcode, operations, &observer)
            .await;

        let started = self.core.write().end_execution(generation);
        if let Some(started) = started {
            self.core.record_finished(started, BatchOutcome::Completed);
        }
        self.core
            .reload_wells_logged(ReloadTrigger::SequentialFinished)
            .await;

        ExecutionReport {
            strategy: SubmissionStrategy::Sequential,
            batch_id: None,
            submitted: report.operations.len(),
            completed: report.completed,
            failed: report.failed,
            awaiting_completion: false,
            error: None,
        }
    }

    async fn execute_server_batch(
        &self,
        generation: u64,
        barcode: &str,
        operations: Vec<PlannedOperation>,
    ) -> ExecutionReport {
        let core = self.core.clone();
        let observer = move |op: &PlannedOperation| core.observe(op);
        let submitted = operations.len();

        match self
            .submitter()
            .submit_server_batch(barcode, operations, &observer)
            .await
        {
            Ok(accepted) => {
                let batch_id = accepted.batch.id;
                let still_running = {
                    let mut state = self.core.write();
                    if let ExecutionPhase::Executing {
                        generation: g,
                        batch_id: id,
                        ..
                    } = &mut state.phase
                    {
                        if *g == generation {
                            *id = Some(batch_id);
                        }
                    }
                    state.is_current(generation)
                };

                // Completion may already have been pushed while execute was in flight
                if still_running {
                    let handle = arm_deadline(
                        self.core.clone(),
                        generation,
                        self.core.config.completion_timeout,
                    );
                    self.core.set_deadline(handle);
                }

                ExecutionReport {
                    strategy: SubmissionStrategy::ServerBatch,
                    batch_id: Some(batch_id),
                    submitted,
                    completed: 0,
                    failed: 0,
                    awaiting_completion: still_running,
                    error: None,
                }
            }
            Err(failure) => {
                let message = format!(
                    "Batch execution encountered an error: {}",
                    failure.error.operator_message()
                );
                let started = {
                    let mut state = self.core.write();
                    state.last_error = Some(message.clone());
                    state.end_execution(generation)
                };
                if let Some(started) = started {
                    self.core.record_finished(started, BatchOutcome::SetupFailed);
                }

                ExecutionReport {
                    strategy: SubmissionStrategy::ServerBatch,
                    batch_id: failure.batch_id,
                    submitted,
                    completed: 0,
                    failed: failure.operations.len(),
                    awaiting_completion: false,
                    error: Some(message),
                }
            }
        }
    }

    /// Replace the cached wells with the backend's
    pub async fn reload_wells(&self) -> Result<(), OrchestratorError> {
        self.core.reload_wells(ReloadTrigger::Manual).await?;
        Ok(())
    }

    /// Leave the plate view: stop background tasks and discard the plan
    pub fn close(self) {
        let discarded = self.core.read().plan.total_operations();
        info!(plate_id = self.core.plate_id, discarded, "plate session closed");
    }

    fn submitter(&self) -> DispenseSubmitter<dyn Backend> {
        DispenseSubmitter::new(self.core.backend.clone())
            .with_settle_delay(self.core.config.settle_delay)
    }

    fn shutdown(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }
        self.core.disarm_deadline();
    }
}

impl Drop for PlateSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_executable(state: &SessionState) -> Result<(), OrchestratorError> {
    if state.phase.is_executing() {
        return Err(OrchestratorError::ExecutionInProgress);
    }
    if state.plan.is_empty() {
        return Err(OrchestratorError::NotExecutable {
            reason: "no operations planned".to_string(),
        });
    }
    if !state.plan.can_execute(false) {
        return Err(OrchestratorError::NotExecutable {
            reason: "every operation must still be planned".to_string(),
        });
    }
    Ok(())
}
