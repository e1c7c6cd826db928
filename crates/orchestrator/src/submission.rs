use dispense_client::{ClientError, DispenseApi};
use dispense_types::{
    AddOperationRequest, CreateBatchRequest, DispenseBatch, DispenseOperation, DispenseRequest,
    OperationStatus, PlannedOperation, PlannedOperationStatus,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Callback invoked with a snapshot after every per-operation transition
pub type OperationObserver = Arc<dyn Fn(&PlannedOperation) + Send + Sync>;

/// Observer borrowed for the duration of one submission
pub type ObserverRef<'a> = &'a (dyn Fn(&PlannedOperation) + Send + Sync);

/// Pause between consecutive sequential submissions
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How planned operations reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStrategy {
    /// One operation, created and executed immediately
    Single,
    /// One create/execute round trip per operation, in order
    Sequential,
    /// Create a server batch, add every operation, execute once
    ServerBatch,
}

impl SubmissionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStrategy::Single => "single",
            SubmissionStrategy::Sequential => "sequential",
            SubmissionStrategy::ServerBatch => "server_batch",
        }
    }
}

impl fmt::Display for SubmissionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("failed to create operation: {0}")]
    Create(#[source] ClientError),

    #[error("failed to execute operation: {0}")]
    Execute(#[source] ClientError),

    #[error("operation {operation_id} failed: {message}")]
    OperationFailed { operation_id: i64, message: String },

    #[error("failed to create batch: {0}")]
    CreateBatch(#[source] ClientError),

    #[error("failed to add operation {index} to batch {batch_id}: {source}")]
    AddToBatch {
        batch_id: i64,
        index: usize,
        #[source]
        source: ClientError,
    },

    #[error("failed to execute batch {batch_id}: {source}")]
    ExecuteBatch {
        batch_id: i64,
        #[source]
        source: ClientError,
    },
}

impl SubmissionError {
    /// Message attached to the affected planned operations
    pub fn operator_message(&self) -> String {
        match self {
            SubmissionError::Create(e)
            | SubmissionError::Execute(e)
            | SubmissionError::CreateBatch(e)
            | SubmissionError::AddToBatch { source: e, .. }
            | SubmissionError::ExecuteBatch { source: e, .. } => e.operator_message(),
            SubmissionError::OperationFailed { message, .. } => message.clone(),
        }
    }
}

/// Result of a sequential submission
#[derive(Debug, Clone)]
pub struct SequentialReport {
    pub operations: Vec<PlannedOperation>,
    pub completed: usize,
    pub failed: usize,
}

/// Server batch accepted for execution; completion arrives as push events
#[derive(Debug, Clone)]
pub struct AcceptedBatch {
    pub batch: DispenseBatch,
    pub operations: Vec<PlannedOperation>,
}

/// Server batch that never started; every operation ended `Failed`
#[derive(Debug)]
pub struct BatchFailure {
    pub error: SubmissionError,
    pub batch_id: Option<i64>,
    pub operations: Vec<PlannedOperation>,
}

/// Submits planned operations to the backend.
///
/// Dependent calls are awaited one after another; nothing is retried.
pub struct DispenseSubmitter<A: DispenseApi + ?Sized> {
    api: Arc<A>,
    settle_delay: Duration,
}

impl<A: DispenseApi + ?Sized> Clone for DispenseSubmitter<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            settle_delay: self.settle_delay,
        }
    }
}

impl<A: DispenseApi + ?Sized> DispenseSubmitter<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Create then execute one operation.
    ///
    /// An operation the backend reports as `FAILED` is an error carrying its
    /// `errorMessage`.
    pub async fn submit_single(
        &self,
        request: &DispenseRequest,
    ) -> Result<DispenseOperation, SubmissionError> {
        let created = self
            .api
            .create_operation(request)
            .await
            .map_err(SubmissionError::Create)?;

        let Some(operation_id) = created.id else {
            return Err(SubmissionError::Create(ClientError::Decode(
                "created operation has no id".to_string(),
            )));
        };
        debug!(operation_id, well = %request.well_position, "operation created");

        let executed = self
            .api
            .execute_operation(operation_id)
            .await
            .map_err(SubmissionError::Execute)?;

        if executed.status == OperationStatus::Failed {
            return Err(SubmissionError::OperationFailed {
                operation_id,
                message: executed
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Operation failed".to_string()),
            });
        }

        info!(
            operation_id,
            well = %request.well_position,
            volume = request.volume,
            "operation executed"
        );
        Ok(executed)
    }

    /// Submit each operation in order with its own create/execute calls.
    ///
    /// Each operation is marked `Executing` right before its submission.
    /// A failure marks that operation `Failed` and the loop continues.
    pub async fn submit_sequential(
        &self,
        plate_barcode: &str,
        mut operations: Vec<PlannedOperation>,
        observer: ObserverRef<'_>,
    ) -> SequentialReport {
        let total = operations.len();
        let mut completed = 0;
        let mut failed = 0;

        for (index, op) in operations.iter_mut().enumerate() {
            op.transition(PlannedOperationStatus::Executing, None);
            observer(op);

            let request = DispenseRequest {
                plate_barcode: plate_barcode.to_string(),
                well_position: op.well_position.clone(),
                reagent_id: op.reagent_id,
                volume: op.volume,
            };

            match self.submit_single(&request).await {
                Ok(executed) => {
                    op.server_operation_id = executed.id;
                    op.transition(PlannedOperationStatus::Completed, None);
                    completed += 1;
                    observer(op);

                    if index + 1 < total {
                        tokio::time::sleep(self.settle_delay).await;
                    }
                }
                Err(e) => {
                    warn!(
                        operation = %op.id,
                        well = %op.well_position,
                        error = %e,
                        error_type = "operation_submission",
                        "sequential submission failed, continuing"
                    );
                    op.transition(PlannedOperationStatus::Failed, Some(e.operator_message()));
                    failed += 1;
                    observer(op);
                }
            }
        }

        info!(total, completed, failed, "sequential submission finished");
        SequentialReport {
            operations,
            completed,
            failed,
        }
    }

    /// Create a server batch, add every operation in order, then execute it.
    ///
    /// All operations are marked `Executing` only after every add succeeded.
    /// If creation or any add fails, execute is never called.
    pub async fn submit_server_batch(
        &self,
        plate_barcode: &str,
        mut operations: Vec<PlannedOperation>,
        observer: ObserverRef<'_>,
    ) -> Result<AcceptedBatch, BatchFailure> {
        let batch = match self
            .api
            .create_batch(&CreateBatchRequest {
                plate_barcode: plate_barcode.to_string(),
            })
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                return Err(fail_all(
                    SubmissionError::CreateBatch(e),
                    None,
                    operations,
                    observer,
                ))
            }
        };
        let batch_id = batch.id;
        info!(batch_id, plate = %plate_barcode, operations = operations.len(), "batch created");

        for index in 0..operations.len() {
            let request = AddOperationRequest {
                well_position: operations[index].well_position.clone(),
                reagent_id: operations[index].reagent_id,
                volume: operations[index].volume,
            };

            match self.api.add_operation_to_batch(batch_id, &request).await {
                Ok(updated) => {
                    let claimed: Vec<i64> = operations[..index]
                        .iter()
                        .filter_map(|op| op.server_operation_id)
                        .collect();
                    operations[index].server_operation_id = updated
                        .unclaimed_operation(&request.well_position, request.reagent_id, &claimed)
                        .and_then(|op| op.id);
                    debug!(
                        batch_id,
                        index,
                        server_operation_id = ?operations[index].server_operation_id,
                        "operation added to batch"
                    );
                }
                Err(source) => {
                    let error = SubmissionError::AddToBatch {
                        batch_id,
                        index,
                        source,
                    };
                    return Err(fail_all(error, Some(batch_id), operations, observer));
                }
            }
        }

        for op in operations.iter_mut() {
            op.transition(PlannedOperationStatus::Executing, None);
            observer(op);
        }

        match self.api.execute_batch(batch_id).await {
            Ok(accepted) => {
                info!(batch_id, status = %accepted.status, "batch accepted for execution");
                Ok(AcceptedBatch {
                    batch: accepted,
                    operations,
                })
            }
            Err(source) => Err(fail_all(
                SubmissionError::ExecuteBatch { batch_id, source },
                Some(batch_id),
                operations,
                observer,
            )),
        }
    }
}

/// Mark every non-terminal operation `Failed` with the error's message
fn fail_all(
    error: SubmissionError,
    batch_id: Option<i64>,
    mut operations: Vec<PlannedOperation>,
    observer: ObserverRef<'_>,
) -> BatchFailure {
    warn!(
        batch_id = ?batch_id,
        error = %error,
        error_type = "batch_setup",
        "batch did not start"
    );

    let message = error.operator_message();
    for op in operations.iter_mut().filter(|op| !op.status.is_terminal()) {
        op.fail(message.clone());
        observer(op);
    }

    BatchFailure {
        error,
        batch_id,
        operations,
    }
}
