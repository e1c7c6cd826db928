use async_trait::async_trait;
use chrono::Utc;
use dispense_types::{
    AddOperationRequest, BatchStatus, CreateBatchRequest, DispenseBatch, DispenseOperation,
    DispenseRequest, OperationStatus, Plate, Reagent, Well,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{ClientError, DispenseApi, PlateApi, ReagentApi};

// ═══════════════════════════════════════════════════════════════════════════
// CALL LOG
// ═══════════════════════════════════════════════════════════════════════════

/// A request observed by [`MockBackend`], in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateOperation { well_position: String, reagent_id: i64 },
    ExecuteOperation { id: i64 },
    CreateBatch { plate_barcode: String },
    AddOperation { batch_id: i64, well_position: String, reagent_id: i64 },
    ExecuteBatch { batch_id: i64 },
    Plate { id: i64 },
    Wells { plate_id: i64 },
    Reagents,
    Other(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK BACKEND
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct MockState {
    plates: Vec<Plate>,
    wells: HashMap<i64, Vec<Well>>,
    reagents: Vec<Reagent>,
    operations: Vec<DispenseOperation>,
    batches: HashMap<i64, DispenseBatch>,
    next_id: i64,
    calls: Vec<ApiCall>,

    fail_create_batch: Option<String>,
    /// Zero-based index of the add-operation call to reject
    fail_add_at: Option<(usize, String)>,
    add_calls: usize,
    /// Well positions whose create-operation call is rejected
    fail_wells: HashMap<String, String>,
    fail_execute_batch: Option<String>,
    fail_wells_request: Option<String>,
    /// Return batch operations newest first from add-operation calls
    reverse_batch_listing: bool,
}

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn plate_by_barcode(&self, barcode: &str) -> Result<Plate, ClientError> {
        self.plates
            .iter()
            .find(|p| p.barcode == barcode)
            .cloned()
            .ok_or_else(|| bad_request(format!("Plate not found with barcode: {barcode}")))
    }

    fn check_capacity(
        &self,
        plate_id: i64,
        well_position: &str,
        volume: f64,
    ) -> Result<Well, ClientError> {
        let well = self
            .wells
            .get(&plate_id)
            .and_then(|wells| wells.iter().find(|w| w.position == well_position))
            .cloned()
            .ok_or_else(|| bad_request(format!("Well not found at position: {well_position}")))?;

        if well.current_volume() + volume > well.max_volume {
            return Err(bad_request(format!(
                "Volume exceeds well capacity. Current: {}, Requested: {}, Max: {}",
                well.current_volume(),
                volume,
                well.max_volume
            )));
        }
        Ok(well)
    }

    fn new_operation(
        &mut self,
        plate: &Plate,
        well: &Well,
        reagent_id: i64,
        volume: f64,
    ) -> DispenseOperation {
        let reagent_name = self
            .reagents
            .iter()
            .find(|r| r.id == Some(reagent_id))
            .map(|r| r.name.clone());

        DispenseOperation {
            id: Some(self.next_id()),
            plate_id: plate.id.unwrap_or_default(),
            plate_barcode: Some(plate.barcode.clone()),
            well_id: well.id.unwrap_or_default(),
            well_position: Some(well.position.clone()),
            well_volume: well.volume,
            reagent_id,
            reagent_name,
            volume_dispensed: volume,
            status: OperationStatus::Pending,
            created_date: Some(Utc::now().naive_utc()),
            completed_date: None,
            error_message: None,
        }
    }
}

fn bad_request(message: impl Into<String>) -> ClientError {
    ClientError::Api {
        status: 400,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> ClientError {
    ClientError::Api {
        status: 404,
        message: message.into(),
    }
}

/// In-memory stand-in for the dispense backend (for testing).
///
/// Records every call, validates capacity like the real service, and can be
/// told to reject specific requests. `execute_batch` only accepts the batch;
/// completion is left to whoever drives the push channel.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a plate and its wells; ids are assigned when missing
    pub fn with_plate(self, mut plate: Plate, wells: Vec<Well>) -> Self {
        {
            let mut state = self.state();
            let plate_id = match plate.id {
                Some(id) => id,
                None => state.next_id(),
            };
            plate.id = Some(plate_id);

            let wells = wells
                .into_iter()
                .map(|mut well| {
                    if well.id.is_none() {
                        well.id = Some(state.next_id());
                    }
                    well.plate_id = Some(plate_id);
                    well
                })
                .collect();

            state.wells.insert(plate_id, wells);
            state.plates.push(plate);
        }
        self
    }

    pub fn with_reagent(self, mut reagent: Reagent) -> Self {
        {
            let mut state = self.state();
            if reagent.id.is_none() {
                reagent.id = Some(state.next_id());
            }
            state.reagents.push(reagent);
        }
        self
    }

    pub fn fail_create_batch(&self, message: impl Into<String>) {
        self.state().fail_create_batch = Some(message.into());
    }

    /// Reject the `index`-th add-operation call (zero-based, counted across batches)
    pub fn fail_add_operation_at(&self, index: usize, message: impl Into<String>) {
        self.state().fail_add_at = Some((index, message.into()));
    }

    /// Reject create-operation requests targeting `well_position`
    pub fn fail_operations_for_well(&self, well_position: &str, message: impl Into<String>) {
        self.state()
            .fail_wells
            .insert(well_position.to_string(), message.into());
    }

    /// List a batch's operations newest first, as an unordered collection may
    pub fn reverse_batch_listing(&self) {
        self.state().reverse_batch_listing = true;
    }

    pub fn fail_execute_batch(&self, message: impl Into<String>) {
        self.state().fail_execute_batch = Some(message.into());
    }

    pub fn fail_wells_request(&self, message: Option<String>) {
        self.state().fail_wells_request = message;
    }

    /// Overwrite a well's authoritative volume
    pub fn set_well_volume(&self, plate_id: i64, position: &str, volume: f64) {
        let mut state = self.state();
        if let Some(well) = state
            .wells
            .get_mut(&plate_id)
            .and_then(|wells| wells.iter_mut().find(|w| w.position == position))
        {
            well.volume = Some(volume);
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn wells_requests(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::Wells { .. }))
    }

    pub fn execute_batch_requests(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::ExecuteBatch { .. }))
    }

    pub fn stored_batch(&self, batch_id: i64) -> Option<DispenseBatch> {
        self.state().batches.get(&batch_id).cloned()
    }

    fn record(&self, call: ApiCall) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl DispenseApi for MockBackend {
    async fn history(&self) -> Result<Vec<DispenseOperation>, ClientError> {
        self.record(ApiCall::Other("history".into()));
        Ok(self.state().operations.clone())
    }

    async fn operation(&self, id: i64) -> Result<DispenseOperation, ClientError> {
        self.record(ApiCall::Other(format!("operation {id}")));
        self.state()
            .operations
            .iter()
            .find(|op| op.id == Some(id))
            .cloned()
            .ok_or_else(|| not_found(format!("Operation not found with id: {id}")))
    }

    async fn operations_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<DispenseOperation>, ClientError> {
        self.record(ApiCall::Other(format!("operations_by_status {status}")));
        Ok(self
            .state()
            .operations
            .iter()
            .filter(|op| op.status == status)
            .cloned()
            .collect())
    }

    async fn create_operation(
        &self,
        request: &DispenseRequest,
    ) -> Result<DispenseOperation, ClientError> {
        self.record(ApiCall::CreateOperation {
            well_position: request.well_position.clone(),
            reagent_id: request.reagent_id,
        });

        let mut state = self.state();
        if let Some(message) = state.fail_wells.get(&request.well_position) {
            return Err(bad_request(message.clone()));
        }

        let plate = state.plate_by_barcode(&request.plate_barcode)?;
        let well = state.check_capacity(
            plate.id.unwrap_or_default(),
            &request.well_position,
            request.volume,
        )?;
        let operation = state.new_operation(&plate, &well, request.reagent_id, request.volume);
        state.operations.push(operation.clone());
        Ok(operation)
    }

    async fn execute_operation(&self, id: i64) -> Result<DispenseOperation, ClientError> {
        self.record(ApiCall::ExecuteOperation { id });

        let mut state = self.state();
        let index = state
            .operations
            .iter()
            .position(|op| op.id == Some(id))
            .ok_or_else(|| not_found(format!("Operation not found with id: {id}")))?;

        let (plate_id, well_id, volume) = {
            let op = &state.operations[index];
            if op.status != OperationStatus::Pending {
                return Err(bad_request(format!(
                    "Operation is not in PENDING status: {}",
                    op.status
                )));
            }
            (op.plate_id, op.well_id, op.volume_dispensed)
        };

        let well_volume = state
            .wells
            .get_mut(&plate_id)
            .and_then(|wells| wells.iter_mut().find(|w| w.id == Some(well_id)))
            .map(|well| {
                let updated = well.current_volume() + volume;
                well.volume = Some(updated);
                updated
            });

        let op = &mut state.operations[index];
        op.status = OperationStatus::Completed;
        op.well_volume = well_volume;
        op.completed_date = Some(Utc::now().naive_utc());
        Ok(op.clone())
    }

    async fn create_batch(
        &self,
        request: &CreateBatchRequest,
    ) -> Result<DispenseBatch, ClientError> {
        self.record(ApiCall::CreateBatch {
            plate_barcode: request.plate_barcode.clone(),
        });

        let mut state = self.state();
        if let Some(message) = state.fail_create_batch.clone() {
            return Err(bad_request(message));
        }

        let plate = state.plate_by_barcode(&request.plate_barcode)?;
        let batch = DispenseBatch {
            id: state.next_id(),
            plate_id: plate.id,
            plate_barcode: Some(plate.barcode.clone()),
            status: BatchStatus::Planned,
            created_date: Some(Utc::now().naive_utc()),
            execution_started_date: None,
            completed_date: None,
            operation_count: 0,
            operations: Some(Vec::new()),
        };
        state.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn add_operation_to_batch(
        &self,
        batch_id: i64,
        request: &AddOperationRequest,
    ) -> Result<DispenseBatch, ClientError> {
        self.record(ApiCall::AddOperation {
            batch_id,
            well_position: request.well_position.clone(),
            reagent_id: request.reagent_id,
        });

        let mut state = self.state();
        let call_index = state.add_calls;
        state.add_calls += 1;
        if let Some((index, message)) = state.fail_add_at.clone() {
            if index == call_index {
                return Err(bad_request(message));
            }
        }

        let batch = state
            .batches
            .get(&batch_id)
            .cloned()
            .ok_or_else(|| not_found(format!("Batch not found with id: {batch_id}")))?;
        if batch.status != BatchStatus::Planned {
            return Err(bad_request(format!(
                "Cannot add operations to batch with status: {}",
                batch.status
            )));
        }

        let plate_id = batch.plate_id.unwrap_or_default();
        let plate = state
            .plates
            .iter()
            .find(|p| p.id == Some(plate_id))
            .cloned()
            .ok_or_else(|| not_found(format!("Plate not found with id: {plate_id}")))?;
        let well = state.check_capacity(plate_id, &request.well_position, request.volume)?;
        let operation = state.new_operation(&plate, &well, request.reagent_id, request.volume);
        state.operations.push(operation.clone());

        let stored = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| not_found(format!("Batch not found with id: {batch_id}")))?;
        stored.operations.get_or_insert_with(Vec::new).push(operation);
        stored.operation_count += 1;

        let mut response = stored.clone();
        if state.reverse_batch_listing {
            if let Some(ops) = response.operations.as_mut() {
                ops.reverse();
            }
        }
        Ok(response)
    }

    async fn execute_batch(&self, batch_id: i64) -> Result<DispenseBatch, ClientError> {
        self.record(ApiCall::ExecuteBatch { batch_id });

        let mut state = self.state();
        if let Some(message) = state.fail_execute_batch.clone() {
            return Err(bad_request(message));
        }

        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| not_found(format!("Batch not found with id: {batch_id}")))?;
        if batch.status != BatchStatus::Planned {
            return Err(bad_request(format!(
                "Batch is not in PLANNED status: {}",
                batch.status
            )));
        }
        batch.status = BatchStatus::Executing;
        batch.execution_started_date = Some(Utc::now().naive_utc());
        Ok(batch.clone())
    }

    async fn batch(&self, batch_id: i64) -> Result<DispenseBatch, ClientError> {
        self.record(ApiCall::Other(format!("batch {batch_id}")));
        self.state()
            .batches
            .get(&batch_id)
            .cloned()
            .ok_or_else(|| not_found(format!("Batch not found with id: {batch_id}")))
    }

    async fn batches(&self) -> Result<Vec<DispenseBatch>, ClientError> {
        self.record(ApiCall::Other("batches".into()));
        let mut batches: Vec<_> = self.state().batches.values().cloned().collect();
        batches.sort_by_key(|b| b.id);
        Ok(batches)
    }
}

#[async_trait]
impl PlateApi for MockBackend {
    async fn plates(&self) -> Result<Vec<Plate>, ClientError> {
        self.record(ApiCall::Other("plates".into()));
        Ok(self.state().plates.clone())
    }

    async fn plate(&self, id: i64) -> Result<Plate, ClientError> {
        self.record(ApiCall::Plate { id });
        self.state()
            .plates
            .iter()
            .find(|p| p.id == Some(id))
            .cloned()
            .ok_or_else(|| not_found(format!("Plate not found with id: {id}")))
    }

    async fn plate_by_barcode(&self, barcode: &str) -> Result<Plate, ClientError> {
        self.record(ApiCall::Other(format!("plate_by_barcode {barcode}")));
        self.state().plate_by_barcode(barcode)
    }

    async fn wells(&self, plate_id: i64) -> Result<Vec<Well>, ClientError> {
        self.record(ApiCall::Wells { plate_id });
        let state = self.state();
        if let Some(message) = state.fail_wells_request.clone() {
            return Err(ClientError::Transport(message));
        }
        state
            .wells
            .get(&plate_id)
            .cloned()
            .ok_or_else(|| not_found(format!("Plate not found with id: {plate_id}")))
    }

    async fn create_plate(&self, plate: &Plate) -> Result<Plate, ClientError> {
        self.record(ApiCall::Other("create_plate".into()));
        let mut state = self.state();
        let mut created = plate.clone();
        created.id = Some(state.next_id());
        state.plates.push(created.clone());
        Ok(created)
    }

    async fn update_plate(&self, id: i64, plate: &Plate) -> Result<Plate, ClientError> {
        self.record(ApiCall::Other(format!("update_plate {id}")));
        let mut state = self.state();
        let stored = state
            .plates
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or_else(|| not_found(format!("Plate not found with id: {id}")))?;
        *stored = Plate {
            id: Some(id),
            ..plate.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_plate(&self, id: i64) -> Result<(), ClientError> {
        self.record(ApiCall::Other(format!("delete_plate {id}")));
        let mut state = self.state();
        state.plates.retain(|p| p.id != Some(id));
        state.wells.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ReagentApi for MockBackend {
    async fn reagents(&self) -> Result<Vec<Reagent>, ClientError> {
        self.record(ApiCall::Reagents);
        Ok(self.state().reagents.clone())
    }

    async fn reagent(&self, id: i64) -> Result<Reagent, ClientError> {
        self.record(ApiCall::Other(format!("reagent {id}")));
        self.state()
            .reagents
            .iter()
            .find(|r| r.id == Some(id))
            .cloned()
            .ok_or_else(|| not_found(format!("Reagent not found with id: {id}")))
    }

    async fn create_reagent(&self, reagent: &Reagent) -> Result<Reagent, ClientError> {
        self.record(ApiCall::Other("create_reagent".into()));
        let mut state = self.state();
        let mut created = reagent.clone();
        created.id = Some(state.next_id());
        state.reagents.push(created.clone());
        Ok(created)
    }

    async fn update_reagent(&self, id: i64, reagent: &Reagent) -> Result<Reagent, ClientError> {
        self.record(ApiCall::Other(format!("update_reagent {id}")));
        let mut state = self.state();
        let stored = state
            .reagents
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or_else(|| not_found(format!("Reagent not found with id: {id}")))?;
        *stored = Reagent {
            id: Some(id),
            ..reagent.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_reagent(&self, id: i64) -> Result<(), ClientError> {
        self.record(ApiCall::Other(format!("delete_reagent {id}")));
        self.state().reagents.retain(|r| r.id != Some(id));
        Ok(())
    }
}
