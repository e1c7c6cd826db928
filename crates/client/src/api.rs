use async_trait::async_trait;
use dispense_types::{
    AddOperationRequest, CreateBatchRequest, DispenseBatch, DispenseOperation, DispenseRequest,
    OperationStatus, Plate, Reagent, Well,
};

use crate::ClientError;

/// `/api/dispense` endpoints
#[async_trait]
pub trait DispenseApi: Send + Sync {
    /// `GET /history`
    async fn history(&self) -> Result<Vec<DispenseOperation>, ClientError>;

    /// `GET /{id}`
    async fn operation(&self, id: i64) -> Result<DispenseOperation, ClientError>;

    /// `GET /status/{status}`
    async fn operations_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<DispenseOperation>, ClientError>;

    /// `POST /` - creates a `PENDING` operation without executing it
    async fn create_operation(
        &self,
        request: &DispenseRequest,
    ) -> Result<DispenseOperation, ClientError>;

    /// `POST /{id}/execute`
    async fn execute_operation(&self, id: i64) -> Result<DispenseOperation, ClientError>;

    /// `POST /batch`
    async fn create_batch(&self, request: &CreateBatchRequest)
        -> Result<DispenseBatch, ClientError>;

    /// `POST /batch/{id}/add-operation`
    async fn add_operation_to_batch(
        &self,
        batch_id: i64,
        request: &AddOperationRequest,
    ) -> Result<DispenseBatch, ClientError>;

    /// `POST /batch/{id}/execute` - acceptance only; completion arrives as a push event
    async fn execute_batch(&self, batch_id: i64) -> Result<DispenseBatch, ClientError>;

    /// `GET /batch/{id}`
    async fn batch(&self, batch_id: i64) -> Result<DispenseBatch, ClientError>;

    /// `GET /batch`
    async fn batches(&self) -> Result<Vec<DispenseBatch>, ClientError>;
}

/// `/api/plates` endpoints
#[async_trait]
pub trait PlateApi: Send + Sync {
    async fn plates(&self) -> Result<Vec<Plate>, ClientError>;

    async fn plate(&self, id: i64) -> Result<Plate, ClientError>;

    async fn plate_by_barcode(&self, barcode: &str) -> Result<Plate, ClientError>;

    /// `GET /{id}/wells` - the authoritative well volumes
    async fn wells(&self, plate_id: i64) -> Result<Vec<Well>, ClientError>;

    async fn create_plate(&self, plate: &Plate) -> Result<Plate, ClientError>;

    async fn update_plate(&self, id: i64, plate: &Plate) -> Result<Plate, ClientError>;

    async fn delete_plate(&self, id: i64) -> Result<(), ClientError>;
}

/// `/api/reagents` endpoints
#[async_trait]
pub trait ReagentApi: Send + Sync {
    async fn reagents(&self) -> Result<Vec<Reagent>, ClientError>;

    async fn reagent(&self, id: i64) -> Result<Reagent, ClientError>;

    async fn create_reagent(&self, reagent: &Reagent) -> Result<Reagent, ClientError>;

    async fn update_reagent(&self, id: i64, reagent: &Reagent) -> Result<Reagent, ClientError>;

    async fn delete_reagent(&self, id: i64) -> Result<(), ClientError>;
}

/// Everything a plate session talks to
pub trait Backend: DispenseApi + PlateApi + ReagentApi {}

impl<T> Backend for T where T: DispenseApi + PlateApi + ReagentApi {}
