use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side lifecycle of a dispense operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::InProgress => "IN_PROGRESS",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-confirmed dispense operation. Owned by the backend; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseOperation {
    #[serde(default)]
    pub id: Option<i64>,

    pub plate_id: i64,

    #[serde(default)]
    pub plate_barcode: Option<String>,

    pub well_id: i64,

    #[serde(default)]
    pub well_position: Option<String>,

    /// Volume in the well after this operation, when the backend reports it
    #[serde(default)]
    pub well_volume: Option<f64>,

    pub reagent_id: i64,

    #[serde(default)]
    pub reagent_name: Option<String>,

    #[serde(default)]
    pub volume_dispensed: f64,

    pub status: OperationStatus,

    #[serde(default)]
    pub created_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub completed_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub error_message: Option<String>,
}

/// Lifecycle of a server-side batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Planned,
    Executing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Planned => "PLANNED",
            BatchStatus::Executing => "EXECUTING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-tracked group of operations executed together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseBatch {
    pub id: i64,

    #[serde(default)]
    pub plate_id: Option<i64>,

    #[serde(default)]
    pub plate_barcode: Option<String>,

    pub status: BatchStatus,

    #[serde(default)]
    pub created_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub execution_started_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub completed_date: Option<NaiveDateTime>,

    #[serde(default)]
    pub operation_count: u32,

    /// Embedded operations in insertion order
    #[serde(default)]
    pub operations: Option<Vec<DispenseOperation>>,
}

impl DispenseBatch {
    /// The embedded operation for `well_position` and `reagent_id` whose id is
    /// not yet in `claimed`.
    ///
    /// The listing order is not guaranteed, so the newest operation is found by
    /// elimination rather than position. Operations without a reported well
    /// position match on reagent alone.
    pub fn unclaimed_operation(
        &self,
        well_position: &str,
        reagent_id: i64,
        claimed: &[i64],
    ) -> Option<&DispenseOperation> {
        self.operations.as_deref()?.iter().find(|op| {
            op.id.is_some_and(|id| !claimed.contains(&id))
                && op.reagent_id == reagent_id
                && op
                    .well_position
                    .as_deref()
                    .map_or(true, |position| position == well_position)
        })
    }
}

/// Body of `POST /api/dispense`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRequest {
    pub plate_barcode: String,
    pub well_position: String,
    pub reagent_id: i64,
    pub volume: f64,
}

/// Body of `POST /api/dispense/batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    pub plate_barcode: String,
}

/// Body of `POST /api/dispense/batch/{id}/add-operation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOperationRequest {
    pub well_position: String,
    pub reagent_id: i64,
    pub volume: f64,
}

/// Error body returned by the backend on 4xx/5xx
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub message: String,

    #[serde(default)]
    pub details: Option<String>,

    #[serde(default)]
    pub status: Option<u16>,

    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_backend_json() {
        let json = r#"{
            "id": 42,
            "plateId": 1,
            "plateBarcode": "PLATE-001",
            "wellId": 10,
            "wellPosition": "A1",
            "wellVolume": 50.0,
            "reagentId": 3,
            "reagentName": "Buffer A",
            "volumeDispensed": 20.0,
            "status": "IN_PROGRESS",
            "createdDate": "2024-03-01T10:15:30.123",
            "completedDate": null,
            "errorMessage": null
        }"#;

        let op: DispenseOperation = serde_json::from_str(json).unwrap();
        assert_eq!(op.id, Some(42));
        assert_eq!(op.status, OperationStatus::InProgress);
        assert_eq!(op.well_position.as_deref(), Some("A1"));
        assert!(op.created_date.is_some());
        assert!(!op.status.is_terminal());
    }

    #[test]
    fn test_batch_unclaimed_operation_ignores_order() {
        let json = r#"{
            "id": 5,
            "plateId": 1,
            "status": "PLANNED",
            "operationCount": 3,
            "operations": [
                {"id": 102, "plateId": 1, "wellId": 1, "wellPosition": "A1", "reagentId": 1, "volumeDispensed": 10.0, "status": "PENDING"},
                {"id": 100, "plateId": 1, "wellId": 1, "wellPosition": "A1", "reagentId": 1, "volumeDispensed": 10.0, "status": "PENDING"},
                {"id": 101, "plateId": 1, "wellId": 2, "wellPosition": "A2", "reagentId": 1, "volumeDispensed": 15.0, "status": "PENDING"}
            ]
        }"#;

        let batch: DispenseBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.status, BatchStatus::Planned);

        let id = |well, claimed: &[i64]| batch.unclaimed_operation(well, 1, claimed).and_then(|op| op.id);
        assert_eq!(id("A2", &[100]), Some(101));
        assert_eq!(id("A1", &[100, 101]), Some(102));
        assert_eq!(id("A1", &[100, 101, 102]), None);
        assert_eq!(batch.unclaimed_operation("A2", 9, &[]).and_then(|op| op.id), None);
    }

    #[test]
    fn test_request_wire_names() {
        let request = DispenseRequest {
            plate_barcode: "PLATE-001".to_string(),
            well_position: "B2".to_string(),
            reagent_id: 7,
            volume: 12.5,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["plateBarcode"], "PLATE-001");
        assert_eq!(value["wellPosition"], "B2");
        assert_eq!(value["reagentId"], 7);
    }
}
