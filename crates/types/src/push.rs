use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BatchStatus, OperationStatus};

pub const OPERATION_STATUS_CHANGE: &str = "OPERATION_STATUS_CHANGE";
pub const BATCH_EXECUTION_COMPLETED: &str = "BATCH_EXECUTION_COMPLETED";
pub const BATCH_EXECUTION_STARTED: &str = "BATCH_EXECUTION_STARTED";
pub const OPERATION_CREATED: &str = "OPERATION_CREATED";

/// Envelope published on the dispense status topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl PushMessage {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp: None,
        }
    }
}

/// Payload of `OPERATION_STATUS_CHANGE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatusPayload {
    /// Server operation id
    #[serde(default)]
    pub id: Option<i64>,

    pub plate_id: i64,

    pub well_position: String,

    pub reagent_id: i64,

    /// Authoritative well volume after the operation, if included
    #[serde(default)]
    pub well_volume: Option<f64>,

    pub status: OperationStatus,

    #[serde(default)]
    pub error_message: Option<String>,
}

/// Payload of `BATCH_EXECUTION_STARTED` / `BATCH_EXECUTION_COMPLETED`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusPayload {
    #[serde(default)]
    pub id: Option<i64>,

    pub plate_id: i64,

    pub status: BatchStatus,
}

/// Decoded push event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    OperationStatusChange(OperationStatusPayload),
    BatchExecutionStarted(BatchStatusPayload),
    BatchExecutionCompleted(BatchStatusPayload),
    /// Any other envelope type; carried so callers can log it
    Other { kind: String },
}

impl PushEvent {
    /// Decode a raw message body (JSON envelope)
    pub fn parse(body: &str) -> Result<Self, PushDecodeError> {
        let message: PushMessage =
            serde_json::from_str(body).map_err(|e| PushDecodeError::Envelope(e.to_string()))?;
        Self::from_message(message)
    }

    pub fn from_message(message: PushMessage) -> Result<Self, PushDecodeError> {
        let payload_error = |kind: &str, e: serde_json::Error| PushDecodeError::Payload {
            kind: kind.to_string(),
            reason: e.to_string(),
        };

        match message.kind.as_str() {
            OPERATION_STATUS_CHANGE => serde_json::from_value(message.payload)
                .map(PushEvent::OperationStatusChange)
                .map_err(|e| payload_error(OPERATION_STATUS_CHANGE, e)),
            BATCH_EXECUTION_STARTED => serde_json::from_value(message.payload)
                .map(PushEvent::BatchExecutionStarted)
                .map_err(|e| payload_error(BATCH_EXECUTION_STARTED, e)),
            BATCH_EXECUTION_COMPLETED => serde_json::from_value(message.payload)
                .map(PushEvent::BatchExecutionCompleted)
                .map_err(|e| payload_error(BATCH_EXECUTION_COMPLETED, e)),
            _ => Ok(PushEvent::Other { kind: message.kind }),
        }
    }

    /// Plate the event is scoped to, if it carries one
    pub fn plate_id(&self) -> Option<i64> {
        match self {
            PushEvent::OperationStatusChange(p) => Some(p.plate_id),
            PushEvent::BatchExecutionStarted(p) | PushEvent::BatchExecutionCompleted(p) => {
                Some(p.plate_id)
            }
            PushEvent::Other { .. } => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            PushEvent::OperationStatusChange(_) => OPERATION_STATUS_CHANGE,
            PushEvent::BatchExecutionStarted(_) => BATCH_EXECUTION_STARTED,
            PushEvent::BatchExecutionCompleted(_) => BATCH_EXECUTION_COMPLETED,
            PushEvent::Other { kind } => kind,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PushDecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("malformed {kind} payload: {reason}")]
    Payload { kind: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operation_status_change() {
        let body = r#"{
            "type": "OPERATION_STATUS_CHANGE",
            "payload": {
                "id": 11, "plateId": 1, "wellId": 3, "wellPosition": "A1",
                "reagentId": 2, "wellVolume": 45.5, "status": "COMPLETED"
            },
            "timestamp": "2024-03-01T10:15:30"
        }"#;

        match PushEvent::parse(body).unwrap() {
            PushEvent::OperationStatusChange(p) => {
                assert_eq!(p.id, Some(11));
                assert_eq!(p.plate_id, 1);
                assert_eq!(p.well_volume, Some(45.5));
                assert_eq!(p.status, OperationStatus::Completed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_parse_batch_completed() {
        let body = r#"{"type":"BATCH_EXECUTION_COMPLETED","payload":{"id":4,"plateId":1,"status":"FAILED"}}"#;
        let event = PushEvent::parse(body).unwrap();
        assert_eq!(event.plate_id(), Some(1));
        assert_eq!(event.kind(), BATCH_EXECUTION_COMPLETED);
    }

    #[test]
    fn test_unknown_type_is_other() {
        let body = r#"{"type":"OPERATION_CREATED","payload":{"plateId":1}}"#;
        assert_eq!(
            PushEvent::parse(body).unwrap(),
            PushEvent::Other {
                kind: OPERATION_CREATED.to_string()
            }
        );
    }

    #[test]
    fn test_malformed_messages() {
        assert!(matches!(
            PushEvent::parse("not json"),
            Err(PushDecodeError::Envelope(_))
        ));

        let missing_plate = r#"{"type":"OPERATION_STATUS_CHANGE","payload":{"wellPosition":"A1"}}"#;
        assert!(matches!(
            PushEvent::parse(missing_plate),
            Err(PushDecodeError::Payload { .. })
        ));
    }
}
