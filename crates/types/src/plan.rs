use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client-side lifecycle of a planned operation.
///
/// `Planned -> Executing -> {Completed | Failed | TimedOut}`, forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannedOperationStatus {
    Planned,
    Executing,
    Completed,
    Failed,
    /// No completion event arrived before the execution deadline
    TimedOut,
}

impl PlannedOperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlannedOperationStatus::Planned => "PLANNED",
            PlannedOperationStatus::Executing => "EXECUTING",
            PlannedOperationStatus::Completed => "COMPLETED",
            PlannedOperationStatus::Failed => "FAILED",
            PlannedOperationStatus::TimedOut => "TIMED_OUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlannedOperationStatus::Completed
                | PlannedOperationStatus::Failed
                | PlannedOperationStatus::TimedOut
        )
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: PlannedOperationStatus) -> bool {
        use PlannedOperationStatus::*;
        matches!(
            (self, next),
            (Planned, Executing) | (Executing, Completed) | (Executing, Failed) | (Executing, TimedOut)
        )
    }
}

impl fmt::Display for PlannedOperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a status to a planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed
    Applied,
    /// The operation already had this status; nothing changed
    Unchanged,
    /// Not an edge of the state machine; nothing changed
    Rejected {
        from: PlannedOperationStatus,
        to: PlannedOperationStatus,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// A staged, not-yet-persisted dispense intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedOperation {
    /// Client-generated token; the only key used for lookup and removal
    pub id: String,

    pub well_position: String,

    #[serde(default)]
    pub well_id: Option<i64>,

    pub reagent_id: i64,

    #[serde(default)]
    pub reagent_name: Option<String>,

    pub volume: f64,

    pub status: PlannedOperationStatus,

    /// Set only when the operation ends unsuccessfully
    #[serde(default)]
    pub error: Option<String>,

    /// Identity of the matching server-side operation, once the backend assigned one
    #[serde(default)]
    pub server_operation_id: Option<i64>,
}

impl PlannedOperation {
    pub fn new(well_position: impl Into<String>, reagent_id: i64, volume: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            well_position: well_position.into(),
            well_id: None,
            reagent_id,
            reagent_name: None,
            volume,
            status: PlannedOperationStatus::Planned,
            error: None,
            server_operation_id: None,
        }
    }

    pub fn with_well_id(mut self, well_id: Option<i64>) -> Self {
        self.well_id = well_id;
        self
    }

    pub fn with_reagent_name(mut self, name: Option<String>) -> Self {
        self.reagent_name = name;
        self
    }

    pub fn is_planned(&self) -> bool {
        self.status == PlannedOperationStatus::Planned
    }

    /// Whether this operation targets the given well and reagent
    pub fn targets(&self, well_position: &str, reagent_id: i64) -> bool {
        self.well_position == well_position && self.reagent_id == reagent_id
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// `error` is kept only for unsuccessful terminal states.
    pub fn transition(
        &mut self,
        next: PlannedOperationStatus,
        error: Option<String>,
    ) -> TransitionOutcome {
        if self.status == next {
            return TransitionOutcome::Unchanged;
        }
        if !self.status.can_transition_to(next) {
            return TransitionOutcome::Rejected {
                from: self.status,
                to: next,
            };
        }

        self.status = next;
        self.error = match next {
            PlannedOperationStatus::Failed | PlannedOperationStatus::TimedOut => error,
            _ => None,
        };
        TransitionOutcome::Applied
    }

    /// Drive the operation to `Failed`, passing through `Executing` when it
    /// has not started yet.
    pub fn fail(&mut self, error: impl Into<String>) -> TransitionOutcome {
        if self.status == PlannedOperationStatus::Planned {
            self.transition(PlannedOperationStatus::Executing, None);
        }
        self.transition(PlannedOperationStatus::Failed, Some(error.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlannedOperationStatus::*;

    const ALL: [PlannedOperationStatus; 5] = [Planned, Executing, Completed, Failed, TimedOut];

    #[test]
    fn test_new_operation_is_planned_with_unique_id() {
        let a = PlannedOperation::new("A1", 1, 20.0);
        let b = PlannedOperation::new("A1", 1, 20.0);
        assert!(a.is_planned());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_only_forward_edges_are_allowed() {
        for from in ALL {
            for to in ALL {
                let allowed = from.can_transition_to(to);
                let expected = matches!(
                    (from, to),
                    (Planned, Executing)
                        | (Executing, Completed)
                        | (Executing, Failed)
                        | (Executing, TimedOut)
                );
                assert_eq!(allowed, expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_terminal_status_is_idempotent() {
        let mut op = PlannedOperation::new("A1", 1, 20.0);
        assert!(op.transition(Executing, None).is_applied());
        assert!(op.transition(Completed, None).is_applied());
        assert_eq!(op.transition(Completed, None), TransitionOutcome::Unchanged);
        assert_eq!(op.status, Completed);
    }

    #[test]
    fn test_terminal_status_cannot_be_replaced() {
        let mut op = PlannedOperation::new("A1", 1, 20.0);
        op.transition(Executing, None);
        op.transition(Completed, None);

        let outcome = op.transition(Failed, Some("late failure".into()));
        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                from: Completed,
                to: Failed
            }
        );
        assert_eq!(op.status, Completed);
        assert!(op.error.is_none());
    }

    #[test]
    fn test_planned_cannot_skip_to_completed() {
        let mut op = PlannedOperation::new("A1", 1, 20.0);
        assert!(matches!(
            op.transition(Completed, None),
            TransitionOutcome::Rejected { .. }
        ));
        assert!(op.is_planned());
    }

    #[test]
    fn test_fail_from_planned_passes_through_executing() {
        let mut op = PlannedOperation::new("A1", 1, 20.0);
        assert!(op.fail("batch creation failed").is_applied());
        assert_eq!(op.status, Failed);
        assert_eq!(op.error.as_deref(), Some("batch creation failed"));
    }

    #[test]
    fn test_error_only_kept_on_failure() {
        let mut op = PlannedOperation::new("A1", 1, 20.0);
        op.transition(Executing, Some("ignored".into()));
        assert!(op.error.is_none());
    }
}
