use dispense_types::{PlannedOperation, PlannedOperationStatus, TransitionOutcome};
use std::collections::BTreeSet;

/// Yes/no answer from the operator for destructive or irreversible actions
pub trait Confirmation: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl Confirmation for bool {
    fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

impl<F> Confirmation for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Ordered collection of planned operations for one plate view.
///
/// Insertion order is execution order. Entries are keyed by their
/// client-generated id only; the same well and reagent may appear more
/// than once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPlan {
    operations: Vec<PlannedOperation>,
}

impl OperationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append without de-duplication
    pub fn add(&mut self, operation: PlannedOperation) {
        self.operations.push(operation);
    }

    /// Remove the entry with `id`; absent ids are a no-op
    pub fn remove(&mut self, id: &str) -> Option<PlannedOperation> {
        let index = self.operations.iter().position(|op| op.id == id)?;
        Some(self.operations.remove(index))
    }

    /// Empty the plan if the operator approves. Returns whether it cleared.
    pub fn clear(&mut self, confirmation: &dyn Confirmation) -> bool {
        if self.operations.is_empty() {
            return false;
        }
        if !confirmation.confirm("Are you sure you want to clear all planned operations?") {
            return false;
        }
        self.operations.clear();
        true
    }

    pub fn get(&self, id: &str) -> Option<&PlannedOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn operations(&self) -> &[PlannedOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply a status through the forward-only state machine.
    ///
    /// Unknown ids are reported as `Unchanged`.
    pub fn apply_status(
        &mut self,
        id: &str,
        status: PlannedOperationStatus,
        error: Option<String>,
    ) -> TransitionOutcome {
        match self.operations.iter_mut().find(|op| op.id == id) {
            Some(op) => op.transition(status, error),
            None => TransitionOutcome::Unchanged,
        }
    }

    /// Fold a snapshot produced by a submitter into the stored entry.
    ///
    /// The server operation id is adopted if the entry has none. A snapshot
    /// that is already terminal while the entry is still planned moves the
    /// entry through `Executing` first.
    pub fn sync(&mut self, snapshot: &PlannedOperation) -> TransitionOutcome {
        let Some(entry) = self.operations.iter_mut().find(|op| op.id == snapshot.id) else {
            return TransitionOutcome::Unchanged;
        };

        if entry.server_operation_id.is_none() {
            entry.server_operation_id = snapshot.server_operation_id;
        }

        if entry.status == PlannedOperationStatus::Planned && snapshot.status.is_terminal() {
            entry.transition(PlannedOperationStatus::Executing, None);
        }
        entry.transition(snapshot.status, snapshot.error.clone())
    }

    /// Locate the entry a push status update refers to.
    ///
    /// A known server operation id wins; otherwise the first `Executing`
    /// entry for the same well and reagent.
    pub fn find_for_update(
        &self,
        server_operation_id: Option<i64>,
        well_position: &str,
        reagent_id: i64,
    ) -> Option<&PlannedOperation> {
        if let Some(server_id) = server_operation_id {
            if let Some(op) = self
                .operations
                .iter()
                .find(|op| op.server_operation_id == Some(server_id))
            {
                return Some(op);
            }
        }

        self.operations.iter().find(|op| {
            op.status == PlannedOperationStatus::Executing && op.targets(well_position, reagent_id)
        })
    }

    /// Ids of entries currently in `status`
    pub fn ids_with_status(&self, status: PlannedOperationStatus) -> Vec<String> {
        self.operations
            .iter()
            .filter(|op| op.status == status)
            .map(|op| op.id.clone())
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VIEWS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn total_operations(&self) -> usize {
        self.operations.len()
    }

    pub fn total_volume(&self) -> f64 {
        self.operations.iter().map(|op| op.volume).sum()
    }

    /// Number of distinct well positions in the plan
    pub fn unique_wells(&self) -> usize {
        self.operations
            .iter()
            .map(|op| op.well_position.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Non-empty, not executing, and every entry still `Planned`
    pub fn can_execute(&self, executing: bool) -> bool {
        !self.operations.is_empty() && !executing && self.operations.iter().all(|op| op.is_planned())
    }

    fn count(&self, status: PlannedOperationStatus) -> usize {
        self.operations.iter().filter(|op| op.status == status).count()
    }

    pub fn completed_count(&self) -> usize {
        self.count(PlannedOperationStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(PlannedOperationStatus::Failed)
    }

    pub fn timed_out_count(&self) -> usize {
        self.count(PlannedOperationStatus::TimedOut)
    }

    /// First entry currently executing
    pub fn executing_operation(&self) -> Option<&PlannedOperation> {
        self.operations
            .iter()
            .find(|op| op.status == PlannedOperationStatus::Executing)
    }

    /// Share of entries in a terminal status, rounded to a whole percent
    pub fn progress_percentage(&self) -> u32 {
        if self.operations.is_empty() {
            return 0;
        }
        let done = self.operations.iter().filter(|op| op.status.is_terminal()).count();
        ((done as f64 / self.operations.len() as f64) * 100.0).round() as u32
    }

    pub fn status_message(&self, executing: bool) -> String {
        let total = self.total_operations();
        let completed = self.completed_count();
        let unsuccessful = self.failed_count() + self.timed_out_count();

        if executing {
            let remaining = total - completed - unsuccessful;
            return format!("Executing... {remaining} operation(s) remaining");
        }
        if total > 0 && completed == total {
            return "All operations completed successfully!".to_string();
        }
        if unsuccessful > 0 {
            return format!("Completed with {unsuccessful} failure(s)");
        }
        "Ready to execute".to_string()
    }
}
