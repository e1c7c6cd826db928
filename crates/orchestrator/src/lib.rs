//! Plate sessions for the reagent dispenser.
//!
//! A [`PlateSession`] caches one plate's wells and the reagent list, keeps the
//! operator's plan, submits it with a [`SubmissionStrategy`] and folds push
//! status events back into the plan.

pub mod orchestrator;
pub mod reconciler;
pub mod recovery;
pub mod store;
pub mod submission;
pub mod validator;


// Re-export main types
pub use orchestrator::{
    ExecutionPhase, ExecutionReport, OrchestratorConfig, OrchestratorError, PlateSession,
    PlateSessionBuilder, SessionState, DEFAULT_COMPLETION_TIMEOUT,
};
pub use reconciler::{IgnoreReason, ReconcileOutcome, StatusReconciler, DEFAULT_FAILURE_MESSAGE};
pub use recovery::ExpiredExecution;
pub use store::{Confirmation, OperationPlan};
pub use submission::{
    AcceptedBatch, BatchFailure, DispenseSubmitter, ObserverRef, OperationObserver,
    SequentialReport, SubmissionError, SubmissionStrategy, DEFAULT_SETTLE_DELAY,
};
pub use validator::{PlanValidator, ValidatedTarget, ValidationError, DEFAULT_MIN_VOLUME};
