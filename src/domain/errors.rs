//! Domain errors for the Adjutant coordination core.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur in the coordination core.
///
/// Structural errors (`DependencyCycle`, `UnknownAgentType`) are rejected
/// synchronously at submission time and never enter the task graph. Runtime
/// agent failures are absorbed by the retry state machine and surface as a
/// terminal task status, not as an error from `tick()`.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(Uuid),

    #[error("Goal plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Dependency task {0} not found in campaign")]
    MissingDependency(Uuid),

    #[error("Consensus not reached: score {score:.2} below quorum {quorum:.2}")]
    ConsensusNotReached { score: f64, quorum: f64 },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Emergency stop in progress; new submissions are rejected")]
    EmergencyStopInProgress,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Metrics unavailable for campaign {0}")]
    MetricsUnavailable(Uuid),
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::ValidationFailed(err.to_string())
    }
}
