//! Adjutant - Campaign Coordination Core
//!
//! Adjutant is the orchestration core of a marketing-campaign automation
//! platform: it decides what runs, when, in what order, with what
//! fallback, and when to re-plan. Content generation, persistence, and
//! transport are external collaborators behind trait seams.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic, domain models, and ports
//! - **Service Layer** (`services`): The orchestration triad (task
//!   dependency scheduler, trigger evaluation engine, goal planning and
//!   consensus mesh) plus the execution monitor and coordination facade
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading and
//!   logging setup
//!
//! # Example
//!
//! ```ignore
//! use adjutant::services::Coordinator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Assemble a Coordinator with a registry, invoker, metrics source,
//!     // and clock, then drive it with tick()/evaluate_triggers().
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{CoordinationError, CoordinationResult};
pub use domain::models::{
    AgentPhase, AgentSequence, AgentTask, Blocker, CampaignStage, Complexity, ConsensusOutcome,
    CoordinationState, CoordinatorConfig, ExecutionMonitorEntry, GoalPlan, GoalRequest,
    GoalSubmission, MetricComparator, MonitorStatus, PlanStatus, Subgoal, TaskPriority,
    TaskResult, TaskSource, TaskStatus, Trigger, TriggerCondition, TriggerEvaluation,
    TriggerOutcome,
};
pub use domain::ports::{
    AgentInvoker, AgentProfile, CapabilityRegistry, Clock, InvocationError, MetricSnapshot,
    MetricsError, MetricsSource, PhaseProposal, StaticRegistry, SystemClock, VirtualClock,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Coordinator, DependencyGraph, StopScope, TaskScheduler};
