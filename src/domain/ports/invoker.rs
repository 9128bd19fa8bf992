//! Agent invocation port.
//!
//! The only long-latency operation in the core. Whatever executes agent
//! work (an LLM-backed capability service, a worker pool) implements this
//! trait; the scheduler awaits it without interpreting the payload, and
//! the mesh uses `propose` to gather consensus votes instead of fabricating
//! confidences.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{AgentTask, GoalPlan, TaskResult};

/// Errors an agent invocation can surface.
///
/// These are runtime failures: the scheduler recovers them through the
/// retry state machine, never by propagating out of `tick()`.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    #[error("Agent {agent_type} is rate limited")]
    RateLimited { agent_type: String },

    #[error("Agent {agent_type} is unavailable: {reason}")]
    Unavailable { agent_type: String, reason: String },

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),
}

impl InvocationError {
    /// Short machine-readable blocker code for the execution monitor.
    pub fn blocker_code(&self, agent_type: &str) -> String {
        match self {
            Self::RateLimited { .. } => format!("rate-limited:{agent_type}"),
            Self::Unavailable { .. } => format!("unavailable:{agent_type}"),
            Self::ExecutionFailed(_) => format!("execution-failed:{agent_type}"),
        }
    }
}

/// A proposal returned by a capable agent during plan consensus.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseProposal {
    /// Agent type that produced this proposal
    pub agent_type: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Alternative phase ordering; `None` endorses the chosen plan
    pub alternative_order: Option<Vec<usize>>,
}

impl PhaseProposal {
    /// An endorsement of the chosen plan.
    pub fn endorse(agent_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            agent_type: agent_type.into(),
            confidence: confidence.clamp(0.0, 1.0),
            alternative_order: None,
        }
    }

    /// A dissenting proposal carrying an alternative phase order.
    pub fn dissent(
        agent_type: impl Into<String>,
        confidence: f64,
        alternative_order: Vec<usize>,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            confidence: confidence.clamp(0.0, 1.0),
            alternative_order: Some(alternative_order),
        }
    }

    /// Whether this proposal matches the given phase order.
    pub fn agrees_with(&self, order: &[usize]) -> bool {
        match &self.alternative_order {
            None => true,
            Some(alt) => alt == order,
        }
    }
}

/// Port for executing agent work and gathering plan proposals.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Execute a task and return its opaque payload plus quality score.
    async fn execute(&self, task: &AgentTask) -> Result<TaskResult, InvocationError>;

    /// Ask an agent type to weigh in on a decomposed plan.
    async fn propose(
        &self,
        agent_type: &str,
        plan: &GoalPlan,
    ) -> Result<PhaseProposal, InvocationError>;
}
