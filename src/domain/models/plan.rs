//! Goal plan domain model.
//!
//! A goal plan is the output of decomposing a submitted business goal:
//! ordered subgoals, an agent execution sequence (a small phase DAG), a
//! complexity classification, and the consensus outcome that accepted it.
//! Plans are superseded rather than deleted when replanning occurs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskPriority;

/// Status of a goal plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Submitted, waiting for a decomposition worker
    Queued,
    /// Being decomposed into subgoals and phases
    Planning,
    /// Gathering agent proposals and scoring agreement
    Consensus,
    /// Accepted; its task DAG is live in the scheduler
    Executing,
    /// All plan work finished successfully
    Completed,
    /// Decomposition or execution failed
    Failed,
    /// Replaced by a replanned successor; retained for audit
    Superseded,
}

impl Default for PlanStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Consensus => "consensus",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "planning" => Some(Self::Planning),
            "consensus" => Some(Self::Consensus),
            "executing" => Some(Self::Executing),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<PlanStatus> {
        match self {
            Self::Queued => vec![Self::Planning, Self::Failed, Self::Superseded],
            Self::Planning => vec![Self::Consensus, Self::Failed, Self::Superseded],
            Self::Consensus => vec![Self::Planning, Self::Executing, Self::Failed, Self::Superseded],
            Self::Executing => vec![Self::Completed, Self::Failed, Self::Superseded],
            Self::Completed | Self::Failed | Self::Superseded => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Superseded)
    }
}

/// Complexity classification of a decomposed goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Medium
    }
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Risk-adjustment multiplier applied to summed phase estimates.
    pub fn risk_multiplier(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 1.25,
            Self::High => 1.5,
            Self::Critical => 2.0,
        }
    }
}

/// One decomposed subgoal of a business goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgoal {
    pub id: Uuid,
    pub description: String,
    /// Capabilities needed to deliver this subgoal
    pub required_capabilities: Vec<String>,
    pub priority: TaskPriority,
    pub estimated_duration_secs: u64,
    pub success_criteria: Vec<String>,
}

/// One phase of the agent execution sequence.
///
/// Phases form a DAG: a phase depends on every earlier phase whose output
/// its capability consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPhase {
    /// Position in the sequence (stable identifier within one plan)
    pub index: usize,
    /// Agent type executing this phase
    pub agent_type: String,
    /// Task descriptions instantiated into the scheduler for this phase
    pub tasks: Vec<String>,
    /// Indices of phases this phase depends on
    pub depends_on: Vec<usize>,
    pub estimated_duration_secs: u64,
    /// Alternate agent types usable when the primary is exhausted
    pub fallback_agents: Vec<String>,
}

/// Ordered list of phases with dependency structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSequence {
    pub phases: Vec<AgentPhase>,
}

impl AgentSequence {
    pub fn new(phases: Vec<AgentPhase>) -> Self {
        Self { phases }
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// The canonical phase order of this sequence.
    pub fn order(&self) -> Vec<usize> {
        self.phases.iter().map(|p| p.index).collect()
    }

    /// Sum of phase estimates, before risk adjustment.
    pub fn total_estimated_secs(&self) -> u64 {
        self.phases.iter().map(|p| p.estimated_duration_secs).sum()
    }

    /// Verify the phase graph admits a topological order.
    ///
    /// Kahn's algorithm over phase indices; errors list the phases left in
    /// the cycle.
    pub fn validate_acyclic(&self) -> Result<(), Vec<usize>> {
        let mut in_degree: Vec<usize> = vec![0; self.phases.len()];
        for phase in &self.phases {
            for &dep in &phase.depends_on {
                if dep < self.phases.len() && dep != phase.index {
                    in_degree[phase.index] += 1;
                }
            }
        }

        let mut queue: Vec<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut seen = 0usize;

        while let Some(idx) = queue.pop() {
            seen += 1;
            for phase in &self.phases {
                if phase.depends_on.contains(&idx) && phase.index != idx {
                    in_degree[phase.index] -= 1;
                    if in_degree[phase.index] == 0 {
                        queue.push(phase.index);
                    }
                }
            }
        }

        if seen == self.phases.len() {
            Ok(())
        } else {
            let stuck: Vec<usize> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| i)
                .collect();
            Err(stuck)
        }
    }
}

/// Consensus outcome recorded once a plan is accepted or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// Average proposal confidence weighted by agreement, in [0, 1]
    pub score: f64,
    /// Number of proposals gathered
    pub proposals: usize,
    /// Number of proposals that matched the chosen phase order
    pub agreeing: usize,
    /// Mean confidence across all proposals
    pub average_confidence: f64,
    pub reached_at: DateTime<Utc>,
}

/// A submitted business goal awaiting (or having undergone) decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRequest {
    pub id: Uuid,
    /// Campaign this goal belongs to
    pub campaign_id: Uuid,
    /// Free-form goal description
    pub description: String,
    /// Constraints the decomposition must honor
    pub constraints: Vec<String>,
    /// Explicit required capabilities; when empty, derived from the
    /// description against the registry's declared capability names
    pub required_capabilities: Vec<String>,
    pub priority: TaskPriority,
    pub submitted_at: DateTime<Utc>,
}

impl GoalRequest {
    pub fn new(campaign_id: Uuid, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            description: description.into(),
            constraints: Vec::new(),
            required_capabilities: Vec::new(),
            priority: TaskPriority::Medium,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("Goal description cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Receipt returned from goal submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSubmission {
    /// Identifier of the plan being produced (also the request id)
    pub request_id: Uuid,
    /// Position in the decomposition queue at submission time
    pub queue_position: usize,
    /// Rough processing estimate derived from queue depth
    pub estimated_processing_secs: u64,
}

/// The output of decomposing a submitted goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPlan {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// Short title derived from the goal description
    pub title: String,
    pub description: String,
    pub subgoals: Vec<Subgoal>,
    pub sequence: AgentSequence,
    pub complexity: Complexity,
    pub risk_factors: Vec<String>,
    /// Total estimate including the risk-adjustment multiplier
    pub estimated_total_secs: u64,
    /// Set once consensus is reached
    pub consensus: Option<ConsensusOutcome>,
    pub status: PlanStatus,
    /// Identifier of the plan this one replaced (replanning audit trail)
    pub replaces: Option<Uuid>,
    /// Identifier of the successor plan, set when this plan is superseded
    pub superseded_by: Option<Uuid>,
    /// Human-readable reason for a terminal failure
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoalPlan {
    /// Create an empty plan skeleton for a queued goal request.
    pub fn queued(request: &GoalRequest) -> Self {
        let now = Utc::now();
        Self {
            id: request.id,
            campaign_id: request.campaign_id,
            title: generate_title(&request.description),
            description: request.description.clone(),
            subgoals: Vec::new(),
            sequence: AgentSequence::default(),
            complexity: Complexity::default(),
            risk_factors: Vec::new(),
            estimated_total_secs: 0,
            consensus: None,
            status: PlanStatus::Queued,
            replaces: None,
            superseded_by: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if this plan can transition to the given status.
    pub fn can_transition_to(&self, new_status: PlanStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, updating the timestamp.
    pub fn transition_to(&mut self, new_status: PlanStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Generate a short title from a goal description.
/// Takes the first line, truncated at ~80 chars on a word boundary.
fn generate_title(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or(description).trim();
    if first_line.is_empty() {
        return "Untitled goal".to_string();
    }
    let max_len = 80;
    if first_line.len() <= max_len {
        return first_line.to_string();
    }
    match first_line[..max_len].rfind(' ') {
        Some(pos) => format!("{}...", &first_line[..pos]),
        None => format!("{}...", &first_line[..max_len]),
    }
}
