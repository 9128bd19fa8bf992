//! Agent task domain model.
//!
//! Tasks are discrete units of campaign work that agents execute.
//! They form a DAG with dependencies, owned by one campaign.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined; dependencies may not be met yet
    Pending,
    /// Task is currently being executed by an agent
    Running,
    /// Task failed and is waiting out its backoff delay before re-queueing
    Retrying,
    /// Task completed successfully
    Completed,
    /// Task failed during execution
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "retrying" => Some(Self::Retrying),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Valid transitions from this status.
    ///
    /// `Failed -> Retrying` is only reachable while the retry cap has not
    /// been exhausted; the scheduler enforces that guard.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Running],
            Self::Running => vec![Self::Completed, Self::Failed],
            Self::Retrying => vec![Self::Pending],
            Self::Failed => vec![Self::Retrying],
            Self::Completed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }

    /// Check if this is a settled state (no work in flight, no backoff pending).
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Priority level for tasks.
///
/// Urgent tasks (trigger-emitted corrective work) preempt everything else
/// in scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Stage of the campaign lifecycle a task (or agent) belongs to.
///
/// Stage order drives phase dependencies in goal plans: later-stage work
/// consumes the output of earlier stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStage {
    Planning = 0,
    Creation = 1,
    Distribution = 2,
    Optimization = 3,
    Analysis = 4,
}

impl Default for CampaignStage {
    fn default() -> Self {
        Self::Planning
    }
}

impl CampaignStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Creation => "creation",
            Self::Distribution => "distribution",
            Self::Optimization => "optimization",
            Self::Analysis => "analysis",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "planning" => Some(Self::Planning),
            "creation" => Some(Self::Creation),
            "distribution" => Some(Self::Distribution),
            "optimization" => Some(Self::Optimization),
            "analysis" => Some(Self::Analysis),
            _ => None,
        }
    }
}

/// Where a task originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSource {
    /// Task submitted directly through the boundary API
    Manual,
    /// Task instantiated from a goal plan phase
    Plan { plan_id: Uuid },
    /// Task emitted by a fired trigger rule
    Trigger { trigger_id: Uuid },
}

impl Default for TaskSource {
    fn default() -> Self {
        Self::Manual
    }
}

/// Result payload returned by an agent invocation.
///
/// The scheduler does not interpret the payload; it only records the
/// quality score, duration, and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Opaque agent output
    pub payload: serde_json::Value,
    /// Result quality in [0, 1]
    pub quality_score: f64,
}

impl TaskResult {
    pub fn new(payload: serde_json::Value, quality_score: f64) -> Self {
        Self {
            payload,
            quality_score: quality_score.clamp(0.0, 1.0),
        }
    }
}

/// A discrete unit of campaign work executed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique identifier
    pub id: Uuid,
    /// Owning campaign
    pub campaign_id: Uuid,
    /// Agent type responsible for executing this task
    pub agent_type: String,
    /// Campaign stage this work belongs to
    pub stage: CampaignStage,
    /// What the agent is asked to do
    pub description: String,
    /// Current status
    pub status: TaskStatus,
    /// Priority
    pub priority: TaskPriority,
    /// Task IDs this depends on (within the same campaign)
    pub depends_on: Vec<Uuid>,
    /// Estimated duration in seconds
    pub estimated_duration_secs: u64,
    /// Actual duration in seconds, set once on completion
    pub actual_duration_secs: Option<u64>,
    /// Result recorded on completion; immutable once set
    pub result: Option<TaskResult>,
    /// Failed attempts so far, capped at `max_retries`
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// Human-readable reason for the most recent failure
    pub error_message: Option<String>,
    /// Where this task originated from
    pub source: TaskSource,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest time a retrying task may re-enter the pending pool
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    /// Create a new task for a campaign.
    pub fn new(
        campaign_id: Uuid,
        agent_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            agent_type: agent_type.into(),
            stage: CampaignStage::default(),
            description: description.into(),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            depends_on: Vec::new(),
            estimated_duration_secs: 0,
            actual_duration_secs: None,
            result: None,
            retry_count: 0,
            max_retries: 3,
            error_message: None,
            source: TaskSource::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_retry_at: None,
        }
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.depends_on.contains(&task_id) && task_id != self.id {
            self.depends_on.push(task_id);
        }
        self
    }

    /// Add several dependencies at once.
    pub fn with_dependencies(mut self, task_ids: impl IntoIterator<Item = Uuid>) -> Self {
        for id in task_ids {
            self = self.with_dependency(id);
        }
        self
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set campaign stage.
    pub fn with_stage(mut self, stage: CampaignStage) -> Self {
        self.stage = stage;
        self
    }

    /// Set estimated duration.
    pub fn with_estimated_duration(mut self, secs: u64) -> Self {
        self.estimated_duration_secs = secs;
        self
    }

    /// Set the retry cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set task source.
    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Check if the task may still be retried after a failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Check if the task has failed with its retry budget exhausted.
    pub fn is_permanently_failed(&self) -> bool {
        self.status == TaskStatus::Failed && !self.can_retry()
    }

    /// Check if the task has reached the end of its lifecycle.
    pub fn is_terminal(&self) -> bool {
        self.status == TaskStatus::Completed || self.is_permanently_failed()
    }

    /// Mark the task running.
    pub fn mark_started(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        self.transition_to(TaskStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Record a successful result.
    ///
    /// Actual duration and quality score are immutable once set.
    pub fn complete(&mut self, result: TaskResult, now: DateTime<Utc>) -> Result<(), String> {
        if self.result.is_some() {
            return Err("Task result is immutable once recorded".to_string());
        }
        self.transition_to(TaskStatus::Completed)?;
        self.completed_at = Some(now);
        self.actual_duration_secs = self
            .started_at
            .map(|started| (now - started).num_seconds().max(0) as u64);
        self.result = Some(result);
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Counts the failure against the retry budget; once `retry_count`
    /// reaches `max_retries` the task is permanently failed.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), String> {
        self.transition_to(TaskStatus::Failed)?;
        self.completed_at = Some(now);
        self.error_message = Some(error.into());
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        Ok(())
    }

    /// Fail the task without consuming a retry.
    ///
    /// Emergency stop is the only caller; this is the one path that aborts
    /// a running task outside the retry state machine.
    pub fn abort(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), String> {
        self.transition_to(TaskStatus::Failed)?;
        self.completed_at = Some(now);
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Move a failed task into its backoff window; it returns to `Pending`
    /// once `next_retry_at` passes.
    pub fn schedule_retry(
        &mut self,
        delay: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if !self.can_retry() {
            return Err("Cannot retry: max retries reached".to_string());
        }
        self.transition_to(TaskStatus::Retrying)?;
        self.next_retry_at = Some(now + delay);
        self.completed_at = None;
        Ok(())
    }

    /// Check if a retrying task's backoff window has elapsed.
    pub fn retry_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Retrying
            && self.next_retry_at.is_some_and(|at| at <= now)
    }

    /// Return a retrying task to the pending pool.
    pub fn requeue(&mut self) -> Result<(), String> {
        self.transition_to(TaskStatus::Pending)?;
        self.started_at = None;
        self.next_retry_at = None;
        Ok(())
    }

    fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        Ok(())
    }

    /// Validate task shape before submission.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_type.trim().is_empty() {
            return Err("Task agent type cannot be empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("Task description cannot be empty".to_string());
        }
        if self.depends_on.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> AgentTask {
        AgentTask::new(Uuid::new_v4(), "content-generation", "Draft launch copy")
    }

    #[test]
    fn test_task_creation_defaults() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.priority, TaskPriority::Medium);
        assert_eq!(t.retry_count, 0);
        assert!(t.result.is_none());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut t = task();
        let now = Utc::now();

        t.mark_started(now).unwrap();
        assert_eq!(t.status, TaskStatus::Running);
        assert!(t.started_at.is_some());

        let result = TaskResult::new(serde_json::json!({"copy": "..."}), 0.9);
        t.complete(result, now + chrono::Duration::seconds(42)).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.actual_duration_secs, Some(42));
        assert!(t.is_terminal());
    }

    #[test]
    fn test_result_immutable_once_set() {
        let mut t = task();
        let now = Utc::now();
        t.mark_started(now).unwrap();
        t.complete(TaskResult::new(serde_json::Value::Null, 0.5), now)
            .unwrap();

        let again = TaskResult::new(serde_json::Value::Null, 1.0);
        assert!(t.complete(again, now).is_err());
        assert_eq!(t.result.as_ref().unwrap().quality_score, 0.5);
    }

    #[test]
    fn test_retry_machine() {
        let mut t = task().with_max_retries(2);
        let now = Utc::now();

        t.mark_started(now).unwrap();
        t.mark_failed("agent unavailable", now).unwrap();
        assert_eq!(t.retry_count, 1);
        assert!(t.can_retry());

        t.schedule_retry(chrono::Duration::seconds(30), now).unwrap();
        assert_eq!(t.status, TaskStatus::Retrying);
        assert!(!t.retry_due(now));
        assert!(t.retry_due(now + chrono::Duration::seconds(31)));

        t.requeue().unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.next_retry_at.is_none());
    }

    #[test]
    fn test_retry_cap_is_absolute() {
        let mut t = task().with_max_retries(2);
        let now = Utc::now();

        t.mark_started(now).unwrap();
        t.mark_failed("boom", now).unwrap();
        t.schedule_retry(chrono::Duration::seconds(1), now).unwrap();
        t.requeue().unwrap();
        t.mark_started(now).unwrap();
        t.mark_failed("boom again", now).unwrap();

        // Second failure hits the cap: retry_count == max_retries.
        assert_eq!(t.retry_count, 2);
        assert!(!t.can_retry());
        assert!(t.is_permanently_failed());
        assert!(t
            .schedule_retry(chrono::Duration::seconds(1), now)
            .is_err());
    }

    #[test]
    fn test_retry_count_never_exceeds_cap() {
        let mut t = task().with_max_retries(0);
        let now = Utc::now();
        t.mark_started(now).unwrap();
        t.mark_failed("boom", now).unwrap();
        assert_eq!(t.retry_count, 0);
        assert!(t.is_permanently_failed());
    }

    #[test]
    fn test_abort_does_not_consume_retry() {
        let mut t = task().with_max_retries(3);
        let now = Utc::now();
        t.mark_started(now).unwrap();
        t.abort("emergency stop", now).unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.retry_count, 0);
        assert_eq!(t.error_message.as_deref(), Some("emergency stop"));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut t = task();
        let now = Utc::now();
        assert!(t
            .complete(TaskResult::new(serde_json::Value::Null, 1.0), now)
            .is_err());
        assert!(t.mark_failed("not running", now).is_err());
    }

    #[test]
    fn test_quality_score_clamped() {
        let r = TaskResult::new(serde_json::Value::Null, 1.7);
        assert_eq!(r.quality_score, 1.0);
        let r = TaskResult::new(serde_json::Value::Null, -0.2);
        assert_eq!(r.quality_score, 0.0);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let t = task();
        let id = t.id;
        let t = t.with_dependency(id);
        assert!(t.depends_on.is_empty());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Retrying,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
        assert!(TaskStatus::from_str("paused").is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
    }
}
