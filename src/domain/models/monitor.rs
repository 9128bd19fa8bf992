//! Execution monitor domain model.
//!
//! One monitor entry exists per executing goal plan. Entries track the
//! live phase, progress fraction, and active blockers, and surface
//! fallback agent types pulled from the capability registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a monitored plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Work is flowing through the plan's task DAG
    Running,
    /// At least one active blocker is holding up progress
    Blocked,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Blocked => "blocked",
        }
    }
}

/// An active blocker on a plan's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    /// Short machine-readable code (e.g. "rate-limited:seo")
    pub code: String,
    /// Human-readable detail
    pub detail: String,
    /// Agent type the blocker applies to
    pub agent_type: String,
    pub raised_at: DateTime<Utc>,
    /// Whether this blocker has already escalated into a replanning request
    #[serde(default)]
    pub escalated: bool,
}

impl Blocker {
    pub fn new(
        code: impl Into<String>,
        detail: impl Into<String>,
        agent_type: impl Into<String>,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
            agent_type: agent_type.into(),
            raised_at,
            escalated: false,
        }
    }

    /// Age of this blocker at the given instant.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.raised_at
    }
}

/// Live execution state for one goal plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMonitorEntry {
    pub plan_id: Uuid,
    pub campaign_id: Uuid,
    /// Index of the earliest phase with incomplete work
    pub current_phase: usize,
    /// Agent type currently executing work for this plan, if any
    pub executing_agent: Option<String>,
    pub status: MonitorStatus,
    /// Completed-task-weight over total-task-weight within the current
    /// phase; never decreases while the plan is executing
    pub progress: f64,
    pub blockers: Vec<Blocker>,
    /// Fallback agent types currently available for blocked work
    pub fallback_agents: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionMonitorEntry {
    pub fn new(plan_id: Uuid, campaign_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            plan_id,
            campaign_id,
            current_phase: 0,
            executing_agent: None,
            status: MonitorStatus::Running,
            progress: 0.0,
            blockers: Vec::new(),
            fallback_agents: Vec::new(),
            updated_at: now,
        }
    }

    /// Record progress, clamped to [0, 1] and monotonically non-decreasing.
    pub fn record_progress(&mut self, progress: f64, now: DateTime<Utc>) {
        let clamped = progress.clamp(0.0, 1.0);
        if clamped > self.progress {
            self.progress = clamped;
        }
        self.updated_at = now;
    }

    /// Add a blocker unless one with the same code is already active.
    pub fn add_blocker(&mut self, blocker: Blocker, now: DateTime<Utc>) {
        if !self.blockers.iter().any(|b| b.code == blocker.code) {
            self.blockers.push(blocker);
        }
        self.status = MonitorStatus::Blocked;
        self.updated_at = now;
    }

    /// Drop all blockers for an agent type (e.g. after a later attempt
    /// succeeds on that agent).
    pub fn clear_blockers_for(&mut self, agent_type: &str, now: DateTime<Utc>) {
        self.blockers.retain(|b| b.agent_type != agent_type);
        if self.blockers.is_empty() {
            self.status = MonitorStatus::Running;
        }
        self.updated_at = now;
    }

    pub fn is_blocked(&self) -> bool {
        self.status == MonitorStatus::Blocked
    }
}
