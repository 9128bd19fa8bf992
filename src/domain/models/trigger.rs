//! Trigger rule domain model.
//!
//! A trigger is a standing rule bound to one campaign: a structured metric
//! condition, an action description, and a target agent type. The trigger
//! engine evaluates rules against metric snapshots and fires at most once
//! per cooldown window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Comparison direction for a metric condition.
///
/// The direction is part of the rule definition, never inferred from
/// free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricComparator {
    /// Fire when the metric drops below the threshold
    Below,
    /// Fire when the metric rises above the threshold
    Above,
}

impl MetricComparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Below => "<",
            Self::Above => ">",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "<" | "below" | "lt" => Some(Self::Below),
            ">" | "above" | "gt" => Some(Self::Above),
            _ => None,
        }
    }

    /// Evaluate the comparison against a threshold.
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Below => value < threshold,
            Self::Above => value > threshold,
        }
    }
}

/// Structured trigger condition: metric name, direction, threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    /// Metric name as reported by the metrics source (e.g. "ctr")
    pub metric: String,
    /// Comparison direction
    pub comparator: MetricComparator,
    /// Numeric threshold
    pub threshold: f64,
}

impl TriggerCondition {
    pub fn new(metric: impl Into<String>, comparator: MetricComparator, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            comparator,
            threshold,
        }
    }

    /// Check whether a metric value satisfies this condition.
    pub fn is_met(&self, value: f64) -> bool {
        self.comparator.compare(value, self.threshold)
    }
}

/// A standing rule bound to one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier
    pub id: Uuid,
    /// Owning campaign
    pub campaign_id: Uuid,
    /// Human label
    pub name: String,
    /// Condition that must hold for the rule to fire
    pub condition: TriggerCondition,
    /// Description of the corrective work to enqueue
    pub action_description: String,
    /// Agent type the emitted task targets
    pub target_agent: String,
    /// Whether this rule is currently evaluated
    pub active: bool,
    /// Minimum interval between consecutive firings
    pub cooldown: Duration,
    /// Last time this rule fired
    pub last_fired: Option<DateTime<Utc>>,
    /// How many times this rule has fired
    pub fire_count: u64,
    /// When this rule was created
    pub created_at: DateTime<Utc>,
}

impl Trigger {
    pub fn new(
        campaign_id: Uuid,
        name: impl Into<String>,
        condition: TriggerCondition,
        action_description: impl Into<String>,
        target_agent: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            name: name.into(),
            condition,
            action_description: action_description.into(),
            target_agent: target_agent.into(),
            active: true,
            cooldown: Duration::from_secs(900),
            last_fired: None,
            fire_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Check if the cooldown window from the last firing is still open.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            Some(fired) => {
                let elapsed = now - fired;
                let window = chrono::Duration::from_std(self.cooldown)
                    .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000));
                elapsed < window
            }
            None => false,
        }
    }

    /// Record a firing.
    pub fn record_fired(&mut self, now: DateTime<Utc>) {
        self.last_fired = Some(now);
        self.fire_count += 1;
    }

    /// Validate rule shape before registration.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Trigger name cannot be empty".to_string());
        }
        if self.condition.metric.trim().is_empty() {
            return Err("Trigger metric cannot be empty".to_string());
        }
        if self.target_agent.trim().is_empty() {
            return Err("Trigger target agent cannot be empty".to_string());
        }
        if self.action_description.trim().is_empty() {
            return Err("Trigger action description cannot be empty".to_string());
        }
        if self.cooldown.is_zero() {
            return Err("Trigger cooldown must be positive".to_string());
        }
        Ok(())
    }
}

/// Outcome of evaluating one trigger against one metric snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Condition held outside the cooldown window; a task was emitted
    Fired,
    /// Condition did not hold
    ConditionNotMet,
    /// Condition held but the cooldown window is still open (no-op)
    CooldownActive,
    /// The metric was absent from the snapshot
    MetricMissing,
    /// The rule is deactivated
    Inactive,
}

impl TriggerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fired => "fired",
            Self::ConditionNotMet => "condition_not_met",
            Self::CooldownActive => "cooldown_active",
            Self::MetricMissing => "metric_missing",
            Self::Inactive => "inactive",
        }
    }
}

/// Evaluation-log entry for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvaluation {
    pub trigger_id: Uuid,
    pub campaign_id: Uuid,
    pub outcome: TriggerOutcome,
    /// Metric value at evaluation time, if present in the snapshot
    pub metric_value: Option<f64>,
    /// Task emitted by this evaluation, if any
    pub task_id: Option<Uuid>,
    pub evaluated_at: DateTime<Utc>,
}

impl TriggerEvaluation {
    pub fn fired(&self) -> bool {
        self.outcome == TriggerOutcome::Fired
    }
}
