//! Execution monitor service.
//!
//! Tracks the live phase, progress, and blockers of each executing goal
//! plan. The scheduler reports every task transition here; persistent
//! blockers escalate into replanning requests instead of stalling
//! indefinitely.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{
    AgentTask, Blocker, ExecutionMonitorEntry, MonitorConfig, TaskStatus,
};
use crate::domain::ports::{CapabilityRegistry, Clock, InvocationError};

/// Events the monitor raises for the coordinator to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A blocker persisted past the configured duration; the plan should
    /// be replanned around it.
    ReplanNeeded { plan_id: Uuid, reason: String },
    /// Every task belonging to the plan completed.
    PlanCompleted { plan_id: Uuid },
}

/// Task ids and weights for one phase of a tracked plan.
#[derive(Debug, Clone)]
pub struct PhaseTasks {
    pub phase_index: usize,
    pub agent_type: String,
    /// Task id -> weight (estimated duration, floored at 1)
    pub task_weights: HashMap<Uuid, u64>,
}

#[derive(Debug)]
struct TrackedPlan {
    entry: ExecutionMonitorEntry,
    phases: Vec<PhaseTasks>,
    /// Live status of every task in the plan
    task_statuses: HashMap<Uuid, TaskStatus>,
}

impl TrackedPlan {
    fn current_phase(&self) -> usize {
        self.phases
            .iter()
            .find(|p| {
                p.task_weights
                    .keys()
                    .any(|id| self.task_statuses.get(id) != Some(&TaskStatus::Completed))
            })
            .map_or_else(
                || self.phases.len().saturating_sub(1),
                |p| p.phase_index,
            )
    }

    fn phase_progress(&self, phase_index: usize) -> f64 {
        let Some(phase) = self.phases.iter().find(|p| p.phase_index == phase_index) else {
            return 0.0;
        };
        let total: u64 = phase.task_weights.values().sum();
        if total == 0 {
            return 0.0;
        }
        let done: u64 = phase
            .task_weights
            .iter()
            .filter(|(id, _)| self.task_statuses.get(*id) == Some(&TaskStatus::Completed))
            .map(|(_, w)| *w)
            .sum();
        done as f64 / total as f64
    }

    fn all_complete(&self) -> bool {
        self.task_statuses
            .values()
            .all(|s| *s == TaskStatus::Completed)
    }
}

/// Monitors executing plans and surfaces fallback options.
pub struct ExecutionMonitor {
    registry: Arc<dyn CapabilityRegistry>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    plans: RwLock<HashMap<Uuid, TrackedPlan>>,
    /// Task id -> plan id, for transition routing
    task_index: RwLock<HashMap<Uuid, Uuid>>,
    events: mpsc::UnboundedSender<MonitorEvent>,
}

impl ExecutionMonitor {
    /// Create a monitor and the receiving end of its event stream.
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                registry,
                clock,
                config,
                plans: RwLock::new(HashMap::new()),
                task_index: RwLock::new(HashMap::new()),
                events,
            },
            rx,
        )
    }

    /// Start tracking a plan that entered execution.
    #[instrument(skip(self, phases))]
    pub async fn track_plan(&self, plan_id: Uuid, campaign_id: Uuid, phases: Vec<PhaseTasks>) {
        let now = self.clock.now();
        let mut task_statuses = HashMap::new();
        {
            let mut index = self.task_index.write().await;
            for phase in &phases {
                for &task_id in phase.task_weights.keys() {
                    index.insert(task_id, plan_id);
                    task_statuses.insert(task_id, TaskStatus::Pending);
                }
            }
        }

        let tracked = TrackedPlan {
            entry: ExecutionMonitorEntry::new(plan_id, campaign_id, now),
            phases,
            task_statuses,
        };
        self.plans.write().await.insert(plan_id, tracked);
        info!(%plan_id, "Execution monitor tracking plan");
    }

    /// Record a task status transition belonging to a tracked plan.
    ///
    /// Unknown tasks (manual or trigger-emitted work) are ignored.
    pub async fn on_task_transition(&self, task: &AgentTask) {
        let plan_id = {
            let index = self.task_index.read().await;
            match index.get(&task.id) {
                Some(&plan_id) => plan_id,
                None => return,
            }
        };

        let now = self.clock.now();
        let mut completed_plan = None;
        {
            let mut plans = self.plans.write().await;
            let Some(tracked) = plans.get_mut(&plan_id) else {
                return;
            };
            tracked.task_statuses.insert(task.id, task.status);

            match task.status {
                TaskStatus::Running => {
                    tracked.entry.executing_agent = Some(task.agent_type.clone());
                }
                TaskStatus::Completed => {
                    // A completed task clears blockers held against its agent.
                    tracked.entry.clear_blockers_for(&task.agent_type, now);
                    if tracked.entry.executing_agent.as_deref() == Some(task.agent_type.as_str()) {
                        tracked.entry.executing_agent = None;
                    }
                }
                TaskStatus::Failed if task.is_permanently_failed() => {
                    let fallbacks = self.registry.fallbacks_for(&task.agent_type);
                    let detail = task
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "retries exhausted".to_string());
                    tracked.entry.add_blocker(
                        Blocker::new(
                            format!("task-failed:{}", task.agent_type),
                            detail,
                            task.agent_type.clone(),
                            now,
                        ),
                        now,
                    );
                    tracked.entry.fallback_agents = fallbacks;
                }
                _ => {}
            }

            let phase = tracked.current_phase();
            tracked.entry.current_phase = phase;
            let progress = if tracked.all_complete() {
                1.0
            } else {
                tracked.phase_progress(phase)
            };
            tracked.entry.record_progress(progress, now);

            if tracked.all_complete() {
                completed_plan = Some(plan_id);
            }
        }

        if let Some(plan_id) = completed_plan {
            debug!(%plan_id, "All plan tasks completed");
            self.remove_plan(plan_id).await;
            let _ = self.events.send(MonitorEvent::PlanCompleted { plan_id });
        }
    }

    /// Record a blocker straight from an agent invocation error.
    ///
    /// Used for transient faults (rate limits) that have not yet exhausted
    /// the task's retry budget.
    pub async fn report_invocation_blocker(&self, task: &AgentTask, error: &InvocationError) {
        let plan_id = {
            let index = self.task_index.read().await;
            match index.get(&task.id) {
                Some(&plan_id) => plan_id,
                None => return,
            }
        };

        let now = self.clock.now();
        let mut plans = self.plans.write().await;
        if let Some(tracked) = plans.get_mut(&plan_id) {
            let fallbacks = self.registry.fallbacks_for(&task.agent_type);
            tracked.entry.add_blocker(
                Blocker::new(
                    error.blocker_code(&task.agent_type),
                    error.to_string(),
                    task.agent_type.clone(),
                    now,
                ),
                now,
            );
            tracked.entry.fallback_agents = fallbacks;
            warn!(%plan_id, agent_type = %task.agent_type, "Blocker recorded: {error}");
        }
    }

    /// Current blockers for a plan, with available fallback agent types.
    pub async fn get_blockers(
        &self,
        plan_id: Uuid,
    ) -> CoordinationResult<(Vec<Blocker>, Vec<String>)> {
        let plans = self.plans.read().await;
        let tracked = plans
            .get(&plan_id)
            .ok_or(CoordinationError::PlanNotFound(plan_id))?;
        Ok((
            tracked.entry.blockers.clone(),
            tracked.entry.fallback_agents.clone(),
        ))
    }

    /// Snapshot of every tracked entry.
    pub async fn entries(&self) -> Vec<ExecutionMonitorEntry> {
        self.plans
            .read()
            .await
            .values()
            .map(|t| t.entry.clone())
            .collect()
    }

    /// Raise replanning requests for blockers that persisted past the
    /// configured escalation duration.
    #[instrument(skip(self))]
    pub async fn escalate_stale_blockers(&self) -> usize {
        let now = self.clock.now();
        let threshold = chrono::Duration::seconds(self.config.blocker_escalation_secs as i64);
        let mut escalated = 0;

        let mut plans = self.plans.write().await;
        for tracked in plans.values_mut() {
            let plan_id = tracked.entry.plan_id;
            for blocker in &mut tracked.entry.blockers {
                if !blocker.escalated && blocker.age(now) >= threshold {
                    blocker.escalated = true;
                    escalated += 1;
                    warn!(%plan_id, code = %blocker.code, "Blocker persisted; requesting replanning");
                    let _ = self.events.send(MonitorEvent::ReplanNeeded {
                        plan_id,
                        reason: format!(
                            "blocker {} persisted beyond {}s",
                            blocker.code, self.config.blocker_escalation_secs
                        ),
                    });
                }
            }
        }
        escalated
    }

    /// Stop tracking a plan (it reached a terminal status).
    pub async fn remove_plan(&self, plan_id: Uuid) {
        let removed = self.plans.write().await.remove(&plan_id);
        if let Some(tracked) = removed {
            let mut index = self.task_index.write().await;
            for phase in &tracked.phases {
                for task_id in phase.task_weights.keys() {
                    index.remove(task_id);
                }
            }
        }
    }

    /// Stop tracking every plan of a campaign; returns the plan ids dropped.
    pub async fn remove_campaign(&self, campaign_id: Uuid) -> Vec<Uuid> {
        let plan_ids: Vec<Uuid> = self
            .plans
            .read()
            .await
            .values()
            .filter(|t| t.entry.campaign_id == campaign_id)
            .map(|t| t.entry.plan_id)
            .collect();
        for plan_id in &plan_ids {
            self.remove_plan(*plan_id).await;
        }
        plan_ids
    }

    /// Stop tracking everything; returns the plan ids dropped.
    pub async fn remove_all(&self) -> Vec<Uuid> {
        let plan_ids: Vec<Uuid> = self
            .plans
            .read()
            .await
            .values()
            .map(|t| t.entry.plan_id)
            .collect();
        for plan_id in &plan_ids {
            self.remove_plan(*plan_id).await;
        }
        plan_ids
    }
}
