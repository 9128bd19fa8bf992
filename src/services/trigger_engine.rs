//! Trigger evaluation engine.
//!
//! Polls campaign metric snapshots and evaluates every active trigger
//! against its structured condition. Firings are debounced by a cooldown
//! window; evaluations for the same campaign serialize around the
//! trigger's last-fired check-and-set, so concurrent polls cannot
//! double-fire within one window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{
    AgentTask, TaskPriority, TaskSource, Trigger, TriggerConfig, TriggerEvaluation,
    TriggerOutcome,
};
use crate::domain::ports::{CapabilityRegistry, Clock, MetricsSource};
use crate::services::scheduler::TaskScheduler;

/// Poll-and-debounce trigger engine.
pub struct TriggerEngine {
    registry: Arc<dyn CapabilityRegistry>,
    metrics: Arc<dyn MetricsSource>,
    scheduler: Arc<TaskScheduler>,
    clock: Arc<dyn Clock>,
    config: TriggerConfig,
    /// Campaign id -> registered triggers
    triggers: RwLock<HashMap<Uuid, Vec<Trigger>>>,
    /// Per-campaign evaluation gates; serializes same-campaign polls
    eval_gates: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Bounded per-campaign evaluation log
    log: RwLock<HashMap<Uuid, VecDeque<TriggerEvaluation>>>,
}

impl TriggerEngine {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        metrics: Arc<dyn MetricsSource>,
        scheduler: Arc<TaskScheduler>,
        clock: Arc<dyn Clock>,
        config: TriggerConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            scheduler,
            clock,
            config,
            triggers: RwLock::new(HashMap::new()),
            eval_gates: Mutex::new(HashMap::new()),
            log: RwLock::new(HashMap::new()),
        }
    }

    /// Register a trigger for a campaign.
    ///
    /// Triggers registered with a zero cooldown get the configured default.
    #[instrument(skip(self, trigger), fields(%campaign_id, trigger = %trigger.name))]
    pub async fn register(
        &self,
        campaign_id: Uuid,
        mut trigger: Trigger,
    ) -> CoordinationResult<Uuid> {
        trigger.campaign_id = campaign_id;
        if trigger.cooldown.is_zero() {
            trigger.cooldown = Duration::from_secs(self.config.default_cooldown_secs);
        }
        trigger
            .validate()
            .map_err(CoordinationError::ValidationFailed)?;
        if !self.registry.contains(&trigger.target_agent) {
            return Err(CoordinationError::UnknownAgentType(
                trigger.target_agent.clone(),
            ));
        }

        let id = trigger.id;
        self.triggers
            .write()
            .await
            .entry(campaign_id)
            .or_default()
            .push(trigger);
        info!(%campaign_id, trigger_id = %id, "Trigger registered");
        Ok(id)
    }

    /// Toggle a trigger active/inactive.
    pub async fn set_active(&self, trigger_id: Uuid, active: bool) -> CoordinationResult<()> {
        let mut triggers = self.triggers.write().await;
        for list in triggers.values_mut() {
            if let Some(trigger) = list.iter_mut().find(|t| t.id == trigger_id) {
                trigger.active = active;
                return Ok(());
            }
        }
        Err(CoordinationError::TriggerNotFound(trigger_id))
    }

    /// Fetch a registered trigger.
    pub async fn get(&self, trigger_id: Uuid) -> CoordinationResult<Trigger> {
        let triggers = self.triggers.read().await;
        triggers
            .values()
            .flatten()
            .find(|t| t.id == trigger_id)
            .cloned()
            .ok_or(CoordinationError::TriggerNotFound(trigger_id))
    }

    /// Evaluate every trigger of a campaign against its current metric
    /// snapshot. Safe to call repeatedly and concurrently; same-campaign
    /// calls serialize so a condition that holds across overlapping polls
    /// still fires at most once per cooldown window.
    #[instrument(skip(self), fields(%campaign_id))]
    pub async fn evaluate(&self, campaign_id: Uuid) -> CoordinationResult<Vec<TriggerEvaluation>> {
        let gate = self.gate_for(campaign_id).await;
        let _guard = gate.lock().await;

        let snapshot = self
            .metrics
            .snapshot(campaign_id)
            .await
            .map_err(|_| CoordinationError::MetricsUnavailable(campaign_id))?;

        let trigger_ids: Vec<Uuid> = {
            let triggers = self.triggers.read().await;
            triggers
                .get(&campaign_id)
                .map(|list| list.iter().map(|t| t.id).collect())
                .unwrap_or_default()
        };

        let mut evaluations = Vec::with_capacity(trigger_ids.len());
        for trigger_id in trigger_ids {
            let now = self.clock.now();
            let trigger = {
                let triggers = self.triggers.read().await;
                match triggers
                    .get(&campaign_id)
                    .and_then(|list| list.iter().find(|t| t.id == trigger_id))
                {
                    Some(t) => t.clone(),
                    None => continue,
                }
            };

            let metric_value = snapshot.get(&trigger.condition.metric);
            let outcome = if !trigger.active {
                TriggerOutcome::Inactive
            } else {
                match metric_value {
                    None => TriggerOutcome::MetricMissing,
                    Some(value) if !trigger.condition.is_met(value) => {
                        TriggerOutcome::ConditionNotMet
                    }
                    Some(_) if trigger.in_cooldown(now) => TriggerOutcome::CooldownActive,
                    Some(_) => TriggerOutcome::Fired,
                }
            };

            // An emergency stop rejecting the emitted task propagates out;
            // the trigger's last-fired stamp is left untouched in that case.
            let task_id = if outcome == TriggerOutcome::Fired {
                Some(self.fire(&trigger, now).await?)
            } else {
                None
            };

            let evaluation = TriggerEvaluation {
                trigger_id: trigger.id,
                campaign_id,
                outcome,
                metric_value,
                task_id,
                evaluated_at: now,
            };
            debug!(
                trigger_id = %trigger.id,
                outcome = evaluation.outcome.as_str(),
                value = ?metric_value,
                "Trigger evaluated"
            );
            evaluations.push(evaluation);
        }

        self.append_log(campaign_id, &evaluations).await;
        Ok(evaluations)
    }

    /// Emit the urgent corrective task and stamp the trigger's last-fired
    /// time. Called with the campaign's evaluation gate held.
    async fn fire(&self, trigger: &Trigger, now: chrono::DateTime<chrono::Utc>) -> CoordinationResult<Uuid> {
        let task = AgentTask::new(
            trigger.campaign_id,
            trigger.target_agent.clone(),
            trigger.action_description.clone(),
        )
        .with_priority(TaskPriority::Urgent)
        .with_source(TaskSource::Trigger {
            trigger_id: trigger.id,
        });

        let task_id = self.scheduler.submit(task).await?;

        let mut triggers = self.triggers.write().await;
        if let Some(stored) = triggers
            .get_mut(&trigger.campaign_id)
            .and_then(|list| list.iter_mut().find(|t| t.id == trigger.id))
        {
            stored.record_fired(now);
        }
        info!(trigger_id = %trigger.id, %task_id, "Trigger fired");
        Ok(task_id)
    }

    /// Recent evaluation-log entries for a campaign, oldest first.
    pub async fn evaluation_log(&self, campaign_id: Uuid) -> Vec<TriggerEvaluation> {
        self.log
            .read()
            .await
            .get(&campaign_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn append_log(&self, campaign_id: Uuid, evaluations: &[TriggerEvaluation]) {
        let mut log = self.log.write().await;
        let entries = log.entry(campaign_id).or_default();
        for evaluation in evaluations {
            entries.push_back(evaluation.clone());
            while entries.len() > self.config.evaluation_log_size {
                entries.pop_front();
            }
        }
    }

    async fn gate_for(&self, campaign_id: Uuid) -> Arc<Mutex<()>> {
        let mut gates = self.eval_gates.lock().await;
        gates
            .entry(campaign_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
