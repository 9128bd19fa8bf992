//! Coordination facade.
//!
//! Wires the scheduler, trigger engine, planning mesh, and execution
//! monitor together, exposes the boundary operations, and derives the
//! system-wide coordination snapshot. Transport, authentication, and
//! persistence sit outside this boundary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::CoordinationResult;
use crate::domain::models::{
    AgentTask, CoordinationState, CoordinatorConfig, ExecutionMonitorEntry, GoalPlan,
    GoalRequest, GoalSubmission, Trigger, TriggerEvaluation,
};
use crate::domain::ports::{AgentInvoker, CapabilityRegistry, Clock, MetricsSource};
use crate::services::execution_monitor::{ExecutionMonitor, MonitorEvent};
use crate::services::planning_mesh::PlanningMesh;
use crate::services::scheduler::{StopScope, TaskScheduler};
use crate::services::trigger_engine::TriggerEngine;

/// Root facade over the coordination core.
pub struct Coordinator {
    scheduler: Arc<TaskScheduler>,
    triggers: Arc<TriggerEngine>,
    mesh: Arc<PlanningMesh>,
    monitor: Arc<ExecutionMonitor>,
    monitor_events: Mutex<mpsc::UnboundedReceiver<MonitorEvent>>,
}

impl Coordinator {
    /// Assemble the core from its injected collaborators.
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<dyn CapabilityRegistry>,
        invoker: Arc<dyn AgentInvoker>,
        metrics: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (monitor, monitor_events) = ExecutionMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&clock),
            config.monitor.clone(),
        );
        let monitor = Arc::new(monitor);

        let scheduler = Arc::new(TaskScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&invoker),
            Arc::clone(&monitor),
            Arc::clone(&clock),
            config.scheduler.clone(),
        ));

        let triggers = Arc::new(TriggerEngine::new(
            Arc::clone(&registry),
            metrics,
            Arc::clone(&scheduler),
            Arc::clone(&clock),
            config.triggers.clone(),
        ));

        let mesh = Arc::new(PlanningMesh::new(
            registry,
            invoker,
            Arc::clone(&scheduler),
            Arc::clone(&monitor),
            clock,
            config.consensus.clone(),
        ));

        Self {
            scheduler,
            triggers,
            mesh,
            monitor,
            monitor_events: Mutex::new(monitor_events),
        }
    }

    /// Spawn the mesh's decomposition worker and the monitor-event pump.
    pub fn start(self: &Arc<Self>, poll_interval: Duration) -> Vec<tokio::task::JoinHandle<()>> {
        let mesh_handle = self.mesh.start(poll_interval);

        let this = Arc::clone(self);
        let pump_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                this.pump_monitor_events().await;
                this.monitor.escalate_stale_blockers().await;
            }
        });

        vec![mesh_handle, pump_handle]
    }

    /// Drain pending monitor events: completed plans are closed out and
    /// replanning requests re-enter the mesh. Exposed so deterministic
    /// tests can pump without the background loop.
    pub async fn pump_monitor_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let event = {
                let mut rx = self.monitor_events.lock().await;
                match rx.try_recv() {
                    Ok(event) => event,
                    Err(_) => break,
                }
            };
            handled += 1;
            match event {
                MonitorEvent::PlanCompleted { plan_id } => {
                    info!(%plan_id, "Plan completed");
                    if let Err(e) = self.mesh.mark_completed(plan_id).await {
                        warn!(%plan_id, "Completion bookkeeping failed: {e}");
                    }
                }
                MonitorEvent::ReplanNeeded { plan_id, reason } => {
                    if let Err(e) = self.mesh.trigger_replanning(plan_id, reason).await {
                        warn!(%plan_id, "Replanning request dropped: {e}");
                    }
                }
            }
        }
        handled
    }

    // -----------------------------------------------------------------
    // Boundary operations
    // -----------------------------------------------------------------

    /// Add a task to a campaign's DAG.
    pub async fn submit_task(
        &self,
        campaign_id: Uuid,
        mut task: AgentTask,
    ) -> CoordinationResult<Uuid> {
        task.campaign_id = campaign_id;
        self.scheduler.submit(task).await
    }

    /// Advance one campaign's scheduling.
    pub async fn tick(&self, campaign_id: Uuid) -> CoordinationResult<usize> {
        self.scheduler.tick(campaign_id).await
    }

    /// Advance every campaign.
    pub async fn tick_all(&self) -> CoordinationResult<usize> {
        self.scheduler.tick_all().await
    }

    /// Fetch a task by id.
    pub async fn get_task_status(&self, task_id: Uuid) -> CoordinationResult<AgentTask> {
        self.scheduler.get_task(task_id).await
    }

    /// Register a trigger for a campaign.
    pub async fn register_trigger(
        &self,
        campaign_id: Uuid,
        trigger: Trigger,
    ) -> CoordinationResult<Uuid> {
        self.triggers.register(campaign_id, trigger).await
    }

    /// Evaluate a campaign's triggers against its live metrics.
    pub async fn evaluate_triggers(
        &self,
        campaign_id: Uuid,
    ) -> CoordinationResult<Vec<TriggerEvaluation>> {
        self.triggers.evaluate(campaign_id).await
    }

    /// Submit a goal for asynchronous decomposition.
    pub async fn submit_goal(&self, request: GoalRequest) -> CoordinationResult<GoalSubmission> {
        self.mesh.submit_goal(request).await
    }

    /// Fetch a goal plan and its status.
    pub async fn get_goal_plan(&self, plan_id: Uuid) -> CoordinationResult<GoalPlan> {
        self.mesh.get_plan(plan_id).await
    }

    /// Supersede a plan and queue a replacement honoring the reason.
    pub async fn trigger_replanning(
        &self,
        plan_id: Uuid,
        reason: impl Into<String>,
    ) -> CoordinationResult<Uuid> {
        self.mesh.trigger_replanning(plan_id, reason).await
    }

    /// Live monitor entries for executing plans.
    pub async fn get_execution_monitors(&self) -> Vec<ExecutionMonitorEntry> {
        self.monitor.entries().await
    }

    /// Derived system-wide snapshot.
    pub async fn get_coordination_state(&self) -> CoordinationState {
        CoordinationState::compute(
            self.mesh.executing_count().await,
            self.mesh.queue_len().await,
            self.scheduler.agents_in_use().await,
            self.scheduler.capacity(),
            self.scheduler.stats().completed(),
            self.scheduler.stats().failed(),
        )
    }

    /// Cancel in-flight work in scope; running tasks fail without
    /// consuming a retry and active plans fail. Returns the number of
    /// stopped operations (tasks plus plans).
    #[instrument(skip(self))]
    pub async fn emergency_stop(&self, scope: StopScope) -> usize {
        let stopped_tasks = self.scheduler.emergency_stop(scope).await;
        let campaign = match scope {
            StopScope::Campaign(id) => Some(id),
            StopScope::System => None,
        };
        let failed_plans = self.mesh.fail_active_plans(campaign).await;
        match campaign {
            Some(id) => {
                self.monitor.remove_campaign(id).await;
            }
            None => {
                self.monitor.remove_all().await;
            }
        }
        warn!(
            stopped_tasks,
            failed_plans = failed_plans.len(),
            "Emergency stop complete"
        );
        stopped_tasks + failed_plans.len()
    }

    /// Lift an emergency stop so the scope accepts submissions again.
    pub async fn resume(&self, scope: StopScope) {
        self.scheduler.resume(scope).await;
    }

    /// Drain the mesh's decomposition queue synchronously (test helper and
    /// embedding hook for callers that drive their own cadence).
    pub async fn process_goal_queue(&self) -> usize {
        self.mesh.process_queue().await
    }

    /// Recent trigger evaluation log for a campaign.
    pub async fn trigger_log(&self, campaign_id: Uuid) -> Vec<TriggerEvaluation> {
        self.triggers.evaluation_log(campaign_id).await
    }

    /// Toggle a registered trigger.
    pub async fn set_trigger_active(
        &self,
        trigger_id: Uuid,
        active: bool,
    ) -> CoordinationResult<()> {
        self.triggers.set_active(trigger_id, active).await
    }

    /// Escalate blockers that persisted past the configured duration.
    pub async fn escalate_stale_blockers(&self) -> usize {
        self.monitor.escalate_stale_blockers().await
    }
}
