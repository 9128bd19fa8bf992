//! Goal planning and consensus mesh.
//!
//! Accepts free-form business goals, decomposes them into subgoals and an
//! agent execution sequence, scores agreement among proposing agents, and
//! replans around blockers. Accepted plans are instantiated as task DAGs
//! in the scheduler and handed to the execution monitor.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{
    AgentPhase, AgentSequence, AgentTask, Complexity, ConsensusConfig, ConsensusOutcome,
    GoalPlan, GoalRequest, GoalSubmission, PlanStatus, Subgoal, TaskSource,
};
use crate::domain::ports::{AgentInvoker, CapabilityRegistry, Clock, PhaseProposal};
use crate::services::execution_monitor::{ExecutionMonitor, PhaseTasks};
use crate::services::scheduler::TaskScheduler;

/// Baseline estimate for one decomposed subgoal, in seconds.
const SUBGOAL_ESTIMATE_SECS: u64 = 1800;

/// Outcome of one decomposition pass.
struct Decomposition {
    subgoals: Vec<Subgoal>,
    sequence: AgentSequence,
    complexity: Complexity,
    risk_factors: Vec<String>,
    estimated_total_secs: u64,
}

/// Goal planning and consensus mesh.
pub struct PlanningMesh {
    registry: Arc<dyn CapabilityRegistry>,
    invoker: Arc<dyn AgentInvoker>,
    scheduler: Arc<TaskScheduler>,
    monitor: Arc<ExecutionMonitor>,
    clock: Arc<dyn Clock>,
    config: ConsensusConfig,
    plans: RwLock<HashMap<Uuid, GoalPlan>>,
    /// Originating requests, retained for replanning
    requests: RwLock<HashMap<Uuid, GoalRequest>>,
    queue: RwLock<VecDeque<Uuid>>,
    running: Arc<AtomicBool>,
}

impl PlanningMesh {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        invoker: Arc<dyn AgentInvoker>,
        scheduler: Arc<TaskScheduler>,
        monitor: Arc<ExecutionMonitor>,
        clock: Arc<dyn Clock>,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            registry,
            invoker,
            scheduler,
            monitor,
            clock,
            config,
            plans: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            queue: RwLock::new(VecDeque::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Enqueue a goal for asynchronous decomposition.
    #[instrument(skip(self, request), fields(campaign_id = %request.campaign_id))]
    pub async fn submit_goal(&self, request: GoalRequest) -> CoordinationResult<GoalSubmission> {
        if self.scheduler.is_halted(request.campaign_id).await {
            return Err(CoordinationError::EmergencyStopInProgress);
        }
        request
            .validate()
            .map_err(CoordinationError::ValidationFailed)?;

        let plan = GoalPlan::queued(&request);
        let request_id = plan.id;
        self.plans.write().await.insert(plan.id, plan);
        self.requests.write().await.insert(request_id, request);

        let queue_position = {
            let mut queue = self.queue.write().await;
            queue.push_back(request_id);
            queue.len()
        };

        info!(%request_id, queue_position, "Goal submitted");
        Ok(GoalSubmission {
            request_id,
            queue_position,
            estimated_processing_secs: queue_position as u64 * self.config.processing_estimate_secs,
        })
    }

    /// Current plan state by id.
    pub async fn get_plan(&self, plan_id: Uuid) -> CoordinationResult<GoalPlan> {
        self.plans
            .read()
            .await
            .get(&plan_id)
            .cloned()
            .ok_or(CoordinationError::PlanNotFound(plan_id))
    }

    /// All plans (observability helper).
    pub async fn plans(&self) -> Vec<GoalPlan> {
        self.plans.read().await.values().cloned().collect()
    }

    /// Plans currently in `executing` status.
    pub async fn executing_count(&self) -> usize {
        self.plans
            .read()
            .await
            .values()
            .filter(|p| p.status == PlanStatus::Executing)
            .count()
    }

    /// Goal submissions waiting for a decomposition worker.
    pub async fn queue_len(&self) -> usize {
        self.queue.read().await.len()
    }

    /// Pop and process one queued goal. Returns the plan id processed.
    pub async fn process_next(&self) -> Option<Uuid> {
        let request_id = self.queue.write().await.pop_front()?;
        let request = self.requests.read().await.get(&request_id).cloned()?;
        self.process(&request).await;
        Some(request_id)
    }

    /// Drain the decomposition queue; returns how many goals were processed.
    pub async fn process_queue(&self) -> usize {
        let mut processed = 0;
        while self.process_next().await.is_some() {
            processed += 1;
        }
        processed
    }

    /// Spawn the interval-driven queue worker.
    pub fn start(self: &Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let mesh = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            while mesh.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                mesh.process_queue().await;
            }
        })
    }

    /// Stop the queue worker after its current pass.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Decompose, reach consensus, and launch one goal.
    #[instrument(skip(self, request), fields(plan_id = %request.id))]
    async fn process(&self, request: &GoalRequest) {
        if self
            .update_plan(request.id, |plan| plan.transition_to(PlanStatus::Planning))
            .await
            .is_err()
        {
            return;
        }

        let mut attempt = 0;
        loop {
            let relaxed = attempt > 0;
            let decomposition = match self.decompose(request, relaxed) {
                Ok(d) => d,
                Err(e) => {
                    self.fail_plan(request.id, e.to_string()).await;
                    return;
                }
            };

            if let Err(stuck) = decomposition.sequence.validate_acyclic() {
                self.fail_plan(
                    request.id,
                    format!("decomposed phase graph is cyclic at phases {stuck:?}"),
                )
                .await;
                return;
            }

            let snapshot = match self
                .update_plan(request.id, |plan| {
                    plan.subgoals = decomposition.subgoals.clone();
                    plan.sequence = decomposition.sequence.clone();
                    plan.complexity = decomposition.complexity;
                    plan.risk_factors = decomposition.risk_factors.clone();
                    plan.estimated_total_secs = decomposition.estimated_total_secs;
                    plan.transition_to(PlanStatus::Consensus)
                })
                .await
            {
                Ok(plan) => plan,
                Err(_) => return,
            };

            let proposals = self.gather_proposals(&snapshot).await;
            let outcome = self.score_consensus(&snapshot, &proposals);
            debug!(
                plan_id = %request.id,
                score = outcome.score,
                proposals = outcome.proposals,
                "Consensus scored"
            );

            if outcome.score >= self.config.quorum_threshold {
                self.launch(request, outcome).await;
                return;
            }

            attempt += 1;
            if attempt < self.config.max_decomposition_attempts {
                info!(plan_id = %request.id, "Consensus below quorum; retrying with relaxed constraints");
                if self
                    .update_plan(request.id, |plan| plan.transition_to(PlanStatus::Planning))
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }

            let reason = CoordinationError::ConsensusNotReached {
                score: outcome.score,
                quorum: self.config.quorum_threshold,
            };
            self.fail_plan(request.id, reason.to_string()).await;
            return;
        }
    }

    /// Expand a goal into subgoals and a stage-ordered phase DAG.
    fn decompose(
        &self,
        request: &GoalRequest,
        relaxed: bool,
    ) -> CoordinationResult<Decomposition> {
        let capabilities = self.resolve_capabilities(request)?;

        // Pick the providing agent per capability and order phases by the
        // agent's campaign stage; later stages consume earlier output.
        let mut assignments: Vec<(String, String)> = Vec::new(); // (capability, agent)
        for capability in &capabilities {
            let agents = self.registry.agents_with_capability(capability);
            let agent = agents
                .into_iter()
                .next()
                .ok_or_else(|| CoordinationError::UnknownAgentType(capability.clone()))?;
            assignments.push((capability.clone(), agent));
        }
        assignments.sort_by_key(|(_, agent)| {
            self.registry
                .profile(agent)
                .map(|p| p.stage)
                .unwrap_or_default()
        });

        let title = request
            .description
            .lines()
            .next()
            .unwrap_or(&request.description)
            .trim()
            .to_string();

        let mut subgoals = Vec::with_capacity(assignments.len());
        let mut phases = Vec::with_capacity(assignments.len());
        for (index, (capability, agent)) in assignments.iter().enumerate() {
            let stage = self
                .registry
                .profile(agent)
                .map(|p| p.stage)
                .unwrap_or_default();

            subgoals.push(Subgoal {
                id: Uuid::new_v4(),
                description: format!("Deliver {capability} for: {title}"),
                required_capabilities: vec![capability.clone()],
                priority: request.priority,
                estimated_duration_secs: SUBGOAL_ESTIMATE_SECS,
                success_criteria: vec![
                    format!("{capability} output accepted by review"),
                    "result quality score at or above 0.7".to_string(),
                ],
            });

            // A phase depends on every earlier-stage phase; same-stage
            // phases run independently.
            let depends_on: Vec<usize> = assignments[..index]
                .iter()
                .enumerate()
                .filter(|(_, (_, earlier_agent))| {
                    self.registry
                        .profile(earlier_agent)
                        .map(|p| p.stage)
                        .unwrap_or_default()
                        < stage
                })
                .map(|(i, _)| i)
                .collect();

            phases.push(AgentPhase {
                index,
                agent_type: agent.clone(),
                tasks: vec![format!("Deliver {capability} for: {title}")],
                depends_on,
                estimated_duration_secs: SUBGOAL_ESTIMATE_SECS,
                fallback_agents: self.registry.fallbacks_for(agent),
            });
        }

        let constraints: &[String] = if relaxed { &[] } else { &request.constraints };
        let complexity = classify_complexity(phases.len(), constraints.len());

        let mut risk_factors: Vec<String> = constraints
            .iter()
            .map(|c| format!("constraint: {c}"))
            .collect();
        for phase in &phases {
            if phase.fallback_agents.is_empty() {
                risk_factors.push(format!("no fallback agent for {}", phase.agent_type));
            }
        }
        if complexity == Complexity::Critical {
            risk_factors.push("critical complexity: wide phase spread".to_string());
        }

        let sequence = AgentSequence::new(phases);
        let estimated_total_secs =
            (sequence.total_estimated_secs() as f64 * complexity.risk_multiplier()).round() as u64;

        Ok(Decomposition {
            subgoals,
            sequence,
            complexity,
            risk_factors,
            estimated_total_secs,
        })
    }

    /// Required capabilities: explicit on the request, otherwise matched
    /// from the registry's declared capability names against the goal text.
    fn resolve_capabilities(&self, request: &GoalRequest) -> CoordinationResult<Vec<String>> {
        if !request.required_capabilities.is_empty() {
            return Ok(request.required_capabilities.clone());
        }

        let haystack = request.description.to_lowercase();
        let matched: Vec<String> = self
            .registry
            .capability_names()
            .into_iter()
            .filter(|name| {
                let spaced = name.replace('-', " ");
                haystack.contains(name.as_str()) || haystack.contains(&spaced)
            })
            .collect();

        if matched.is_empty() {
            return Err(CoordinationError::ValidationFailed(
                "no registered capability matches the goal description".to_string(),
            ));
        }
        Ok(matched)
    }

    /// Ask each agent type in the sequence to weigh in on the plan.
    ///
    /// Agents *may* propose; invocation errors simply drop that vote.
    async fn gather_proposals(&self, plan: &GoalPlan) -> Vec<PhaseProposal> {
        let mut agent_types: Vec<String> = plan
            .sequence
            .phases
            .iter()
            .map(|p| p.agent_type.clone())
            .collect();
        agent_types.sort();
        agent_types.dedup();

        let mut proposals = Vec::with_capacity(agent_types.len());
        for agent_type in agent_types {
            match self.invoker.propose(&agent_type, plan).await {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => debug!(%agent_type, "Proposal skipped: {e}"),
            }
        }
        proposals
    }

    /// Consensus score: mean proposal confidence weighted by the fraction
    /// of proposals matching the chosen phase order. No proposals at all
    /// count as trivial unanimity.
    fn score_consensus(&self, plan: &GoalPlan, proposals: &[PhaseProposal]) -> ConsensusOutcome {
        let now = self.clock.now();
        if proposals.is_empty() {
            return ConsensusOutcome {
                score: 1.0,
                proposals: 0,
                agreeing: 0,
                average_confidence: 1.0,
                reached_at: now,
            };
        }

        let order = plan.sequence.order();
        let agreeing = proposals.iter().filter(|p| p.agrees_with(&order)).count();
        let average_confidence =
            proposals.iter().map(|p| p.confidence).sum::<f64>() / proposals.len() as f64;
        let score = average_confidence * (agreeing as f64 / proposals.len() as f64);

        ConsensusOutcome {
            score,
            proposals: proposals.len(),
            agreeing,
            average_confidence,
            reached_at: now,
        }
    }

    /// Instantiate the accepted plan as a task DAG and begin execution.
    async fn launch(&self, request: &GoalRequest, outcome: ConsensusOutcome) {
        let snapshot = match self
            .update_plan(request.id, |plan| {
                plan.consensus = Some(outcome.clone());
                plan.transition_to(PlanStatus::Executing)
            })
            .await
        {
            Ok(plan) => plan,
            Err(_) => return,
        };

        let mut tasks: Vec<AgentTask> = Vec::new();
        let mut phase_task_ids: HashMap<usize, Vec<Uuid>> = HashMap::new();
        let mut phase_tasks: Vec<PhaseTasks> = Vec::new();

        for phase in &snapshot.sequence.phases {
            let dep_ids: Vec<Uuid> = phase
                .depends_on
                .iter()
                .flat_map(|dep| phase_task_ids.get(dep).cloned().unwrap_or_default())
                .collect();

            let stage = self
                .registry
                .profile(&phase.agent_type)
                .map(|p| p.stage)
                .unwrap_or_default();

            let mut weights = HashMap::new();
            let mut ids = Vec::with_capacity(phase.tasks.len());
            for description in &phase.tasks {
                let task = AgentTask::new(
                    snapshot.campaign_id,
                    phase.agent_type.clone(),
                    description.clone(),
                )
                .with_priority(request.priority)
                .with_stage(stage)
                .with_estimated_duration(phase.estimated_duration_secs)
                .with_source(TaskSource::Plan {
                    plan_id: snapshot.id,
                })
                .with_dependencies(dep_ids.iter().copied());
                weights.insert(task.id, phase.estimated_duration_secs.max(1));
                ids.push(task.id);
                tasks.push(task);
            }
            phase_task_ids.insert(phase.index, ids);
            phase_tasks.push(PhaseTasks {
                phase_index: phase.index,
                agent_type: phase.agent_type.clone(),
                task_weights: weights,
            });
        }

        match self
            .scheduler
            .submit_batch(snapshot.campaign_id, tasks)
            .await
        {
            Ok(ids) => {
                self.monitor
                    .track_plan(snapshot.id, snapshot.campaign_id, phase_tasks)
                    .await;
                info!(plan_id = %snapshot.id, tasks = ids.len(), "Plan executing");
            }
            Err(e) => {
                warn!(plan_id = %snapshot.id, "Plan task instantiation rejected: {e}");
                self.fail_plan(snapshot.id, e.to_string()).await;
            }
        }
    }

    /// Mark an existing plan superseded and queue a replacement built from
    /// the original goal plus the supplied reason as an extra constraint.
    /// The superseded plan's historical record is left intact.
    #[instrument(skip(self, reason), fields(%plan_id))]
    pub async fn trigger_replanning(
        &self,
        plan_id: Uuid,
        reason: impl Into<String>,
    ) -> CoordinationResult<Uuid> {
        let reason = reason.into();
        let original = {
            let plans = self.plans.read().await;
            let plan = plans
                .get(&plan_id)
                .ok_or(CoordinationError::PlanNotFound(plan_id))?;
            if plan.is_terminal() {
                return Err(CoordinationError::InvalidStateTransition {
                    from: plan.status.as_str().to_string(),
                    to: PlanStatus::Superseded.as_str().to_string(),
                    reason: "plan already reached a terminal status".to_string(),
                });
            }
            self.requests
                .read()
                .await
                .get(&plan_id)
                .cloned()
                .ok_or(CoordinationError::PlanNotFound(plan_id))?
        };

        let mut replacement = GoalRequest::new(original.campaign_id, original.description.clone())
            .with_priority(original.priority)
            .with_constraint(format!("replanning: {reason}"));
        for constraint in &original.constraints {
            replacement = replacement.with_constraint(constraint.clone());
        }
        for capability in &original.required_capabilities {
            replacement = replacement.with_capability(capability.clone());
        }

        let mut new_plan = GoalPlan::queued(&replacement);
        new_plan.replaces = Some(plan_id);
        let new_id = new_plan.id;

        {
            let mut plans = self.plans.write().await;
            let plan = plans
                .get_mut(&plan_id)
                .ok_or(CoordinationError::PlanNotFound(plan_id))?;
            plan.transition_to(PlanStatus::Superseded)
                .map_err(|reason| CoordinationError::InvalidStateTransition {
                    from: plan.status.as_str().to_string(),
                    to: PlanStatus::Superseded.as_str().to_string(),
                    reason,
                })?;
            plan.superseded_by = Some(new_id);
            plans.insert(new_id, new_plan);
        }
        self.requests.write().await.insert(new_id, replacement);
        self.queue.write().await.push_back(new_id);
        self.monitor.remove_plan(plan_id).await;

        info!(%plan_id, %new_id, "Replanning triggered: {reason}");
        Ok(new_id)
    }

    /// Mark an executing plan completed (driven by the monitor's
    /// plan-completed event).
    pub async fn mark_completed(&self, plan_id: Uuid) -> CoordinationResult<()> {
        self.update_plan(plan_id, |plan| plan.transition_to(PlanStatus::Completed))
            .await
            .map(|_| ())
    }

    /// Fail every non-terminal plan in scope; used by emergency stop.
    /// Returns the ids of the plans that were failed.
    pub async fn fail_active_plans(&self, campaign_id: Option<Uuid>) -> Vec<Uuid> {
        let mut failed = Vec::new();
        {
            let mut plans = self.plans.write().await;
            for plan in plans.values_mut() {
                let in_scope = campaign_id.is_none_or(|id| plan.campaign_id == id);
                if in_scope && !plan.is_terminal() {
                    if plan.transition_to(PlanStatus::Failed).is_ok() {
                        plan.failure_reason = Some("emergency stop".to_string());
                        failed.push(plan.id);
                    }
                }
            }
        }
        // Their queued requests are no longer processable.
        self.queue.write().await.retain(|id| !failed.contains(id));
        failed
    }

    async fn fail_plan(&self, plan_id: Uuid, reason: String) {
        warn!(%plan_id, "Plan failed: {reason}");
        let _ = self
            .update_plan(plan_id, |plan| {
                plan.failure_reason = Some(reason.clone());
                plan.transition_to(PlanStatus::Failed)
            })
            .await;
    }

    async fn update_plan<F>(&self, plan_id: Uuid, mutate: F) -> CoordinationResult<GoalPlan>
    where
        F: FnOnce(&mut GoalPlan) -> Result<(), String>,
    {
        let mut plans = self.plans.write().await;
        let plan = plans
            .get_mut(&plan_id)
            .ok_or(CoordinationError::PlanNotFound(plan_id))?;
        mutate(plan).map_err(|reason| CoordinationError::InvalidStateTransition {
            from: plan.status.as_str().to_string(),
            to: "requested".to_string(),
            reason,
        })?;
        Ok(plan.clone())
    }
}

/// Complexity from decomposition breadth: phase count plus constraint load.
fn classify_complexity(phase_count: usize, constraint_count: usize) -> Complexity {
    match phase_count + constraint_count {
        0..=2 => Complexity::Low,
        3..=4 => Complexity::Medium,
        5..=6 => Complexity::High,
        _ => Complexity::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_complexity() {
        assert_eq!(classify_complexity(1, 0), Complexity::Low);
        assert_eq!(classify_complexity(3, 1), Complexity::Medium);
        assert_eq!(classify_complexity(4, 2), Complexity::High);
        assert_eq!(classify_complexity(6, 3), Complexity::Critical);
    }
}
