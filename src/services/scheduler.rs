//! Task dependency scheduler.
//!
//! Owns the DAG of agent tasks for each campaign. `tick()` selects every
//! task whose dependencies are satisfied, orders by priority (urgent >
//! high > medium > low, tie-break earliest creation), respects per-agent-
//! type concurrency limits, and drives the task status state machine with
//! exponential-backoff retries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{AgentTask, SchedulerConfig, TaskResult, TaskStatus};
use crate::domain::ports::{AgentInvoker, CapabilityRegistry, Clock, InvocationError};
use crate::services::dependency_graph::DependencyGraph;
use crate::services::execution_monitor::ExecutionMonitor;

/// Scope of an emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopScope {
    /// One campaign's in-flight work
    Campaign(Uuid),
    /// Everything
    System,
}

/// Rolling task-settlement counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl SchedulerStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct CampaignBoard {
    tasks: HashMap<Uuid, AgentTask>,
}

struct InFlight {
    campaign_id: Uuid,
    handle: JoinHandle<()>,
}

/// Dependency-aware task scheduler for campaign DAGs.
pub struct TaskScheduler {
    registry: Arc<dyn CapabilityRegistry>,
    invoker: Arc<dyn AgentInvoker>,
    monitor: Arc<ExecutionMonitor>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    graph: DependencyGraph,
    boards: RwLock<HashMap<Uuid, CampaignBoard>>,
    /// Task id -> campaign id
    task_index: RwLock<HashMap<Uuid, Uuid>>,
    /// Per-agent-type concurrency gates, created lazily
    slots: Mutex<HashMap<String, Arc<Semaphore>>>,
    in_flight: Mutex<HashMap<Uuid, InFlight>>,
    halted_system: AtomicBool,
    halted_campaigns: RwLock<HashSet<Uuid>>,
    stats: SchedulerStats,
}

impl TaskScheduler {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        invoker: Arc<dyn AgentInvoker>,
        monitor: Arc<ExecutionMonitor>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            invoker,
            monitor,
            clock,
            config,
            graph: DependencyGraph::new(),
            boards: RwLock::new(HashMap::new()),
            task_index: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            halted_system: AtomicBool::new(false),
            halted_campaigns: RwLock::new(HashSet::new()),
            stats: SchedulerStats::default(),
        }
    }

    /// Check whether submissions for a campaign are currently rejected.
    pub async fn is_halted(&self, campaign_id: Uuid) -> bool {
        self.halted_system.load(Ordering::SeqCst)
            || self.halted_campaigns.read().await.contains(&campaign_id)
    }

    /// Submit one task into its campaign's DAG.
    ///
    /// Structural problems (unknown agent type, missing dependency,
    /// dependency cycle) are rejected here and never enter the graph.
    #[instrument(skip(self, task), fields(task_id = %task.id, campaign_id = %task.campaign_id))]
    pub async fn submit(&self, task: AgentTask) -> CoordinationResult<Uuid> {
        let ids = self.submit_batch(task.campaign_id, vec![task]).await?;
        Ok(ids[0])
    }

    /// Submit a batch of tasks atomically: either every task enters the
    /// campaign DAG or none does.
    #[instrument(skip(self, tasks), fields(%campaign_id, count = tasks.len()))]
    pub async fn submit_batch(
        &self,
        campaign_id: Uuid,
        tasks: Vec<AgentTask>,
    ) -> CoordinationResult<Vec<Uuid>> {
        if self.is_halted(campaign_id).await {
            return Err(CoordinationError::EmergencyStopInProgress);
        }

        for task in &tasks {
            if task.campaign_id != campaign_id {
                return Err(CoordinationError::ValidationFailed(
                    "All tasks in a batch must belong to the same campaign".to_string(),
                ));
            }
            task.validate()
                .map_err(CoordinationError::ValidationFailed)?;
            if !self.registry.contains(&task.agent_type) {
                return Err(CoordinationError::UnknownAgentType(task.agent_type.clone()));
            }
        }

        let mut boards = self.boards.write().await;
        let board = boards.entry(campaign_id).or_default();

        // Validate the whole batch against the existing board before
        // mutating anything.
        let existing: Vec<AgentTask> = board.tasks.values().cloned().collect();
        let mut combined = existing;
        combined.extend(tasks.iter().cloned());

        for task in &tasks {
            self.graph.validate_dependencies(task, &combined)?;
        }
        if let Some(cycle) = self.graph.detect_cycle(&combined) {
            warn!(%campaign_id, "Rejecting submission: dependency cycle");
            return Err(CoordinationError::DependencyCycle(cycle));
        }

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        {
            let mut index = self.task_index.write().await;
            for task in tasks {
                index.insert(task.id, campaign_id);
                board.tasks.insert(task.id, task);
            }
        }
        info!(%campaign_id, count = ids.len(), "Tasks submitted");
        Ok(ids)
    }

    /// Fetch a task by id.
    pub async fn get_task(&self, task_id: Uuid) -> CoordinationResult<AgentTask> {
        let campaign_id = {
            let index = self.task_index.read().await;
            index
                .get(&task_id)
                .copied()
                .ok_or(CoordinationError::TaskNotFound(task_id))?
        };
        let boards = self.boards.read().await;
        boards
            .get(&campaign_id)
            .and_then(|b| b.tasks.get(&task_id))
            .cloned()
            .ok_or(CoordinationError::TaskNotFound(task_id))
    }

    /// All tasks of a campaign (test/observability helper).
    pub async fn campaign_tasks(&self, campaign_id: Uuid) -> Vec<AgentTask> {
        self.boards
            .read()
            .await
            .get(&campaign_id)
            .map(|b| b.tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Advance one campaign's DAG: requeue due retries, then start every
    /// eligible task within agent-type capacity. Returns how many tasks
    /// were started. Repeated calls with no state change start nothing.
    #[instrument(skip(self), fields(%campaign_id))]
    pub async fn tick(self: &Arc<Self>, campaign_id: Uuid) -> CoordinationResult<usize> {
        if self.is_halted(campaign_id).await {
            return Ok(0);
        }

        let now = self.clock.now();
        let mut started: Vec<(AgentTask, OwnedSemaphorePermit)> = Vec::new();

        {
            let mut boards = self.boards.write().await;
            let Some(board) = boards.get_mut(&campaign_id) else {
                return Ok(0);
            };

            // Backoff windows that have elapsed return to the pending pool.
            for task in board.tasks.values_mut() {
                if task.retry_due(now) {
                    if let Err(e) = task.requeue() {
                        warn!(task_id = %task.id, "Requeue failed: {e}");
                    }
                }
            }

            let statuses: HashMap<Uuid, TaskStatus> =
                board.tasks.values().map(|t| (t.id, t.status)).collect();

            let mut eligible: Vec<Uuid> = board
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending)
                .filter(|t| self.graph.dependencies_met(t, &statuses))
                .map(|t| t.id)
                .collect();

            // Highest priority first; ties broken by earliest creation.
            eligible.sort_by(|a, b| {
                let ta = &board.tasks[a];
                let tb = &board.tasks[b];
                tb.priority
                    .cmp(&ta.priority)
                    .then(ta.created_at.cmp(&tb.created_at))
            });

            for task_id in eligible {
                let agent_type = board.tasks[&task_id].agent_type.clone();
                let semaphore = self.slot_for(&agent_type).await;
                let Ok(permit) = semaphore.try_acquire_owned() else {
                    // Agent type at capacity; other types may still start.
                    continue;
                };
                let task = board
                    .tasks
                    .get_mut(&task_id)
                    .ok_or(CoordinationError::TaskNotFound(task_id))?;
                if let Err(e) = task.mark_started(now) {
                    warn!(%task_id, "Start failed: {e}");
                    continue;
                }
                started.push((task.clone(), permit));
            }
        }

        let count = started.len();
        for (task, permit) in started {
            debug!(task_id = %task.id, agent_type = %task.agent_type, "Task started");
            self.monitor.on_task_transition(&task).await;
            self.spawn_invocation(campaign_id, task, permit).await;
        }

        if count > 0 {
            info!(%campaign_id, count, "Tick started tasks");
        }
        Ok(count)
    }

    /// Advance every campaign.
    pub async fn tick_all(self: &Arc<Self>) -> CoordinationResult<usize> {
        let campaign_ids: Vec<Uuid> = self.boards.read().await.keys().copied().collect();
        let mut total = 0;
        for campaign_id in campaign_ids {
            total += self.tick(campaign_id).await?;
        }
        Ok(total)
    }

    async fn slot_for(&self, agent_type: &str) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(agent_type.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_in_flight_per_agent)))
            .clone()
    }

    /// Spawn the agent invocation for a freshly started task.
    ///
    /// The spawned future is gated on a oneshot so the in-flight registry
    /// always holds its handle before it runs; emergency stop aborts
    /// through those handles.
    async fn spawn_invocation(
        self: &Arc<Self>,
        campaign_id: Uuid,
        task: AgentTask,
        permit: OwnedSemaphorePermit,
    ) {
        let (go_tx, go_rx) = oneshot::channel::<()>();
        let this = Arc::clone(self);
        let task_id = task.id;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            if go_rx.await.is_err() {
                return;
            }
            let outcome = this.invoker.execute(&task).await;
            this.apply_outcome(campaign_id, task_id, outcome).await;
        });

        self.in_flight
            .lock()
            .await
            .insert(task_id, InFlight { campaign_id, handle });
        let _ = go_tx.send(());
    }

    /// Record the result of an agent invocation.
    ///
    /// Runtime failures feed the retry state machine; they never propagate
    /// out as errors.
    async fn apply_outcome(
        self: &Arc<Self>,
        campaign_id: Uuid,
        task_id: Uuid,
        outcome: Result<TaskResult, InvocationError>,
    ) {
        let now = self.clock.now();
        let mut for_monitor: Option<AgentTask> = None;
        let mut blocker: Option<(AgentTask, InvocationError)> = None;

        {
            let mut boards = self.boards.write().await;
            let task = boards
                .get_mut(&campaign_id)
                .and_then(|b| b.tasks.get_mut(&task_id));
            let Some(task) = task else {
                return;
            };
            // Emergency stop may have already settled this task.
            if task.status != TaskStatus::Running {
                return;
            }

            match outcome {
                Ok(result) => {
                    if let Err(e) = task.complete(result, now) {
                        warn!(%task_id, "Completion rejected: {e}");
                    } else {
                        self.stats.completed.fetch_add(1, Ordering::Relaxed);
                        debug!(%task_id, "Task completed");
                    }
                    for_monitor = Some(task.clone());
                }
                Err(error) => {
                    if let Err(e) = task.mark_failed(error.to_string(), now) {
                        warn!(%task_id, "Failure transition rejected: {e}");
                    }
                    if task.can_retry() {
                        let delay = self.config.backoff_delay(task.retry_count.saturating_sub(1));
                        let delay = chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000));
                        if let Err(e) = task.schedule_retry(delay, now) {
                            warn!(%task_id, "Retry scheduling failed: {e}");
                        }
                        debug!(%task_id, retry_count = task.retry_count, "Task scheduled for retry");
                        blocker = Some((task.clone(), error));
                    } else {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(%task_id, "Task permanently failed: {error}");
                        for_monitor = Some(task.clone());
                    }
                }
            }
        }

        if let Some(task) = for_monitor {
            self.monitor.on_task_transition(&task).await;
        }
        if let Some((task, error)) = blocker {
            // Transient fault: surface it as a blocker while the retry waits.
            self.monitor.report_invocation_blocker(&task, &error).await;
        }

        self.in_flight.lock().await.remove(&task_id);
    }

    /// Cancel in-flight invocations in scope and fail their tasks without
    /// consuming a retry. Leaves the scope halted (rejecting submissions)
    /// until `resume` is called. Returns the number of aborted tasks.
    #[instrument(skip(self))]
    pub async fn emergency_stop(&self, scope: StopScope) -> usize {
        match scope {
            StopScope::System => self.halted_system.store(true, Ordering::SeqCst),
            StopScope::Campaign(id) => {
                self.halted_campaigns.write().await.insert(id);
            }
        }

        let in_scope = |campaign_id: Uuid| match scope {
            StopScope::System => true,
            StopScope::Campaign(id) => campaign_id == id,
        };

        // Abort the invocation futures first so no outcome lands after the
        // forced failure below.
        {
            let mut in_flight = self.in_flight.lock().await;
            let ids: Vec<Uuid> = in_flight
                .iter()
                .filter(|(_, f)| in_scope(f.campaign_id))
                .map(|(id, _)| *id)
                .collect();
            for id in ids {
                if let Some(flight) = in_flight.remove(&id) {
                    flight.handle.abort();
                }
            }
        }

        let now = self.clock.now();
        let mut stopped = 0;
        {
            let mut boards = self.boards.write().await;
            for (campaign_id, board) in boards.iter_mut() {
                if !in_scope(*campaign_id) {
                    continue;
                }
                for task in board.tasks.values_mut() {
                    if task.status == TaskStatus::Running {
                        if let Err(e) = task.abort("emergency stop", now) {
                            warn!(task_id = %task.id, "Abort failed: {e}");
                            continue;
                        }
                        stopped += 1;
                    }
                }
            }
        }

        warn!(?scope, stopped, "Emergency stop executed");
        stopped
    }

    /// Lift an emergency stop.
    pub async fn resume(&self, scope: StopScope) {
        match scope {
            StopScope::System => self.halted_system.store(false, Ordering::SeqCst),
            StopScope::Campaign(id) => {
                self.halted_campaigns.write().await.remove(&id);
            }
        }
        info!(?scope, "Scheduling resumed");
    }

    /// In-flight invocation count per agent type.
    pub async fn agents_in_use(&self) -> HashMap<String, usize> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .map(|(agent_type, sem)| {
                let in_use = self
                    .config
                    .max_in_flight_per_agent
                    .saturating_sub(sem.available_permits());
                (agent_type.clone(), in_use)
            })
            .filter(|(_, in_use)| *in_use > 0)
            .collect()
    }

    /// Total invocation capacity across registered agent types.
    pub fn capacity(&self) -> usize {
        self.registry.agent_types().len() * self.config.max_in_flight_per_agent
    }

    /// Settlement counters.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}
