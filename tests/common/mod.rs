//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use adjutant::{
    AgentInvoker, AgentTask, Coordinator, CoordinatorConfig, GoalPlan, InvocationError,
    MetricSnapshot, MetricsError, MetricsSource, PhaseProposal, StaticRegistry, TaskResult,
    VirtualClock,
};

/// Scripted behavior for one agent type.
#[derive(Debug, Clone)]
pub enum ExecBehavior {
    /// Always succeed with the given quality score.
    Succeed(f64),
    /// Always fail with the given message.
    Fail(String),
    /// Fail the first `failures` attempts of each task, then succeed.
    FailThenSucceed { failures: u32, score: f64 },
    /// Never return; the invocation hangs until aborted.
    Hang,
}

/// Configurable in-memory agent invoker.
#[derive(Default)]
pub struct MockInvoker {
    behaviors: Mutex<HashMap<String, ExecBehavior>>,
    proposals: Mutex<HashMap<String, PhaseProposal>>,
    attempts: Mutex<HashMap<Uuid, u32>>,
    executions: AtomicUsize,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_behavior(&self, agent_type: &str, behavior: ExecBehavior) {
        self.behaviors
            .lock()
            .await
            .insert(agent_type.to_string(), behavior);
    }

    pub async fn set_proposal(&self, agent_type: &str, proposal: PhaseProposal) {
        self.proposals
            .lock()
            .await
            .insert(agent_type.to_string(), proposal);
    }

    /// Total `execute` calls observed.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentInvoker for MockInvoker {
    async fn execute(&self, task: &AgentTask) -> Result<TaskResult, InvocationError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .await
            .get(&task.agent_type)
            .cloned()
            .unwrap_or(ExecBehavior::Succeed(0.9));

        match behavior {
            ExecBehavior::Succeed(score) => Ok(TaskResult::new(
                serde_json::json!({"task": task.id.to_string()}),
                score,
            )),
            ExecBehavior::Fail(message) => Err(InvocationError::ExecutionFailed(message)),
            ExecBehavior::FailThenSucceed { failures, score } => {
                let mut attempts = self.attempts.lock().await;
                let seen = attempts.entry(task.id).or_insert(0);
                *seen += 1;
                if *seen <= failures {
                    Err(InvocationError::ExecutionFailed(format!(
                        "attempt {seen} failed"
                    )))
                } else {
                    Ok(TaskResult::new(serde_json::Value::Null, score))
                }
            }
            ExecBehavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
        }
    }

    async fn propose(
        &self,
        agent_type: &str,
        _plan: &GoalPlan,
    ) -> Result<PhaseProposal, InvocationError> {
        Ok(self
            .proposals
            .lock()
            .await
            .get(agent_type)
            .cloned()
            .unwrap_or_else(|| PhaseProposal::endorse(agent_type, 0.9)))
    }
}

/// In-memory metrics source keyed by campaign.
#[derive(Default)]
pub struct MockMetrics {
    values: Mutex<HashMap<Uuid, HashMap<String, f64>>>,
}

impl MockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, campaign_id: Uuid, metric: &str, value: f64) {
        self.values
            .lock()
            .await
            .entry(campaign_id)
            .or_default()
            .insert(metric.to_string(), value);
    }
}

#[async_trait]
impl MetricsSource for MockMetrics {
    async fn snapshot(&self, campaign_id: Uuid) -> Result<MetricSnapshot, MetricsError> {
        let values = self.values.lock().await;
        let mut snapshot = MetricSnapshot::new(campaign_id, Utc::now());
        if let Some(metrics) = values.get(&campaign_id) {
            for (name, value) in metrics {
                snapshot = snapshot.with_value(name.clone(), *value);
            }
        }
        Ok(snapshot)
    }
}

/// Fully wired coordinator over mock collaborators.
pub struct TestStack {
    pub coordinator: Arc<Coordinator>,
    pub invoker: Arc<MockInvoker>,
    pub metrics: Arc<MockMetrics>,
    pub clock: Arc<VirtualClock>,
}

pub fn build_stack(config: CoordinatorConfig) -> TestStack {
    let invoker = Arc::new(MockInvoker::new());
    let metrics = Arc::new(MockMetrics::new());
    let clock = Arc::new(VirtualClock::new(Utc::now()));
    let coordinator = Arc::new(Coordinator::new(
        config,
        Arc::new(StaticRegistry::marketing_default()),
        invoker.clone(),
        metrics.clone(),
        clock.clone(),
    ));
    TestStack {
        coordinator,
        invoker,
        metrics,
        clock,
    }
}

pub fn default_stack() -> TestStack {
    build_stack(CoordinatorConfig::default())
}

/// Poll until a condition holds or the deadline passes.
///
/// Invocation outcomes land from spawned tasks; this is how tests wait
/// for them without sleeping fixed amounts.
pub async fn wait_until<F, Fut>(mut check: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
