//! Scheduler integration tests: dependency ordering, retries, priorities,
//! concurrency limits, and emergency stop.

mod common;

use std::time::Duration;

use adjutant::{
    AgentTask, CoordinationError, CoordinatorConfig, StopScope, TaskPriority, TaskStatus,
};
use common::{build_stack, default_stack, wait_until, ExecBehavior};
use uuid::Uuid;

fn task(campaign: Uuid, agent: &str, description: &str) -> AgentTask {
    AgentTask::new(campaign, agent, description)
}

#[tokio::test]
async fn dependent_tasks_wait_for_completion() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();

    let a = task(campaign, "content-generation", "Draft outline");
    let a_id = a.id;
    let b = task(campaign, "seo-optimization", "Optimize keywords").with_dependency(a_id);
    let b_id = b.id;

    stack.coordinator.submit_task(campaign, a).await.unwrap();
    stack.coordinator.submit_task(campaign, b).await.unwrap();

    let started = stack.coordinator.tick(campaign).await.unwrap();
    assert_eq!(started, 1, "only the dependency-free task may start");
    assert_eq!(
        stack.coordinator.get_task_status(b_id).await.unwrap().status,
        TaskStatus::Pending
    );

    let coordinator = stack.coordinator.clone();
    assert!(
        wait_until(
            || async {
                coordinator.get_task_status(a_id).await.unwrap().status == TaskStatus::Completed
            },
            Duration::from_secs(2),
        )
        .await,
        "task A should complete"
    );

    let started = stack.coordinator.tick(campaign).await.unwrap();
    assert_eq!(started, 1, "B becomes eligible once A completed");

    assert!(
        wait_until(
            || async {
                coordinator.get_task_status(b_id).await.unwrap().status == TaskStatus::Completed
            },
            Duration::from_secs(2),
        )
        .await
    );

    let b = stack.coordinator.get_task_status(b_id).await.unwrap();
    assert!(b.result.is_some());
    assert!(b.started_at.is_some());
}

#[tokio::test]
async fn failed_dependency_blocks_dependents_forever() {
    // Campaign with A (no deps), B and C depending on A; A exhausts its
    // retries, so B and C never leave pending.
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior(
            "content-generation",
            ExecBehavior::Fail("model refused".to_string()),
        )
        .await;

    let a = task(campaign, "content-generation", "Draft copy").with_max_retries(3);
    let a_id = a.id;
    let b = task(campaign, "seo-optimization", "Tune keywords").with_dependency(a_id);
    let b_id = b.id;
    let c = task(campaign, "email-marketing", "Schedule send").with_dependency(a_id);
    let c_id = c.id;

    stack.coordinator.submit_task(campaign, a).await.unwrap();
    stack.coordinator.submit_task(campaign, b).await.unwrap();
    stack.coordinator.submit_task(campaign, c).await.unwrap();

    let coordinator = stack.coordinator.clone();
    for attempt in 1..=3u32 {
        let started = stack.coordinator.tick(campaign).await.unwrap();
        assert_eq!(started, 1, "attempt {attempt} starts only A");

        assert!(
            wait_until(
                || async {
                    let t = coordinator.get_task_status(a_id).await.unwrap();
                    t.status == TaskStatus::Retrying || t.status == TaskStatus::Failed
                },
                Duration::from_secs(2),
            )
            .await,
            "attempt {attempt} should settle"
        );

        // Jump past any backoff window before the next attempt.
        stack.clock.advance(chrono::Duration::hours(1));
    }

    let a = stack.coordinator.get_task_status(a_id).await.unwrap();
    assert_eq!(a.status, TaskStatus::Failed);
    assert_eq!(a.retry_count, 3);
    assert!(a.error_message.is_some());

    // Nothing left to start; B and C stay pending.
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 0);
    assert_eq!(
        stack.coordinator.get_task_status(b_id).await.unwrap().status,
        TaskStatus::Pending
    );
    assert_eq!(
        stack.coordinator.get_task_status(c_id).await.unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn retrying_task_eventually_succeeds() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior(
            "ad-optimization",
            ExecBehavior::FailThenSucceed {
                failures: 2,
                score: 0.8,
            },
        )
        .await;

    let t = task(campaign, "ad-optimization", "Rebalance ad spend").with_max_retries(3);
    let t_id = t.id;
    stack.coordinator.submit_task(campaign, t).await.unwrap();

    let coordinator = stack.coordinator.clone();
    for _ in 0..3 {
        stack.coordinator.tick(campaign).await.unwrap();
        assert!(
            wait_until(
                || async {
                    let t = coordinator.get_task_status(t_id).await.unwrap();
                    t.status != TaskStatus::Running && t.status != TaskStatus::Pending
                },
                Duration::from_secs(2),
            )
            .await
        );
        stack.clock.advance(chrono::Duration::hours(1));
    }

    let t = stack.coordinator.get_task_status(t_id).await.unwrap();
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.retry_count, 2);
    assert_eq!(t.result.unwrap().quality_score, 0.8);
}

#[tokio::test]
async fn backoff_window_delays_requeue() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior("seo-optimization", ExecBehavior::Fail("flaky".to_string()))
        .await;

    let t = task(campaign, "seo-optimization", "Audit metadata").with_max_retries(3);
    let t_id = t.id;
    stack.coordinator.submit_task(campaign, t).await.unwrap();
    stack.coordinator.tick(campaign).await.unwrap();

    let coordinator = stack.coordinator.clone();
    assert!(
        wait_until(
            || async {
                coordinator.get_task_status(t_id).await.unwrap().status == TaskStatus::Retrying
            },
            Duration::from_secs(2),
        )
        .await
    );

    // Backoff has not elapsed: the task must not restart.
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 0);

    // After the window it requeues and starts again.
    stack.clock.advance(chrono::Duration::seconds(31));
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 1);
}

#[tokio::test]
async fn missing_dependency_rejected() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();

    let orphan =
        task(campaign, "content-generation", "Depends on nothing known").with_dependency(Uuid::new_v4());
    let orphan_id = orphan.id;

    let err = stack
        .coordinator
        .submit_task(campaign, orphan)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::MissingDependency(_)));
    assert!(stack.coordinator.get_task_status(orphan_id).await.is_err());
}

#[tokio::test]
async fn cyclic_batch_rejected_without_partial_enqueue() {
    use adjutant::TaskScheduler;
    use adjutant::{StaticRegistry, SystemClock};
    use std::sync::Arc;

    // Build a bare scheduler to exercise the batch path directly.
    let registry = Arc::new(StaticRegistry::marketing_default());
    let invoker = Arc::new(common::MockInvoker::new());
    let clock = Arc::new(SystemClock);
    let (monitor, _rx) = adjutant::services::ExecutionMonitor::new(
        registry.clone(),
        clock.clone(),
        adjutant::CoordinatorConfig::default().monitor,
    );
    let scheduler = Arc::new(TaskScheduler::new(
        registry,
        invoker,
        Arc::new(monitor),
        clock,
        adjutant::CoordinatorConfig::default().scheduler,
    ));

    let campaign = Uuid::new_v4();
    let mut a = task(campaign, "content-generation", "A");
    let mut b = task(campaign, "seo-optimization", "B");
    let (a_id, b_id) = (a.id, b.id);
    a.depends_on = vec![b_id];
    b.depends_on = vec![a_id];

    let err = scheduler
        .submit_batch(campaign, vec![a, b])
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::DependencyCycle(_)));
    assert!(scheduler.get_task(a_id).await.is_err());
    assert!(scheduler.get_task(b_id).await.is_err());
}

#[tokio::test]
async fn unknown_agent_type_rejected() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    let err = stack
        .coordinator
        .submit_task(campaign, task(campaign, "influencer-outreach", "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::UnknownAgentType(_)));
}

#[tokio::test]
async fn priority_orders_starts_within_capacity() {
    let mut config = CoordinatorConfig::default();
    config.scheduler.max_in_flight_per_agent = 1;
    let stack = build_stack(config);
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior("content-generation", ExecBehavior::Hang)
        .await;

    let low = task(campaign, "content-generation", "Low priority work")
        .with_priority(TaskPriority::Low);
    let low_id = low.id;
    stack.coordinator.submit_task(campaign, low).await.unwrap();

    // Submitted later but urgent: must start first.
    let urgent = task(campaign, "content-generation", "Urgent fix")
        .with_priority(TaskPriority::Urgent);
    let urgent_id = urgent.id;
    stack.coordinator.submit_task(campaign, urgent).await.unwrap();

    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 1);
    assert_eq!(
        stack
            .coordinator
            .get_task_status(urgent_id)
            .await
            .unwrap()
            .status,
        TaskStatus::Running
    );
    assert_eq!(
        stack
            .coordinator
            .get_task_status(low_id)
            .await
            .unwrap()
            .status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn per_agent_concurrency_is_bounded() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior("email-marketing", ExecBehavior::Hang)
        .await;

    for i in 0..3 {
        stack
            .coordinator
            .submit_task(campaign, task(campaign, "email-marketing", &format!("Send {i}")))
            .await
            .unwrap();
    }

    // Default capacity is two in-flight invocations per agent type.
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 2);
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 0);

    let state = stack.coordinator.get_coordination_state().await;
    assert_eq!(state.agents_in_use.get("email-marketing"), Some(&2));
}

#[tokio::test]
async fn tick_is_idempotent_without_state_change() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior("content-generation", ExecBehavior::Hang)
        .await;

    stack
        .coordinator
        .submit_task(campaign, task(campaign, "content-generation", "Draft"))
        .await
        .unwrap();

    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 1);
    // No state changed between calls: nothing new may start.
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 0);
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 0);
}

#[tokio::test]
async fn emergency_stop_aborts_running_without_consuming_retries() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior("content-generation", ExecBehavior::Hang)
        .await;
    stack
        .invoker
        .set_behavior("seo-optimization", ExecBehavior::Hang)
        .await;

    let t1 = task(campaign, "content-generation", "Draft");
    let t2 = task(campaign, "seo-optimization", "Audit");
    let (t1_id, t2_id) = (t1.id, t2.id);
    stack.coordinator.submit_task(campaign, t1).await.unwrap();
    stack.coordinator.submit_task(campaign, t2).await.unwrap();
    assert_eq!(stack.coordinator.tick(campaign).await.unwrap(), 2);

    let stopped = stack
        .coordinator
        .emergency_stop(StopScope::Campaign(campaign))
        .await;
    assert_eq!(stopped, 2);

    for id in [t1_id, t2_id] {
        let t = stack.coordinator.get_task_status(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.retry_count, 0, "emergency stop must not consume a retry");
        assert_eq!(t.error_message.as_deref(), Some("emergency stop"));
    }

    // New submissions are rejected until resume.
    let err = stack
        .coordinator
        .submit_task(campaign, task(campaign, "content-generation", "More"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::EmergencyStopInProgress));

    stack.coordinator.resume(StopScope::Campaign(campaign)).await;
    assert!(stack
        .coordinator
        .submit_task(campaign, task(campaign, "content-generation", "More"))
        .await
        .is_ok());
}

#[tokio::test]
async fn emergency_stop_scopes_to_campaign() {
    let stack = default_stack();
    let stopped_campaign = Uuid::new_v4();
    let other_campaign = Uuid::new_v4();
    stack
        .invoker
        .set_behavior("content-generation", ExecBehavior::Hang)
        .await;

    let victim = task(stopped_campaign, "content-generation", "Draft");
    let survivor = task(other_campaign, "content-generation", "Draft");
    let survivor_id = survivor.id;
    stack
        .coordinator
        .submit_task(stopped_campaign, victim)
        .await
        .unwrap();
    stack
        .coordinator
        .submit_task(other_campaign, survivor)
        .await
        .unwrap();
    stack.coordinator.tick_all().await.unwrap();

    let stopped = stack
        .coordinator
        .emergency_stop(StopScope::Campaign(stopped_campaign))
        .await;
    assert_eq!(stopped, 1);

    // The other campaign's task is still running.
    assert_eq!(
        stack
            .coordinator
            .get_task_status(survivor_id)
            .await
            .unwrap()
            .status,
        TaskStatus::Running
    );
    assert!(stack
        .coordinator
        .submit_task(other_campaign, task(other_campaign, "email-marketing", "Send"))
        .await
        .is_ok());
}
