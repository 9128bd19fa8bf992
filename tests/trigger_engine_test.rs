//! Trigger engine integration tests: structured conditions, cooldown
//! debouncing, and concurrent evaluation safety.

mod common;

use std::time::Duration;

use adjutant::{
    MetricComparator, TaskPriority, TaskSource, TaskStatus, Trigger, TriggerCondition,
    TriggerOutcome,
};
use common::default_stack;
use futures::future::join_all;
use uuid::Uuid;

fn low_ctr_trigger(campaign: Uuid) -> Trigger {
    Trigger::new(
        campaign,
        "low-ctr",
        TriggerCondition::new("ctr", MetricComparator::Below, 3.0),
        "Rework underperforming ad creative",
        "ad-optimization",
    )
    .with_cooldown(Duration::from_secs(600))
}

#[tokio::test]
async fn condition_below_threshold_fires_one_urgent_task() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack.metrics.set(campaign, "ctr", 2.5).await;
    let trigger_id = stack
        .coordinator
        .register_trigger(campaign, low_ctr_trigger(campaign))
        .await
        .unwrap();

    let evaluations = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].outcome, TriggerOutcome::Fired);
    assert_eq!(evaluations[0].metric_value, Some(2.5));

    let task_id = evaluations[0].task_id.expect("fired evaluation carries the task");
    let task = stack.coordinator.get_task_status(task_id).await.unwrap();
    assert_eq!(task.priority, TaskPriority::Urgent);
    assert_eq!(task.agent_type, "ad-optimization");
    assert_eq!(task.description, "Rework underperforming ad creative");
    assert!(task.depends_on.is_empty());
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(matches!(task.source, TaskSource::Trigger { trigger_id: t } if t == trigger_id));

    // The evaluation log records the firing.
    let log = stack.coordinator.trigger_log(campaign).await;
    assert_eq!(log.len(), 1);
    assert!(log[0].fired());
}

#[tokio::test]
async fn cooldown_debounces_repeated_evaluations() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack.metrics.set(campaign, "ctr", 2.5).await;
    stack
        .coordinator
        .register_trigger(campaign, low_ctr_trigger(campaign))
        .await
        .unwrap();

    let first = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(first[0].outcome, TriggerOutcome::Fired);

    // Condition still holds, but the window is open.
    let second = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(second[0].outcome, TriggerOutcome::CooldownActive);
    assert!(second[0].task_id.is_none());

    // Past the window it may fire again.
    stack.clock.advance(chrono::Duration::seconds(601));
    let third = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(third[0].outcome, TriggerOutcome::Fired);
}

#[tokio::test]
async fn concurrent_evaluations_fire_at_most_once_per_window() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack.metrics.set(campaign, "ctr", 1.0).await;
    stack
        .coordinator
        .register_trigger(campaign, low_ctr_trigger(campaign))
        .await
        .unwrap();

    let evaluators: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = stack.coordinator.clone();
            async move { coordinator.evaluate_triggers(campaign).await.unwrap() }
        })
        .collect();
    let results = join_all(evaluators).await;

    let fired: usize = results
        .iter()
        .flatten()
        .filter(|evaluation| evaluation.outcome == TriggerOutcome::Fired)
        .count();
    assert_eq!(fired, 1, "exactly one firing across concurrent evaluators");

    let cooled: usize = results
        .iter()
        .flatten()
        .filter(|evaluation| evaluation.outcome == TriggerOutcome::CooldownActive)
        .count();
    assert_eq!(cooled, 7);
}

#[tokio::test]
async fn comparator_direction_comes_from_the_rule() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();
    stack.metrics.set(campaign, "cpa", 45.0).await;

    // Above-threshold rule: 45 > 50 is false, no firing.
    let trigger = Trigger::new(
        campaign,
        "cpa-spike",
        TriggerCondition::new("cpa", MetricComparator::Above, 50.0),
        "Reduce bids on expensive keywords",
        "ad-optimization",
    );
    stack
        .coordinator
        .register_trigger(campaign, trigger)
        .await
        .unwrap();

    let evaluations = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(evaluations[0].outcome, TriggerOutcome::ConditionNotMet);

    stack.metrics.set(campaign, "cpa", 55.0).await;
    let evaluations = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(evaluations[0].outcome, TriggerOutcome::Fired);
}

#[tokio::test]
async fn inactive_and_missing_metric_outcomes() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();

    let trigger = low_ctr_trigger(campaign);
    let trigger_id = stack
        .coordinator
        .register_trigger(campaign, trigger)
        .await
        .unwrap();

    // No metric recorded for the campaign yet.
    let evaluations = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(evaluations[0].outcome, TriggerOutcome::MetricMissing);

    stack.metrics.set(campaign, "ctr", 1.0).await;
    stack
        .coordinator
        .set_trigger_active(trigger_id, false)
        .await
        .unwrap();
    let evaluations = stack.coordinator.evaluate_triggers(campaign).await.unwrap();
    assert_eq!(evaluations[0].outcome, TriggerOutcome::Inactive);
    assert!(evaluations[0].task_id.is_none());
}

#[tokio::test]
async fn unknown_target_agent_rejected_at_registration() {
    let stack = default_stack();
    let campaign = Uuid::new_v4();

    let trigger = Trigger::new(
        campaign,
        "bad-target",
        TriggerCondition::new("ctr", MetricComparator::Below, 3.0),
        "Do something",
        "influencer-outreach",
    );
    assert!(stack
        .coordinator
        .register_trigger(campaign, trigger)
        .await
        .is_err());
}

#[tokio::test]
async fn firings_across_campaigns_are_independent() {
    let stack = default_stack();
    let campaign_a = Uuid::new_v4();
    let campaign_b = Uuid::new_v4();
    stack.metrics.set(campaign_a, "ctr", 1.0).await;
    stack.metrics.set(campaign_b, "ctr", 1.0).await;

    stack
        .coordinator
        .register_trigger(campaign_a, low_ctr_trigger(campaign_a))
        .await
        .unwrap();
    stack
        .coordinator
        .register_trigger(campaign_b, low_ctr_trigger(campaign_b))
        .await
        .unwrap();

    let a = stack.coordinator.evaluate_triggers(campaign_a).await.unwrap();
    let b = stack.coordinator.evaluate_triggers(campaign_b).await.unwrap();
    assert_eq!(a[0].outcome, TriggerOutcome::Fired);
    assert_eq!(b[0].outcome, TriggerOutcome::Fired);
}
