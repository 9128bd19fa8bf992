//! System-wide coordination snapshot.
//!
//! A derived, non-owning view over the scheduler, mesh, and monitor.
//! Recomputed on demand; never independently persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters exposed to external observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationState {
    /// Goal plans currently in `executing` status
    pub active_plans: usize,
    /// Goal submissions waiting for a decomposition worker
    pub queued_requests: usize,
    /// In-flight agent invocations per agent type
    pub agents_in_use: HashMap<String, usize>,
    /// In-flight invocations over total invocation capacity, in [0, 1]
    pub load_ratio: f64,
    /// Completed over settled tasks; 1.0 when nothing has settled yet
    pub success_rate: f64,
    /// Tasks that failed with their retry budget exhausted
    pub failed_tasks: u64,
    pub computed_at: DateTime<Utc>,
}

impl CoordinationState {
    /// Build a snapshot from raw counters.
    pub fn compute(
        active_plans: usize,
        queued_requests: usize,
        agents_in_use: HashMap<String, usize>,
        capacity: usize,
        completed_tasks: u64,
        failed_tasks: u64,
    ) -> Self {
        let in_flight: usize = agents_in_use.values().sum();
        let load_ratio = if capacity == 0 {
            0.0
        } else {
            (in_flight as f64 / capacity as f64).clamp(0.0, 1.0)
        };
        let settled = completed_tasks + failed_tasks;
        let success_rate = if settled == 0 {
            1.0
        } else {
            completed_tasks as f64 / settled as f64
        };
        Self {
            active_plans,
            queued_requests,
            agents_in_use,
            load_ratio,
            success_rate,
            failed_tasks,
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ratio() {
        let mut in_use = HashMap::new();
        in_use.insert("seo".to_string(), 2);
        in_use.insert("email".to_string(), 1);

        let state = CoordinationState::compute(0, 0, in_use, 10, 0, 0);
        assert!((state.load_ratio - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_with_no_history() {
        let state = CoordinationState::compute(0, 0, HashMap::new(), 10, 0, 0);
        assert_eq!(state.success_rate, 1.0);
    }

    #[test]
    fn test_success_rate() {
        let state = CoordinationState::compute(0, 0, HashMap::new(), 10, 3, 1);
        assert!((state.success_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(state.failed_tasks, 1);
    }

    #[test]
    fn test_zero_capacity_load() {
        let state = CoordinationState::compute(0, 0, HashMap::new(), 0, 0, 0);
        assert_eq!(state.load_ratio, 0.0);
    }
}
