//! Task dependency graph analysis.
//!
//! Cycle detection, topological ordering, and run-eligibility checks over
//! one campaign's task set.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{AgentTask, TaskStatus};

/// Service for resolving task dependencies and detecting cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyGraph;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                // Cycle detected
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self
    }

    /// Validate that every dependency of `task` exists among `available`.
    pub fn validate_dependencies(
        &self,
        task: &AgentTask,
        available: &[AgentTask],
    ) -> CoordinationResult<()> {
        let available_ids: HashSet<Uuid> = available.iter().map(|t| t.id).collect();
        for &dep_id in &task.depends_on {
            if !available_ids.contains(&dep_id) && dep_id != task.id {
                return Err(CoordinationError::MissingDependency(dep_id));
            }
        }
        Ok(())
    }

    /// Detect a circular dependency in a set of tasks.
    ///
    /// Returns the cycle path if one exists.
    pub fn detect_cycle(&self, tasks: &[AgentTask]) -> Option<Vec<Uuid>> {
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            graph
                .entry(task.id)
                .or_default()
                .extend(task.depends_on.iter().copied());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task_id in graph.keys() {
            if !visited.contains(task_id)
                && detect_cycle_util(*task_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }

    /// Topologically sort tasks (dependencies before dependents).
    ///
    /// Kahn's algorithm; rejects cyclic input.
    pub fn topological_sort(&self, tasks: &[AgentTask]) -> CoordinationResult<Vec<AgentTask>> {
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(CoordinationError::DependencyCycle(cycle));
        }

        let mut task_map: HashMap<Uuid, AgentTask> =
            tasks.iter().map(|t| (t.id, t.clone())).collect();
        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for task in tasks {
            in_degree.entry(task.id).or_insert(0);
            for &dep_id in &task.depends_on {
                graph.entry(dep_id).or_default().push(task.id);
                *in_degree.entry(task.id).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<Uuid> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted = Vec::new();

        while let Some(node_id) = queue.pop() {
            if let Some(task) = task_map.remove(&node_id) {
                sorted.push(task);
            }

            if let Some(neighbors) = graph.get(&node_id) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(&neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(neighbor);
                        }
                    }
                }
            }
        }

        if sorted.len() != tasks.len() {
            // Dependencies on tasks outside the input set leave orphans.
            return Err(CoordinationError::ValidationFailed(
                "Topological sort failed: disconnected dependency".to_string(),
            ));
        }

        Ok(sorted)
    }

    /// Check whether every dependency of `task` is completed.
    ///
    /// Tasks with a missing dependency record are treated as not ready.
    pub fn dependencies_met(
        &self,
        task: &AgentTask,
        statuses: &HashMap<Uuid, TaskStatus>,
    ) -> bool {
        task.depends_on
            .iter()
            .all(|dep_id| statuses.get(dep_id) == Some(&TaskStatus::Completed))
    }
}
