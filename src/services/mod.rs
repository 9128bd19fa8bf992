//! Service layer: the orchestration triad and its supporting services.

pub mod coordinator;
pub mod dependency_graph;
pub mod execution_monitor;
pub mod planning_mesh;
pub mod scheduler;
pub mod trigger_engine;

pub use coordinator::Coordinator;
pub use dependency_graph::DependencyGraph;
pub use execution_monitor::{ExecutionMonitor, MonitorEvent, PhaseTasks};
pub use planning_mesh::PlanningMesh;
pub use scheduler::{SchedulerStats, StopScope, TaskScheduler};
pub use trigger_engine::TriggerEngine;
