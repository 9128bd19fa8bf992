//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the trait seams that let the coordination core stay
//! independent of its collaborators:
//! - `CapabilityRegistry`: agent-type capability lookup (read-only at runtime)
//! - `AgentInvoker`: agent execution and plan proposals
//! - `MetricsSource`: live campaign performance snapshots
//! - `Clock`: injectable time source for deterministic tests

pub mod clock;
pub mod invoker;
pub mod metrics;
pub mod registry;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use invoker::{AgentInvoker, InvocationError, PhaseProposal};
pub use metrics::{MetricSnapshot, MetricsError, MetricsSource};
pub use registry::{AgentProfile, CapabilityRegistry, StaticRegistry};
