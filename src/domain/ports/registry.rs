//! Agent capability registry port.
//!
//! Maps an agent-type identifier to the tasks it can perform, its campaign
//! stage, and its fallback agents. Read-only at runtime; mutated only by
//! deployment/configuration. Injected so the scheduler and mesh can be
//! tested with fixture registries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::models::CampaignStage;

/// Declared profile of one agent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent-type identifier (e.g. "content-generation")
    pub agent_type: String,
    /// Campaign stage this agent's output belongs to
    pub stage: CampaignStage,
    /// Capabilities this agent provides
    pub capabilities: Vec<String>,
    /// Fallback agent types, in preference order
    pub fallbacks: Vec<String>,
}

impl AgentProfile {
    pub fn new(agent_type: impl Into<String>, stage: CampaignStage) -> Self {
        Self {
            agent_type: agent_type.into(),
            stage,
            capabilities: Vec::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_fallback(mut self, agent_type: impl Into<String>) -> Self {
        self.fallbacks.push(agent_type.into());
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Read-mostly lookup of agent capabilities.
///
/// Implementations must be cheap to query; the scheduler consults the
/// registry on every submission and the mesh on every decomposition.
pub trait CapabilityRegistry: Send + Sync {
    /// All registered agent-type identifiers.
    fn agent_types(&self) -> Vec<String>;

    /// Profile for an agent type, if registered.
    fn profile(&self, agent_type: &str) -> Option<AgentProfile>;

    /// All declared capability names across the registry.
    fn capability_names(&self) -> Vec<String>;

    /// Agent types providing a capability.
    fn agents_with_capability(&self, capability: &str) -> Vec<String>;

    /// Fallback agent types for an agent, in preference order.
    fn fallbacks_for(&self, agent_type: &str) -> Vec<String> {
        self.profile(agent_type)
            .map(|p| p.fallbacks)
            .unwrap_or_default()
    }

    /// Check whether an agent type is registered.
    fn contains(&self, agent_type: &str) -> bool {
        self.profile(agent_type).is_some()
    }
}

/// Immutable in-memory registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    profiles: HashMap<String, AgentProfile>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile, replacing any existing one for the same agent type.
    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        self.profiles.insert(profile.agent_type.clone(), profile);
        self
    }

    /// Registry seeded with the stock marketing agent roster.
    pub fn marketing_default() -> Self {
        Self::new()
            .with_profile(
                AgentProfile::new("campaign-strategy", CampaignStage::Planning)
                    .with_capability("strategy")
                    .with_capability("audience-research"),
            )
            .with_profile(
                AgentProfile::new("content-generation", CampaignStage::Creation)
                    .with_capability("copywriting")
                    .with_capability("creative")
                    .with_fallback("email-marketing"),
            )
            .with_profile(
                AgentProfile::new("seo-optimization", CampaignStage::Optimization)
                    .with_capability("seo")
                    .with_capability("keyword-analysis")
                    .with_fallback("content-generation"),
            )
            .with_profile(
                AgentProfile::new("ad-optimization", CampaignStage::Optimization)
                    .with_capability("ad-spend")
                    .with_capability("bidding")
                    .with_fallback("campaign-strategy"),
            )
            .with_profile(
                AgentProfile::new("email-marketing", CampaignStage::Distribution)
                    .with_capability("email")
                    .with_capability("nurture-sequence"),
            )
            .with_profile(
                AgentProfile::new("campaign-analytics", CampaignStage::Analysis)
                    .with_capability("reporting")
                    .with_capability("attribution"),
            )
    }
}

impl CapabilityRegistry for StaticRegistry {
    fn agent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.profiles.keys().cloned().collect();
        types.sort();
        types
    }

    fn profile(&self, agent_type: &str) -> Option<AgentProfile> {
        self.profiles.get(agent_type).cloned()
    }

    fn capability_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .profiles
            .values()
            .flat_map(|p| p.capabilities.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn agents_with_capability(&self, capability: &str) -> Vec<String> {
        let mut agents: Vec<String> = self
            .profiles
            .values()
            .filter(|p| p.supports(capability))
            .map(|p| p.agent_type.clone())
            .collect();
        agents.sort();
        agents
    }
}
