//! Agent Registry
//!
//! Catalog of known specialist agents. Names are unique; registration
//! order is remembered so ranking ties resolve deterministically.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::types::{AgentDescriptor, AgentStatus};
use crate::{Error, Result};

struct RegisteredAgent {
    order: usize,
    descriptor: AgentDescriptor,
}

/// Registry of specialist agents.
///
/// Each entry is locked independently, so health probes updating one
/// agent's status do not block routing reads of the others.
pub struct AgentRegistry {
    agents: DashMap<String, RegisteredAgent>,
    next_order: AtomicUsize,
}

impl AgentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            next_order: AtomicUsize::new(0),
        }
    }

    /// Build a registry from a roster, failing on the first duplicate name
    pub fn from_agents(agents: impl IntoIterator<Item = AgentDescriptor>) -> Result<Self> {
        let registry = Self::new();
        for agent in agents {
            registry.register(agent)?;
        }
        Ok(registry)
    }

    /// Register an agent
    pub fn register(&self, agent: AgentDescriptor) -> Result<()> {
        match self.agents.entry(agent.name.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateAgent(agent.name)),
            Entry::Vacant(slot) => {
                info!(
                    "Registering agent: {} ({} capabilities)",
                    agent.name,
                    agent.capabilities.len()
                );
                let order = self.next_order.fetch_add(1, Ordering::Relaxed);
                slot.insert(RegisteredAgent {
                    order,
                    descriptor: agent,
                });
                Ok(())
            }
        }
    }

    /// Get an agent by name
    pub fn get(&self, name: &str) -> Result<AgentDescriptor> {
        self.agents
            .get(name)
            .map(|a| a.descriptor.clone())
            .ok_or_else(|| Error::UnknownAgent(name.to_string()))
    }

    /// Check if an agent is registered
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// All agents in registration order
    pub fn list(&self) -> Vec<AgentDescriptor> {
        self.collect_ordered(|_| true)
    }

    /// Agents whose status is `Available`, in registration order
    pub fn list_available(&self) -> Vec<AgentDescriptor> {
        self.collect_ordered(AgentDescriptor::is_available)
    }

    /// Agent names in registration order
    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|a| a.name).collect()
    }

    /// Update an agent's status.
    ///
    /// Returns whether the status changed; setting the current status again
    /// is a no-op.
    pub fn set_status(&self, name: &str, status: AgentStatus) -> Result<bool> {
        let mut entry = self
            .agents
            .get_mut(name)
            .ok_or_else(|| Error::UnknownAgent(name.to_string()))?;

        if entry.descriptor.status == status {
            return Ok(false);
        }

        debug!(
            "Agent {} status: {} -> {}",
            name, entry.descriptor.status, status
        );
        entry.descriptor.status = status;
        Ok(true)
    }

    /// Name to status view of every agent
    pub fn snapshot(&self) -> BTreeMap<String, AgentStatus> {
        self.agents
            .iter()
            .map(|a| (a.key().clone(), a.descriptor.status))
            .collect()
    }

    /// Get the number of registered agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if no agents are registered
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    fn collect_ordered(&self, keep: impl Fn(&AgentDescriptor) -> bool) -> Vec<AgentDescriptor> {
        let mut agents: Vec<(usize, AgentDescriptor)> = self
            .agents
            .iter()
            .filter(|a| keep(&a.descriptor))
            .map(|a| (a.order, a.descriptor.clone()))
            .collect();
        agents.sort_by_key(|(order, _)| *order);
        agents.into_iter().map(|(_, a)| a).collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
