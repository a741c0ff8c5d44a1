//! Rendezvous of the agents contributing to one estimator.

use std::collections::BTreeSet;

use crate::agent::AgentId;
use crate::error::AgentError;

/// Tracks which registered agents have finished their current cycle.
///
/// The update fires once `completed ⊇ registered`. Arrival order does not
/// matter, and an agent marking itself twice counts once.
#[derive(Debug, Clone, Default)]
pub struct UpdateBarrier {
    registered: BTreeSet<AgentId>,
    completed: BTreeSet<AgentId>,
}

impl UpdateBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contributor. Returns false if it was already registered.
    pub fn register(&mut self, agent: AgentId) -> bool {
        self.registered.insert(agent)
    }

    pub fn deregister(&mut self, agent: AgentId) -> bool {
        self.completed.remove(&agent);
        self.registered.remove(&agent)
    }

    pub fn is_registered(&self, agent: AgentId) -> bool {
        self.registered.contains(&agent)
    }

    /// Mark `agent` complete; true iff every registered agent now is.
    pub fn arrive(&mut self, agent: AgentId) -> Result<bool, AgentError> {
        if !self.registered.contains(&agent) {
            return Err(AgentError::UnregisteredContributor { agent });
        }
        self.completed.insert(agent);
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        !self.registered.is_empty() && self.registered.is_subset(&self.completed)
    }

    /// True while some agent has arrived for a cycle that has not fired.
    pub fn in_progress(&self) -> bool {
        !self.completed.is_empty()
    }

    pub fn registered(&self) -> &BTreeSet<AgentId> {
        &self.registered
    }

    pub fn completed(&self) -> &BTreeSet<AgentId> {
        &self.completed
    }

    /// Open the next cycle.
    pub fn clear_completed(&mut self) {
        self.completed.clear();
    }
}
