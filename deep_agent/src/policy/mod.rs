//! Action-selection policies.

mod estimator_policy;
mod selection;

pub use estimator_policy::EstimatorPolicy;
pub use selection::ActionSelection;

use crate::agent::AgentId;
use crate::error::Result;
use crate::state::{StateChain, StateId};

/// An action together with the policy's value for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionChoice {
    pub action: usize,
    /// Value the policy assigned to `action`, if it has one.
    pub policy_value: Option<f64>,
}

impl ActionChoice {
    pub fn new(action: usize) -> Self {
        Self {
            action,
            policy_value: None,
        }
    }

    pub fn with_value(action: usize, value: f64) -> Self {
        Self {
            action,
            policy_value: Some(value),
        }
    }
}

/// Chooses actions for an agent.
///
/// Policies read the trajectory but never write it: the agent records the
/// returned [`ActionChoice`] on the state.
pub trait Policy: Send {
    /// Note an agent that will act through this policy.
    fn register_agent(&mut self, _agent: AgentId) {}

    fn start(&mut self, _agent: AgentId) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// Choose an action for state `id` from its available actions.
    fn act(&mut self, chain: &StateChain, id: StateId) -> Result<ActionChoice>;

    /// Evaluate an externally chosen `action`, already validated as available.
    fn act_with(&mut self, chain: &StateChain, id: StateId, action: usize) -> Result<ActionChoice>;

    fn end_episode(&mut self) {}

    /// Advance schedules such as exploration decay. Called after each update.
    fn increment(&mut self) {}

    fn is_learning(&self) -> bool;

    fn set_learning(&mut self, learning: bool);

    /// Update policy-owned estimators; true iff an update ran.
    fn update(&mut self, _agent: AgentId) -> Result<bool> {
        Ok(false)
    }
}
