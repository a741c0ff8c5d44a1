//! Error types for agent coordination.
//!
//! Three families of failure exist:
//! - **Configuration**: invalid or unrecognized parameters at construction time.
//! - **Agent protocol**: misuse of the coordination contract (unregistered
//!   contributors, appends during an open cycle, actions outside the
//!   available set).
//! - **Backend**: failures from the estimator's own math, passed through
//!   unchanged.
//!
//! Nothing in this crate retries; every error aborts the current step.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::agent::AgentId;
use crate::config::ConfigError;
use crate::state::StateId;

/// Failures raised by an estimator backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Input or target width does not match what the backend expects.
    #[error("{what} has width {actual}, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Tensor data could not be read back from the device.
    #[error("tensor conversion failed: {0}")]
    Tensor(String),
}

/// Crate-wide error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `ready_to_update` was called by an agent that never registered.
    #[error("agent {agent} is not registered for this function estimator")]
    UnregisteredContributor { agent: AgentId },

    /// `append` was called while agents have already signalled completion.
    #[error("update cycle is ongoing ({completed} agents completed)")]
    UpdateInProgress { completed: usize },

    /// An externally supplied action is not in the state's available set.
    #[error("action {action} is not available (available: {available:?})")]
    InvalidAction {
        action: usize,
        available: BTreeSet<usize>,
    },

    /// Selection ran over an empty action set.
    #[error("no action is available to select from")]
    NoAvailableAction,

    /// An operation that needs the current state ran before `new_time_step`.
    #[error("agent has no current state; call new_time_step first")]
    NoCurrentState,

    /// A state id no longer resolves in the synchronization's chain.
    #[error("state {id} is not retained in the trajectory")]
    UnknownState { id: StateId },

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A runner thread panicked before reporting.
    #[error("runner thread of {agent} panicked")]
    RunnerPanicked { agent: AgentId },
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
