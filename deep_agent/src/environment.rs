//! Contract consumed from environments.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::agent::AgentId;
use crate::state::EnvironmentSnapshot;

/// An environment agents act in.
///
/// Simulators live outside this crate; they only need to expose a snapshot,
/// say whether episodes terminate, and accept actions.
pub trait Environment: Send {
    /// Current observation and available actions.
    fn snapshot(&self) -> EnvironmentSnapshot;

    /// Whether the task has terminating episodes.
    fn is_episodic(&self) -> bool;

    /// Apply `action` chosen by `agent`.
    fn commit_action(&mut self, agent: AgentId, action: usize);
}

/// Environment handle shared by the agents acting in it.
pub type SharedEnvironment<E> = Arc<Mutex<E>>;

pub fn shared_environment<E: Environment>(environment: E) -> SharedEnvironment<E> {
    Arc::new(Mutex::new(environment))
}
