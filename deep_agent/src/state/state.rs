//! One interaction instant.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What the environment exposes at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Flattened observation.
    pub state: Vec<f32>,
    /// Actions the agent may take from this observation.
    pub available_actions: BTreeSet<usize>,
}

impl EnvironmentSnapshot {
    pub fn new(state: Vec<f32>, available_actions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            state,
            available_actions: available_actions.into_iter().collect(),
        }
    }

    /// Width of the observation vector.
    pub fn width(&self) -> usize {
        self.state.len()
    }
}

/// Address of a state inside one synchronization's chain.
///
/// Ordered by episode, then timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId {
    pub episode_id: u64,
    pub time_step: u64,
}

impl StateId {
    pub fn new(episode_id: u64, time_step: u64) -> Self {
        Self {
            episode_id,
            time_step,
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}/t{}", self.episode_id, self.time_step)
    }
}

/// Process-wide identity of a state: the id plus the stream that minted it.
///
/// Estimators shared between environments key their caches and buffers by
/// this, so equal `(episode, timestep)` pairs from different environments
/// never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    pub stream: u64,
    pub episode_id: u64,
    pub time_step: u64,
}

impl StateKey {
    pub fn id(&self) -> StateId {
        StateId::new(self.episode_id, self.time_step)
    }
}

/// A single timestep: the environment snapshot, the agent's action and reward,
/// and the scalars policies and value functions derive for it.
///
/// Links to neighbours are [`StateId`]s resolved through the owning
/// [`StateChain`](super::StateChain); a state never owns its neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    key: StateKey,
    snapshot: Arc<EnvironmentSnapshot>,
    pub(crate) previous: Option<StateId>,
    pub(crate) next: Option<StateId>,
    pub(crate) action: Option<usize>,
    pub reward: f64,
    pub priority: f64,
    pub importance_sampling_weight: Option<f64>,
    pub policy_value: f64,
    pub state_value: f64,
    pub td_target: f64,
    pub td_error: f64,
    pub advantage: f64,
}

impl State {
    pub(crate) fn new(key: StateKey, snapshot: EnvironmentSnapshot) -> Self {
        Self {
            key,
            snapshot: Arc::new(snapshot),
            previous: None,
            next: None,
            action: None,
            reward: 0.0,
            priority: 0.0,
            importance_sampling_weight: None,
            policy_value: 0.0,
            state_value: 0.0,
            td_target: 0.0,
            td_error: 0.0,
            advantage: 0.0,
        }
    }

    pub fn id(&self) -> StateId {
        self.key.id()
    }

    pub fn key(&self) -> StateKey {
        self.key
    }

    pub fn episode_id(&self) -> u64 {
        self.key.episode_id
    }

    pub fn time_step(&self) -> u64 {
        self.key.time_step
    }

    pub fn snapshot(&self) -> &EnvironmentSnapshot {
        &self.snapshot
    }

    /// Observation vector of this state.
    pub fn observation(&self) -> &[f32] {
        &self.snapshot.state
    }

    pub fn available_actions(&self) -> &BTreeSet<usize> {
        &self.snapshot.available_actions
    }

    pub fn action(&self) -> Option<usize> {
        self.action
    }

    pub fn previous(&self) -> Option<StateId> {
        self.previous
    }

    pub fn next(&self) -> Option<StateId> {
        self.next
    }

    /// True iff no successor has been linked.
    pub fn is_final_state(&self) -> bool {
        self.next.is_none()
    }

    /// Sever the backward link.
    pub fn remove_previous_state(&mut self) {
        self.previous = None;
    }
}
