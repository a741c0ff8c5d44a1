//! Per-environment clock that mints states.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::chain::StateChain;
use super::state::{EnvironmentSnapshot, State, StateId, StateKey};
use crate::environment::Environment;

static NEXT_STREAM: AtomicU64 = AtomicU64::new(1);

/// Authoritative episode/timestep clock for one environment.
///
/// Every agent acting in the environment shares one instance (see
/// [`SharedStateSynchronization`]); it is the single writer of the state
/// chain.
#[derive(Debug)]
pub struct StateSynchronization {
    stream: u64,
    chain: StateChain,
    episode_id: u64,
    time_step: u64,
    new_episode_started: bool,
}

/// Handle shared by the agents of one environment.
pub type SharedStateSynchronization = Arc<Mutex<StateSynchronization>>;

/// Create a new shared synchronization.
pub fn shared_synchronization() -> SharedStateSynchronization {
    Arc::new(Mutex::new(StateSynchronization::new()))
}

impl Default for StateSynchronization {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSynchronization {
    pub fn new() -> Self {
        Self {
            stream: NEXT_STREAM.fetch_add(1, Ordering::Relaxed),
            chain: StateChain::new(0),
            episode_id: 0,
            time_step: 0,
            new_episode_started: false,
        }
    }

    /// Process-unique id of this clock.
    pub fn stream(&self) -> u64 {
        self.stream
    }

    pub fn episode_id(&self) -> u64 {
        self.episode_id
    }

    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Start a new episode.
    ///
    /// Idempotent until the next [`next_state`](Self::next_state): several
    /// agents signalling the same episode start count once.
    pub fn new_episode(&mut self) {
        if self.new_episode_started {
            return;
        }
        self.episode_id += 1;
        self.time_step = 0;
        self.chain = StateChain::new(self.episode_id);
        self.new_episode_started = true;
        log::trace!("stream {} started episode {}", self.stream, self.episode_id);
    }

    /// Mint the next state from the environment and link it into the chain.
    pub fn next_state<E: Environment + ?Sized>(&mut self, environment: &E) -> &State {
        let snapshot = environment.snapshot();
        self.push_snapshot(snapshot)
    }

    /// Mint the next state from an already captured snapshot.
    pub fn push_snapshot(&mut self, snapshot: EnvironmentSnapshot) -> &State {
        self.new_episode_started = false;
        self.time_step += 1;
        let key = StateKey {
            stream: self.stream,
            episode_id: self.episode_id,
            time_step: self.time_step,
        };
        self.chain.push(State::new(key, snapshot))
    }

    /// Most recently minted state of the current episode.
    pub fn last_state(&self) -> Option<&State> {
        self.chain.last()
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.chain.get(id)
    }

    pub fn state_mut(&mut self, id: StateId) -> Option<&mut State> {
        self.chain.get_mut(id)
    }

    pub fn chain(&self) -> &StateChain {
        &self.chain
    }

    /// Drop states older than `id` from the current episode's chain.
    pub fn prune_before(&mut self, id: StateId) -> usize {
        self.chain.prune_before(id)
    }
}
