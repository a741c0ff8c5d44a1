//! Shared fixtures for unit tests.

use std::collections::BTreeSet;

use crate::agent::AgentId;
use crate::environment::Environment;
use crate::memory::{Memory, OnlineMemory, Transition};
use crate::state::{EnvironmentSnapshot, State};

/// Corridor of `length` cells; the observation is a one-hot of the position.
/// Action 1 moves right, action 0 moves left. Reaching the last cell ends the
/// episode for episodic corridors.
#[derive(Debug, Clone)]
pub(crate) struct Corridor {
    pub position: usize,
    pub length: usize,
    pub episodic: bool,
    pub actions: BTreeSet<usize>,
    pub committed: Vec<(AgentId, usize)>,
    reached_goal: bool,
}

impl Corridor {
    pub fn new(length: usize, episodic: bool) -> Self {
        Self {
            position: 0,
            length,
            episodic,
            actions: [0, 1].into_iter().collect(),
            committed: Vec::new(),
            reached_goal: false,
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = usize>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    pub fn at_goal(&self) -> bool {
        self.position + 1 >= self.length
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.reached_goal = false;
    }

    /// Reward for the last committed move.
    pub fn reward(&self) -> f64 {
        if self.reached_goal {
            1.0
        } else {
            0.0
        }
    }
}

impl Environment for Corridor {
    fn snapshot(&self) -> EnvironmentSnapshot {
        let mut state = vec![0.0; self.length];
        state[self.position.min(self.length - 1)] = 1.0;
        EnvironmentSnapshot::new(state, self.actions.iter().copied())
    }

    fn is_episodic(&self) -> bool {
        self.episodic
    }

    fn commit_action(&mut self, agent: AgentId, action: usize) {
        self.committed.push((agent, action));
        match action {
            0 => self.position = self.position.saturating_sub(1),
            _ => self.position = (self.position + 1).min(self.length - 1),
        }
        self.reached_goal = self.at_goal();
        if !self.episodic && self.reached_goal {
            self.position = 0;
        }
    }
}

/// On-policy buffer that weights every state it samples with `weight_of`.
pub(crate) struct WeightedMemory {
    inner: OnlineMemory,
    weight_of: fn(&State) -> f64,
    sampled: Vec<Transition>,
}

impl WeightedMemory {
    pub fn new(weight_of: fn(&State) -> f64) -> Self {
        Self {
            inner: OnlineMemory::new(),
            weight_of,
            sampled: Vec::new(),
        }
    }
}

impl Memory for WeightedMemory {
    fn add(&mut self, transition: Transition) {
        self.inner.add(transition);
    }

    fn sample(&mut self) {
        self.inner.sample();
        self.sampled = self.inner.sampled_entries();
        for transition in &mut self.sampled {
            let weight = (self.weight_of)(&transition.current.state);
            transition.current.state.importance_sampling_weight = Some(weight);
        }
    }

    fn sampled_entries(&self) -> Vec<Transition> {
        self.sampled.clone()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.sampled.clear();
    }

    fn applies_importance_sampling(&self) -> bool {
        true
    }

    fn reference(&self) -> Box<dyn Memory> {
        Box::new(Self::new(self.weight_of))
    }
}
