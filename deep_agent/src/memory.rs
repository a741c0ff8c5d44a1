//! Transition storage feeding value-function updates.
//!
//! Agents add a [`Transition`] whenever one of their states completes; the
//! value function samples the buffer when the update barrier opens and resets
//! it afterwards.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::agent::AgentId;
use crate::estimator::StateInput;
use crate::state::{State, StateKey};

/// A state frozen at the moment its transition was recorded, together with the
/// backend input built for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionStep {
    pub state: State,
    pub input: StateInput,
}

/// `state --action/reward--> next`. `next` is `None` for final states.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub current: TransitionStep,
    pub next: Option<TransitionStep>,
}

impl Transition {
    pub fn key(&self) -> StateKey {
        self.current.state.key()
    }

    pub fn action(&self) -> Option<usize> {
        self.current.state.action()
    }

    pub fn reward(&self) -> f64 {
        self.current.state.reward
    }

    /// True when the episode ended at this transition.
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Transition buffer consumed by a value function.
pub trait Memory: Send {
    /// Note a contributing agent. Buffers that keep per-agent streams use it.
    fn register_agent(&mut self, _agent: AgentId) {}

    /// Store a transition. Re-adding a state replaces its earlier entry.
    fn add(&mut self, transition: Transition);

    /// Draw the batch returned by [`sampled_entries`](Memory::sampled_entries).
    fn sample(&mut self);

    fn sampled_entries(&self) -> Vec<Transition>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored and sampled transition.
    fn reset(&mut self);

    /// Whether sampled states carry importance-sampling weights.
    ///
    /// Buffers returning true set `State::importance_sampling_weight` on the
    /// transitions they sample; value functions then train with those weights.
    fn applies_importance_sampling(&self) -> bool {
        false
    }

    /// Independent empty buffer with the same settings.
    fn reference(&self) -> Box<dyn Memory>;
}

/// On-policy buffer: every transition since the last reset is sampled, in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct OnlineMemory {
    capacity: Option<usize>,
    entries: VecDeque<Transition>,
    sampled: Vec<Transition>,
    agents: BTreeSet<AgentId>,
}

impl OnlineMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` transitions, evicting the oldest.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn agents(&self) -> &BTreeSet<AgentId> {
        &self.agents
    }
}

impl Memory for OnlineMemory {
    fn register_agent(&mut self, agent: AgentId) {
        self.agents.insert(agent);
    }

    fn add(&mut self, transition: Transition) {
        let key = transition.key();
        if let Some(existing) = self.entries.iter_mut().find(|t| t.key() == key) {
            *existing = transition;
            return;
        }
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(transition);
    }

    fn sample(&mut self) {
        self.sampled = self.entries.iter().cloned().collect();
    }

    fn sampled_entries(&self) -> Vec<Transition> {
        self.sampled.clone()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.sampled.clear();
    }

    fn reference(&self) -> Box<dyn Memory> {
        Box::new(Self {
            capacity: self.capacity,
            ..Self::default()
        })
    }
}

/// One buffer fed by several value functions.
///
/// Clones share storage; [`reference`](Memory::reference) does not.
#[derive(Clone)]
pub struct SharedMemory {
    inner: Arc<Mutex<Box<dyn Memory>>>,
}

impl SharedMemory {
    pub fn new(memory: impl Memory + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(memory))),
        }
    }

    /// True when both handles point at the same buffer.
    pub fn same_buffer(&self, other: &SharedMemory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Memory for SharedMemory {
    fn register_agent(&mut self, agent: AgentId) {
        self.inner.lock().register_agent(agent);
    }

    fn add(&mut self, transition: Transition) {
        self.inner.lock().add(transition);
    }

    fn sample(&mut self) {
        self.inner.lock().sample();
    }

    fn sampled_entries(&self) -> Vec<Transition> {
        self.inner.lock().sampled_entries()
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn reset(&mut self) {
        self.inner.lock().reset();
    }

    fn applies_importance_sampling(&self) -> bool {
        self.inner.lock().applies_importance_sampling()
    }

    fn reference(&self) -> Box<dyn Memory> {
        self.inner.lock().reference()
    }
}
