//! Episode-scoped arena of states.
//!
//! States of one episode are stored contiguously by timestep. Pruning advances
//! the retained-from point instead of nulling pointers, so an unreachable
//! prefix is dropped rather than kept alive through back-references.
//!
//! ```text
//!  retained from ─┐
//!                 ▼
//!   [dropped] [t=4] ◄─ [t=5] ◄─ [t=6] ◄─ [t=7]   (last)
//!             prev=None
//! ```

use std::collections::VecDeque;

use super::state::{State, StateId};

/// Arena holding the retained states of a single episode.
#[derive(Debug, Clone, Default)]
pub struct StateChain {
    episode_id: u64,
    /// Timestep of `states[0]`.
    first_time_step: u64,
    states: VecDeque<State>,
}

impl StateChain {
    pub fn new(episode_id: u64) -> Self {
        Self {
            episode_id,
            first_time_step: 1,
            states: VecDeque::new(),
        }
    }

    pub fn episode_id(&self) -> u64 {
        self.episode_id
    }

    /// Number of retained states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn index_of(&self, id: StateId) -> Option<usize> {
        if id.episode_id != self.episode_id || id.time_step < self.first_time_step {
            return None;
        }
        let index = (id.time_step - self.first_time_step) as usize;
        (index < self.states.len()).then_some(index)
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: StateId) -> Option<&State> {
        self.index_of(id).map(|i| &self.states[i])
    }

    pub fn get_mut(&mut self, id: StateId) -> Option<&mut State> {
        self.index_of(id).map(move |i| &mut self.states[i])
    }

    pub fn first(&self) -> Option<&State> {
        self.states.front()
    }

    pub fn last(&self) -> Option<&State> {
        self.states.back()
    }

    /// Predecessor of `id`, if linked and still retained.
    pub fn previous(&self, id: StateId) -> Option<&State> {
        self.get(id)?.previous.and_then(|p| self.get(p))
    }

    /// Successor of `id`, if linked.
    pub fn next(&self, id: StateId) -> Option<&State> {
        self.get(id)?.next.and_then(|n| self.get(n))
    }

    /// Walk backward from `id` (inclusive) along `previous` links.
    pub fn iter_back(&self, id: StateId) -> IterBack<'_> {
        IterBack {
            chain: self,
            cursor: self.get(id),
        }
    }

    /// Iterate retained states oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    /// Append `state` and link it behind the current last state.
    ///
    /// The caller guarantees `state` carries this chain's episode and the next
    /// timestep.
    pub(crate) fn push(&mut self, mut state: State) -> &State {
        let id = state.id();
        debug_assert_eq!(id.episode_id, self.episode_id);
        match self.states.back_mut() {
            Some(last) => {
                debug_assert_eq!(last.time_step() + 1, id.time_step);
                last.next = Some(id);
                state.previous = Some(last.id());
            }
            None => {
                self.first_time_step = id.time_step;
                state.previous = None;
            }
        }
        self.states.push_back(state);
        &self.states[self.states.len() - 1]
    }

    /// Drop every state older than `id` and sever `id`'s backward link.
    ///
    /// Returns the number of states dropped.
    pub fn prune_before(&mut self, id: StateId) -> usize {
        let Some(index) = self.index_of(id) else {
            return 0;
        };
        self.states.drain(..index);
        self.first_time_step = id.time_step;
        if let Some(first) = self.states.front_mut() {
            first.remove_previous_state();
        }
        index
    }

    /// Keep at most `count` states, pruning the oldest.
    pub fn retain_last(&mut self, count: usize) -> usize {
        if self.states.len() <= count || count == 0 {
            return 0;
        }
        let keep_from = self.states[self.states.len() - count].id();
        self.prune_before(keep_from)
    }
}

/// Backward iterator over a [`StateChain`].
pub struct IterBack<'a> {
    chain: &'a StateChain,
    cursor: Option<&'a State>,
}

impl<'a> Iterator for IterBack<'a> {
    type Item = &'a State;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = current.previous.and_then(|p| self.chain.get(p));
        Some(current)
    }
}
