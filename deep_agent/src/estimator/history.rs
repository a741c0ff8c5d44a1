//! Backend inputs built from a window of past states and actions.
//!
//! Sequence backends see a fixed-depth window: the current observation
//! followed by `state_history_size - 1` predecessors, then one-hot encodings of
//! the `action_history_size` most recent past actions. Slots the chain cannot
//! fill (near an episode start, or after pruning) are zero placeholders of the
//! same width.
//!
//! ```text
//! features = [ obs(t) | obs(t-1) | ... | onehot(a(t-1)) | onehot(a(t-2)) | ... ]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, BackendError};
use crate::state::{State, StateChain, StateId, StateKey};

/// Input handed to an estimator backend for one state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateInput {
    key: StateKey,
    features: Vec<f32>,
    importance_sampling_weight: Option<f64>,
}

impl StateInput {
    pub fn new(key: StateKey, features: Vec<f32>) -> Self {
        Self {
            key,
            features,
            importance_sampling_weight: None,
        }
    }

    /// Plain observation input, no history.
    pub fn from_state(state: &State) -> Self {
        Self {
            key: state.key(),
            features: state.observation().to_vec(),
            importance_sampling_weight: state.importance_sampling_weight,
        }
    }

    pub fn with_importance_sampling_weight(mut self, weight: f64) -> Self {
        self.importance_sampling_weight = Some(weight);
        self
    }

    pub fn key(&self) -> StateKey {
        self.key
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn width(&self) -> usize {
        self.features.len()
    }

    pub fn importance_sampling_weight(&self) -> Option<f64> {
        self.importance_sampling_weight
    }
}

/// Depth of the state/action window a backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub state_history_size: usize,
    pub action_history_size: usize,
    pub number_of_actions: usize,
}

impl HistoryWindow {
    pub fn new(state_history_size: usize, action_history_size: usize, number_of_actions: usize) -> Self {
        Self {
            state_history_size: state_history_size.max(1),
            action_history_size,
            number_of_actions,
        }
    }

    /// Only the current observation.
    pub fn current_only(number_of_actions: usize) -> Self {
        Self::new(1, 0, number_of_actions)
    }

    /// Feature width for observations of `observation_width`.
    pub fn input_width(&self, observation_width: usize) -> usize {
        self.state_history_size * observation_width + self.action_history_size * self.number_of_actions
    }

    /// Build the input for `id` by walking backward through the chain.
    pub fn build(&self, chain: &StateChain, id: StateId) -> Result<StateInput, AgentError> {
        let state = chain.get(id).ok_or(AgentError::UnknownState { id })?;
        if self.state_history_size == 1 && self.action_history_size == 0 {
            return Ok(StateInput::from_state(state));
        }

        let width = state.observation().len();
        let depth = self.state_history_size.max(self.action_history_size + 1);
        let window: Vec<&State> = chain.iter_back(id).take(depth).collect();

        let mut features = Vec::with_capacity(self.input_width(width));
        for slot in 0..self.state_history_size {
            match window.get(slot) {
                Some(past) => {
                    let observation = past.observation();
                    if observation.len() != width {
                        return Err(BackendError::ShapeMismatch {
                            what: "history observation",
                            expected: width,
                            actual: observation.len(),
                        }
                        .into());
                    }
                    features.extend_from_slice(observation);
                }
                None => features.extend(std::iter::repeat(0.0).take(width)),
            }
        }

        for slot in 1..=self.action_history_size {
            let mut one_hot = vec![0.0; self.number_of_actions];
            if let Some(action) = window.get(slot).and_then(|past| past.action()) {
                let cell = one_hot.get_mut(action).ok_or(BackendError::ShapeMismatch {
                    what: "history action",
                    expected: self.number_of_actions,
                    actual: action + 1,
                })?;
                *cell = 1.0;
            }
            features.extend(one_hot);
        }

        Ok(StateInput {
            key: state.key(),
            features,
            importance_sampling_weight: state.importance_sampling_weight,
        })
    }
}
