use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::estimator::select;
use crate::estimator::ValueLayout;

/// How an [`EstimatorPolicy`](super::EstimatorPolicy) turns values into an
/// action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActionSelection {
    /// Highest value, lowest id on ties.
    Greedy,
    /// Uniform exploration with probability `epsilon`, decayed multiplicatively
    /// by `decay` per increment down to `min_epsilon`.
    EpsilonGreedy {
        epsilon: f64,
        decay: f64,
        min_epsilon: f64,
    },
    /// Draw proportional to value.
    Weighted,
}

impl Default for ActionSelection {
    fn default() -> Self {
        Self::EpsilonGreedy {
            epsilon: 0.1,
            decay: 1.0,
            min_epsilon: 0.0,
        }
    }
}

impl ActionSelection {
    pub fn epsilon_greedy(epsilon: f64) -> Self {
        Self::EpsilonGreedy {
            epsilon,
            decay: 1.0,
            min_epsilon: 0.0,
        }
    }

    /// Current exploration rate, 0 for non-exploring selections.
    pub fn epsilon(&self) -> f64 {
        match self {
            Self::EpsilonGreedy { epsilon, .. } => *epsilon,
            _ => 0.0,
        }
    }

    /// Pick from `available`. Outside learning the choice is always greedy.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        values: &[f32],
        available: &BTreeSet<usize>,
        layout: ValueLayout,
        learning: bool,
        rng: &mut R,
    ) -> Option<usize> {
        if !learning {
            return select::argmax_available(values, available, layout);
        }
        match *self {
            Self::Greedy => select::argmax_available(values, available, layout),
            Self::EpsilonGreedy { epsilon, .. } => {
                if rng.random::<f64>() < epsilon {
                    select::uniform(available, rng)
                } else {
                    select::argmax_available(values, available, layout)
                }
            }
            Self::Weighted => select::sample(values, available, layout, rng),
        }
    }

    pub fn increment(&mut self) {
        if let Self::EpsilonGreedy {
            epsilon,
            decay,
            min_epsilon,
        } = self
        {
            *epsilon = (*epsilon * *decay).max(*min_epsilon);
        }
    }
}
