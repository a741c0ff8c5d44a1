use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{ActionChoice, ActionSelection, Policy};
use crate::error::{AgentError, Result};
use crate::estimator::{select, EstimatorBackend, SharedEstimator, ValueLayout};
use crate::state::{StateChain, StateId};

/// Policy acting on the values of a shared function estimator.
///
/// Backends that predict nothing (direct estimators) fall back to uniform
/// choices over the available actions.
pub struct EstimatorPolicy<E: EstimatorBackend> {
    estimator: SharedEstimator<E>,
    selection: ActionSelection,
    learning: bool,
    rng: StdRng,
}

impl<E: EstimatorBackend> EstimatorPolicy<E> {
    pub fn new(estimator: SharedEstimator<E>, selection: ActionSelection) -> Self {
        Self {
            estimator,
            selection,
            learning: true,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Reproducible exploration.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn estimator(&self) -> &SharedEstimator<E> {
        &self.estimator
    }

    pub fn selection(&self) -> &ActionSelection {
        &self.selection
    }

    /// Copy of this policy. With `share_estimator` the copy acts on the same
    /// estimator; otherwise on an independent [`reference`] of it.
    ///
    /// [`reference`]: crate::estimator::FunctionEstimator::reference
    pub fn reference(&self, share_estimator: bool) -> Self {
        let estimator = if share_estimator {
            Arc::clone(&self.estimator)
        } else {
            Arc::new(Mutex::new(self.estimator.lock().reference()))
        };
        Self {
            estimator,
            selection: self.selection,
            learning: self.learning,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Predicted values for `id`, width-checked, or `None` for non-predicting
    /// backends.
    fn values(&self, chain: &StateChain, id: StateId) -> Result<Option<(Vec<f32>, ValueLayout)>> {
        let mut estimator = self.estimator.lock();
        let input = estimator.input_for(chain, id)?;
        match estimator.predict(&input)? {
            Some(values) => {
                estimator.check_width(&values)?;
                Ok(Some((values, estimator.layout())))
            }
            None => Ok(None),
        }
    }
}

impl<E: EstimatorBackend> Policy for EstimatorPolicy<E> {
    fn act(&mut self, chain: &StateChain, id: StateId) -> Result<ActionChoice> {
        let state = chain.get(id).ok_or(AgentError::UnknownState { id })?;
        let available = state.available_actions();

        let Some((values, layout)) = self.values(chain, id)? else {
            let action = select::uniform(available, &mut self.rng).ok_or(AgentError::NoAvailableAction)?;
            return Ok(ActionChoice::new(action));
        };
        let action = self
            .selection
            .choose(&values, available, layout, self.learning, &mut self.rng)
            .ok_or(AgentError::NoAvailableAction)?;
        Ok(ActionChoice {
            action,
            policy_value: layout.value(&values, action).map(f64::from),
        })
    }

    fn act_with(&mut self, chain: &StateChain, id: StateId, action: usize) -> Result<ActionChoice> {
        Ok(match self.values(chain, id)? {
            Some((values, layout)) => ActionChoice {
                action,
                policy_value: layout.value(&values, action).map(f64::from),
            },
            None => ActionChoice::new(action),
        })
    }

    fn increment(&mut self) {
        self.selection.increment();
    }

    fn is_learning(&self) -> bool {
        self.learning
    }

    fn set_learning(&mut self, learning: bool) {
        self.learning = learning;
    }
}
