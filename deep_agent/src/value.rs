//! Value functions: turn recorded transitions into estimator training targets.
//!
//! An update runs only when the estimator's barrier opens for the calling
//! agent. It then samples memory, computes a target for every sampled
//! transition, stages them all, trains, and resets memory:
//!
//! ```text
//! ready_to_update ─► sample ─► targets (all or nothing) ─► store ─► update ─► reset
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::agent::AgentId;
use crate::error::{AgentError, Result};
use crate::estimator::{EstimatorBackend, FunctionEstimator, SharedEstimator, StateInput};
use crate::memory::{Transition, TransitionStep};
use crate::state::{StateChain, StateId};

/// Learns values for an agent's states.
pub trait ValueFunction: Send {
    type Backend: EstimatorBackend;

    /// Register `agent` as a contributor to the underlying estimator.
    fn register_agent(&mut self, agent: AgentId);

    fn start(&mut self, _agent: AgentId) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// Record the transition out of state `id`.
    fn add(&mut self, chain: &StateChain, id: StateId) -> Result<()>;

    /// Signal that `agent` finished its cycle; trains once every contributor
    /// has. Returns true iff training ran.
    fn update(&mut self, agent: AgentId) -> Result<bool>;

    fn function_estimator(&self) -> &SharedEstimator<Self::Backend>;

    /// Copy sharing the estimator, or owning an independent reference of it.
    fn reference(&self, shared_estimator: bool) -> Self
    where
        Self: Sized;
}

/// Computes the training target for one transition.
///
/// Any `FnMut(&mut FunctionEstimator<E>, &Transition) -> Result<Vec<f32>>`
/// closure is a rule.
pub trait TargetRule<E: EstimatorBackend>: Send {
    fn target(&mut self, estimator: &mut FunctionEstimator<E>, transition: &Transition) -> Result<Vec<f32>>;
}

impl<E, F> TargetRule<E> for F
where
    E: EstimatorBackend,
    F: FnMut(&mut FunctionEstimator<E>, &Transition) -> Result<Vec<f32>> + Send,
{
    fn target(&mut self, estimator: &mut FunctionEstimator<E>, transition: &Transition) -> Result<Vec<f32>> {
        self(estimator, transition)
    }
}

/// One-step Q-learning: the taken action's value becomes
/// `reward + discount * max_a' Q_target(next, a')`, or just `reward` at the
/// end of an episode. Other actions keep their current prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QLearning {
    pub discount: f64,
}

impl QLearning {
    pub fn new(discount: f64) -> Self {
        Self { discount }
    }
}

impl<E: EstimatorBackend> TargetRule<E> for QLearning {
    fn target(&mut self, estimator: &mut FunctionEstimator<E>, transition: &Transition) -> Result<Vec<f32>> {
        let Some(mut values) = estimator.predict(&transition.current.input)? else {
            return Ok(Vec::new());
        };
        let Some(action) = transition.action() else {
            return Ok(values);
        };

        let bootstrap = match &transition.next {
            Some(next) => match estimator.predict_target(&next.input)? {
                Some(next_values) => estimator.max(&next_values, next.state.available_actions())? as f64,
                None => 0.0,
            },
            None => 0.0,
        };
        let slot = action + estimator.layout().offset();
        let available = transition.current.state.available_actions().clone();
        let cell = values
            .get_mut(slot)
            .ok_or(AgentError::InvalidAction { action, available })?;
        *cell = (transition.reward() + self.discount * bootstrap) as f32;
        Ok(values)
    }
}

/// Value function backed by a shared [`FunctionEstimator`].
pub struct EstimatorValueFunction<E: EstimatorBackend, R: TargetRule<E>> {
    estimator: SharedEstimator<E>,
    rule: R,
}

impl<E: EstimatorBackend, R: TargetRule<E>> EstimatorValueFunction<E, R> {
    pub fn new(estimator: SharedEstimator<E>, rule: R) -> Self {
        Self { estimator, rule }
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    fn step(estimator: &FunctionEstimator<E>, chain: &StateChain, id: StateId) -> Result<TransitionStep> {
        let state = chain.get(id).ok_or(AgentError::UnknownState { id })?;
        Ok(TransitionStep {
            state: state.clone(),
            input: estimator.input_for(chain, id)?,
        })
    }
}

impl<E, R> ValueFunction for EstimatorValueFunction<E, R>
where
    E: EstimatorBackend,
    R: TargetRule<E> + Clone,
{
    type Backend = E;

    fn register_agent(&mut self, agent: AgentId) {
        self.estimator.lock().register_agent(agent);
    }

    fn add(&mut self, chain: &StateChain, id: StateId) -> Result<()> {
        let mut estimator = self.estimator.lock();
        let current = Self::step(&estimator, chain, id)?;
        let next = match current.state.next() {
            Some(next) => Some(Self::step(&estimator, chain, next)?),
            None => None,
        };
        estimator.add(Transition { current, next });
        Ok(())
    }

    fn update(&mut self, agent: AgentId) -> Result<bool> {
        let mut estimator = self.estimator.lock();
        if !estimator.ready_to_update(agent)? {
            return Ok(false);
        }

        estimator.sample();
        let sampled = estimator.sampled_entries();
        let weighted = estimator.memory().applies_importance_sampling();
        let mut targets = Vec::with_capacity(sampled.len());
        for transition in &sampled {
            let values = self.rule.target(&mut estimator, transition)?;
            targets.push((training_input(transition, weighted), values));
        }
        for (input, values) in targets {
            estimator.store(input, values)?;
        }

        log::debug!("{} triggered update on {} transitions", agent, sampled.len());
        estimator.update()?;
        estimator.reset();
        Ok(true)
    }

    fn function_estimator(&self) -> &SharedEstimator<E> {
        &self.estimator
    }

    fn reference(&self, shared_estimator: bool) -> Self {
        let estimator = if shared_estimator {
            Arc::clone(&self.estimator)
        } else {
            Arc::new(Mutex::new(self.estimator.lock().reference()))
        };
        Self {
            estimator,
            rule: self.rule.clone(),
        }
    }
}

/// Input staged for a sampled transition. Weighted memories assign weights
/// when sampling, after the input was built, so the sampled state's weight
/// wins; states the memory left unweighted count as 1.
fn training_input(transition: &Transition, weighted: bool) -> StateInput {
    let input = transition.current.input.clone();
    if !weighted {
        return input;
    }
    let weight = transition.current.state.importance_sampling_weight.unwrap_or(1.0);
    input.with_importance_sampling_weight(weight)
}
