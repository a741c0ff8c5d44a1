//! Function estimators shared by agents.
//!
//! A [`FunctionEstimator`] wraps one [`EstimatorBackend`] (neural, tabular or
//! direct) and owns everything around it: the transition memory, the update
//! barrier across contributing agents, and the optional target copy.
//!
//! # Update cycle
//!
//! ```text
//!  agent A ─┐
//!  agent B ─┼─ ready_to_update ─► barrier ──(all arrived)──► store targets ─► update
//!  agent C ─┘                                                                  │
//!                                   train ◄─────────────────────────────────────┘
//!                                     │
//!                                     ├─► sync target (periodic copy | Polyak blend)
//!                                     ├─► clear completed agents
//!                                     └─► clear pending pairs and caches
//! ```
//!
//! A failed train leaves the pending pairs and the completed set untouched.

mod barrier;
mod direct;
mod history;
mod neural;
mod selection;
mod tabular;
mod target;

pub use barrier::UpdateBarrier;
pub use direct::DirectEstimator;
pub use history::{HistoryWindow, StateInput};
pub use neural::{NeuralEstimator, OptimizerFactory, ValueModel};
pub use selection::ValueLayout;
pub use tabular::{TabularEstimator, TabularOptimizer};
pub use target::{blend_modules, TargetSync, TargetSyncAction, TargetUpdatePolicy};

pub mod select {
    //! Free-standing action selection over value vectors.
    pub use super::selection::{
        argmax, argmax_available, argmin, argmin_available, max_value, min_value, sample, uniform,
    };
}

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::agent::AgentId;
use crate::config::EstimatorConfig;
use crate::error::{AgentError, BackendError, Result};
use crate::memory::{Memory, Transition};
use crate::state::{StateChain, StateId};

mod sealed {
    pub trait Sealed {}
}

/// Value-approximation backend.
///
/// Sealed: the crate ships [`NeuralEstimator`], [`TabularEstimator`] and
/// [`DirectEstimator`].
pub trait EstimatorBackend: sealed::Sealed + Send + Sized {
    /// Width of predicted value vectors, or `None` for backends that do not
    /// predict.
    fn output_width(&self) -> Option<usize>;

    /// Predict values for `input`. Backends with a per-cycle cache answer
    /// repeated keys from it.
    fn predict(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>, BackendError>;

    /// Predict without consulting or filling any cache.
    fn predict_uncached(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>, BackendError>;

    /// Stage a training pair for the next [`train`](EstimatorBackend::train).
    /// A later pair for the same state replaces the earlier one.
    fn store(&mut self, input: StateInput, values: Vec<f32>) -> Result<(), BackendError>;

    /// Number of staged pairs.
    fn pending(&self) -> usize;

    /// Fit the staged pairs. Must leave them staged on failure.
    fn train(&mut self, iterations: usize, learning_rate: f64) -> Result<(), BackendError>;

    /// Move toward `source` by `tau`; `tau >= 1` replaces parameters outright.
    fn blend_from(&mut self, source: &Self, tau: f64) -> Result<(), BackendError>;

    /// Drop staged pairs and cached predictions.
    fn clear(&mut self);

    /// Independent copy with the same parameters and nothing staged.
    fn duplicate(&self) -> Self;
}

/// Estimator handle shared by the agents and components using it.
pub type SharedEstimator<E> = Arc<Mutex<FunctionEstimator<E>>>;

pub fn shared_estimator<E: EstimatorBackend>(estimator: FunctionEstimator<E>) -> SharedEstimator<E> {
    Arc::new(Mutex::new(estimator))
}

/// Backend plus the coordination around it.
pub struct FunctionEstimator<E: EstimatorBackend> {
    backend: E,
    target: Option<E>,
    target_sync: TargetSync,
    barrier: UpdateBarrier,
    memory: Box<dyn Memory>,
    config: EstimatorConfig,
    window: HistoryWindow,
    layout: ValueLayout,
    updates: usize,
}

impl<E: EstimatorBackend> FunctionEstimator<E> {
    /// Wrap `backend` for an action space of `number_of_actions`.
    pub fn new(
        backend: E,
        memory: Box<dyn Memory>,
        number_of_actions: usize,
        config: EstimatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let layout = ValueLayout::from_flag(config.state_action_value);
        if let Some(width) = backend.output_width() {
            let required = layout.required_width(number_of_actions);
            if width < required {
                return Err(BackendError::ShapeMismatch {
                    what: "estimator output",
                    expected: required,
                    actual: width,
                }
                .into());
            }
        }
        Ok(Self {
            backend,
            target: None,
            target_sync: TargetSync::new(TargetUpdatePolicy::from_config(&config)),
            barrier: UpdateBarrier::new(),
            memory,
            window: HistoryWindow::new(
                config.state_history_size,
                config.action_history_size,
                number_of_actions,
            ),
            layout,
            config,
            updates: 0,
        })
    }

    /// Attach a target copy of the current backend.
    pub fn with_target(mut self) -> Self {
        self.enable_target();
        self
    }

    /// Replace the target with a fresh copy of the current backend.
    pub fn enable_target(&mut self) {
        self.target = Some(self.backend.duplicate());
        self.target_sync.reset();
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&E> {
        self.target.as_ref()
    }

    pub fn backend(&self) -> &E {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut E {
        &mut self.backend
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn number_of_actions(&self) -> usize {
        self.window.number_of_actions
    }

    pub fn layout(&self) -> ValueLayout {
        self.layout
    }

    pub fn history_window(&self) -> HistoryWindow {
        self.window
    }

    pub fn barrier(&self) -> &UpdateBarrier {
        &self.barrier
    }

    pub fn target_sync(&self) -> &TargetSync {
        &self.target_sync
    }

    /// Completed updates since construction.
    pub fn update_count(&self) -> usize {
        self.updates
    }

    // ------------------------------------------------------------------
    // Coordination
    // ------------------------------------------------------------------

    /// Add `agent` to the contributors this estimator waits for.
    pub fn register_agent(&mut self, agent: AgentId) {
        if self.barrier.register(agent) {
            self.memory.register_agent(agent);
            log::debug!("registered {} ({} contributors)", agent, self.barrier.registered().len());
        }
    }

    /// Mark `agent` as done with its cycle; true iff it was the last one.
    pub fn ready_to_update(&mut self, agent: AgentId) -> Result<bool> {
        let ready = self.barrier.arrive(agent)?;
        log::trace!(
            "{} ready ({}/{} contributors)",
            agent,
            self.barrier.completed().len(),
            self.barrier.registered().len()
        );
        Ok(ready)
    }

    // ------------------------------------------------------------------
    // Prediction and training
    // ------------------------------------------------------------------

    /// Backend input for state `id`, windowed per configuration.
    pub fn input_for(&self, chain: &StateChain, id: StateId) -> Result<StateInput> {
        self.window.build(chain, id)
    }

    /// Live prediction, served from the per-cycle cache where supported.
    pub fn predict(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>> {
        Ok(self.backend.predict(input)?)
    }

    /// Target prediction; the live backend (uncached) stands in when no
    /// target is attached.
    pub fn predict_target(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>> {
        let values = match self.target.as_mut() {
            Some(target) => target.predict_uncached(input)?,
            None => self.backend.predict_uncached(input)?,
        };
        Ok(values)
    }

    /// Stage a training pair.
    pub fn store(&mut self, input: StateInput, values: Vec<f32>) -> Result<()> {
        Ok(self.backend.store(input, values)?)
    }

    pub fn pending(&self) -> usize {
        self.backend.pending()
    }

    /// Train on the staged pairs, then synchronize the target and open the
    /// next cycle.
    pub fn update(&mut self) -> Result<()> {
        self.backend
            .train(self.config.number_of_iterations, self.config.learning_rate)?;

        if let Some(target) = self.target.as_mut() {
            match self.target_sync.on_update() {
                TargetSyncAction::Skip => {}
                TargetSyncAction::Copy => {
                    target.blend_from(&self.backend, 1.0)?;
                    log::debug!("target copied after update {}", self.updates + 1);
                }
                TargetSyncAction::Blend(tau) => target.blend_from(&self.backend, tau)?,
            }
        }

        self.updates += 1;
        self.barrier.clear_completed();
        self.backend.clear();
        log::debug!("estimator update {} complete", self.updates);
        Ok(())
    }

    /// Pull parameters from `other`: a full copy, or a blend by this
    /// estimator's `target_function_tau`.
    ///
    /// Refused while any contributor has already signalled completion.
    pub fn append(&mut self, other: &FunctionEstimator<E>, full_update: bool) -> Result<()> {
        if self.barrier.in_progress() {
            return Err(AgentError::UpdateInProgress {
                completed: self.barrier.completed().len(),
            });
        }
        let tau = if full_update {
            1.0
        } else {
            self.config.target_function_tau
        };
        self.backend.blend_from(&other.backend, tau)?;
        Ok(())
    }

    /// Drop memory contents, staged pairs and cached predictions.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.backend.clear();
        if let Some(target) = self.target.as_mut() {
            target.clear();
        }
    }

    /// Independent estimator with the same parameters and settings: fresh
    /// memory, fresh barrier, nothing staged.
    pub fn reference(&self) -> Self {
        Self {
            backend: self.backend.duplicate(),
            target: self.target.as_ref().map(EstimatorBackend::duplicate),
            target_sync: TargetSync::new(self.target_sync.policy()),
            barrier: UpdateBarrier::new(),
            memory: self.memory.reference(),
            config: self.config.clone(),
            window: self.window,
            layout: self.layout,
            updates: 0,
        }
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    pub fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    pub fn memory_mut(&mut self) -> &mut dyn Memory {
        self.memory.as_mut()
    }

    pub fn add(&mut self, transition: Transition) {
        self.memory.add(transition);
    }

    pub fn sample(&mut self) {
        self.memory.sample();
    }

    pub fn sampled_entries(&self) -> Vec<Transition> {
        self.memory.sampled_entries()
    }

    // ------------------------------------------------------------------
    // Action selection
    // ------------------------------------------------------------------

    /// Fail unless `values` covers every action under this estimator's layout.
    pub fn check_width(&self, values: &[f32]) -> Result<()> {
        let required = self.layout.required_width(self.number_of_actions());
        if values.len() < required {
            return Err(BackendError::ShapeMismatch {
                what: "action values",
                expected: required,
                actual: values.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Highest-valued action, over `available` or the whole action space.
    pub fn argmax(&self, values: &[f32], available: Option<&BTreeSet<usize>>) -> Result<usize> {
        self.check_width(values)?;
        let action = match available {
            Some(set) => selection::argmax_available(values, set, self.layout),
            None => selection::argmax(values, self.number_of_actions(), self.layout),
        };
        action.ok_or(AgentError::NoAvailableAction)
    }

    /// Lowest-valued action, over `available` or the whole action space.
    pub fn argmin(&self, values: &[f32], available: Option<&BTreeSet<usize>>) -> Result<usize> {
        self.check_width(values)?;
        let action = match available {
            Some(set) => selection::argmin_available(values, set, self.layout),
            None => selection::argmin(values, self.number_of_actions(), self.layout),
        };
        action.ok_or(AgentError::NoAvailableAction)
    }

    /// Highest action value among `available`.
    pub fn max(&self, values: &[f32], available: &BTreeSet<usize>) -> Result<f32> {
        self.check_width(values)?;
        selection::max_value(values, available, self.layout).ok_or(AgentError::NoAvailableAction)
    }

    /// Lowest action value among `available`.
    pub fn min(&self, values: &[f32], available: &BTreeSet<usize>) -> Result<f32> {
        self.check_width(values)?;
        selection::min_value(values, available, self.layout).ok_or(AgentError::NoAvailableAction)
    }

    /// Value-weighted draw from `available`.
    pub fn sample_action<R: Rng + ?Sized>(
        &self,
        values: &[f32],
        available: &BTreeSet<usize>,
        rng: &mut R,
    ) -> Result<usize> {
        self.check_width(values)?;
        selection::sample(values, available, self.layout, rng).ok_or(AgentError::NoAvailableAction)
    }

    /// Value of `action` in an output vector.
    pub fn action_value(&self, values: &[f32], action: usize) -> Option<f32> {
        self.layout.value(values, action)
    }
}

impl<E: EstimatorBackend> std::fmt::Debug for FunctionEstimator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionEstimator")
            .field("number_of_actions", &self.number_of_actions())
            .field("has_target", &self.has_target())
            .field("pending", &self.pending())
            .field("memory_len", &self.memory.len())
            .field("updates", &self.updates)
            .finish()
    }
}
