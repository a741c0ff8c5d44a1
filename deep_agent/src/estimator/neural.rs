//! Neural-network backend.
//!
//! Predictions run the model on a single-row batch and are cached per state
//! key until the next update, so a state queried by both the policy and the
//! value function costs one forward pass. Training fits all staged pairs as one
//! batch with a mean-squared-error loss, weighted per sample when the staged
//! inputs carry importance-sampling weights.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use super::history::StateInput;
use super::target::blend_modules;
use super::{sealed, EstimatorBackend};
use crate::error::BackendError;
use crate::state::StateKey;

/// A network mapping `[batch, input_size]` to `[batch, output_size]` values.
pub trait ValueModel<B: Backend>: Module<B> + Clone + Send + 'static {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Feature width expected by [`forward`](ValueModel::forward).
    fn input_size(&self) -> usize;

    /// Value width produced by [`forward`](ValueModel::forward).
    fn output_size(&self) -> usize;
}

/// Builds a fresh optimizer; used for the initial estimator and every copy.
pub type OptimizerFactory<O> = Arc<dyn Fn() -> O + Send + Sync>;

#[derive(Debug, Clone)]
struct StagedPair {
    features: Vec<f32>,
    values: Vec<f32>,
    weight: Option<f64>,
}

/// Backend driven by a `burn` model.
pub struct NeuralEstimator<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optimizer: O,
    optimizer_factory: OptimizerFactory<O>,
    device: B::Device,
    cache: HashMap<StateKey, Vec<f32>>,
    staged: BTreeMap<StateKey, StagedPair>,
    forward_count: usize,
}

impl<B, M, O> NeuralEstimator<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, device: B::Device, optimizer_factory: impl Fn() -> O + Send + Sync + 'static) -> Self {
        let optimizer_factory: OptimizerFactory<O> = Arc::new(optimizer_factory);
        Self {
            model,
            optimizer: optimizer_factory(),
            optimizer_factory,
            device,
            cache: HashMap::new(),
            staged: BTreeMap::new(),
            forward_count: 0,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Forward passes run since construction. Cache hits do not count.
    pub fn forward_count(&self) -> usize {
        self.forward_count
    }

    /// Number of states with a cached prediction.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn check_input(&self, features: &[f32]) -> Result<(), BackendError> {
        let expected = self.model.input_size();
        if features.len() != expected {
            return Err(BackendError::ShapeMismatch {
                what: "network input",
                expected,
                actual: features.len(),
            });
        }
        Ok(())
    }

    fn forward_values(&mut self, features: &[f32]) -> Result<Vec<f32>, BackendError> {
        self.check_input(features)?;
        self.forward_count += 1;

        let input = Tensor::<B, 1>::from_floats(features, &self.device).reshape([1, features.len()]);
        let output = self.model.forward(input).detach();
        let values = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| BackendError::Tensor(format!("{:?}", e)))?;

        let expected = self.model.output_size();
        if values.len() != expected {
            return Err(BackendError::ShapeMismatch {
                what: "network output",
                expected,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

impl<B, M, O> sealed::Sealed for NeuralEstimator<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
}

impl<B, M, O> EstimatorBackend for NeuralEstimator<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn output_width(&self) -> Option<usize> {
        Some(self.model.output_size())
    }

    fn predict(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>, BackendError> {
        if let Some(values) = self.cache.get(&input.key()) {
            return Ok(Some(values.clone()));
        }
        let values = self.forward_values(input.features())?;
        self.cache.insert(input.key(), values.clone());
        Ok(Some(values))
    }

    fn predict_uncached(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>, BackendError> {
        self.forward_values(input.features()).map(Some)
    }

    fn store(&mut self, input: StateInput, values: Vec<f32>) -> Result<(), BackendError> {
        self.check_input(input.features())?;
        let expected = self.model.output_size();
        if values.len() != expected {
            return Err(BackendError::ShapeMismatch {
                what: "training target",
                expected,
                actual: values.len(),
            });
        }
        let weight = input.importance_sampling_weight();
        let key = input.key();
        let pair = StagedPair {
            features: input.features().to_vec(),
            values,
            weight,
        };
        self.staged.insert(key, pair);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.staged.len()
    }

    fn train(&mut self, iterations: usize, learning_rate: f64) -> Result<(), BackendError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let batch = self.staged.len();
        let input_size = self.model.input_size();
        let output_size = self.model.output_size();
        let weighted = self.staged.values().any(|pair| pair.weight.is_some());

        let mut inputs = Vec::with_capacity(batch * input_size);
        let mut targets = Vec::with_capacity(batch * output_size);
        let mut weights = Vec::with_capacity(if weighted { batch } else { 0 });
        for pair in self.staged.values() {
            inputs.extend_from_slice(&pair.features);
            targets.extend_from_slice(&pair.values);
            if weighted {
                weights.push(pair.weight.unwrap_or(1.0) as f32);
            }
        }

        let inputs = Tensor::<B, 1>::from_floats(inputs.as_slice(), &self.device).reshape([batch, input_size]);
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device).reshape([batch, output_size]);
        let weights = weighted
            .then(|| Tensor::<B, 1>::from_floats(weights.as_slice(), &self.device).reshape([batch, 1]));

        for _ in 0..iterations {
            let error = self.model.forward(inputs.clone()) - targets.clone();
            let per_sample = (error.clone() * error).mean_dim(1);
            let loss = match &weights {
                Some(weights) => (per_sample * weights.clone()).mean(),
                None => per_sample.mean(),
            };

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);
        }
        log::trace!("trained on {} pairs for {} iterations", batch, iterations);
        Ok(())
    }

    fn blend_from(&mut self, source: &Self, tau: f64) -> Result<(), BackendError> {
        self.model = blend_modules(&source.model, self.model.clone(), tau as f32);
        self.cache.clear();
        Ok(())
    }

    fn clear(&mut self) {
        self.staged.clear();
        self.cache.clear();
    }

    fn duplicate(&self) -> Self {
        Self {
            model: self.model.clone(),
            optimizer: (self.optimizer_factory)(),
            optimizer_factory: Arc::clone(&self.optimizer_factory),
            device: self.device.clone(),
            cache: HashMap::new(),
            staged: BTreeMap::new(),
            forward_count: 0,
        }
    }
}

impl<B, M, O> fmt::Debug for NeuralEstimator<B, M, O>
where
    B: AutodiffBackend,
    M: ValueModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralEstimator")
            .field("input_size", &self.model.input_size())
            .field("output_size", &self.model.output_size())
            .field("cached", &self.cache.len())
            .field("staged", &self.staged.len())
            .field("forward_count", &self.forward_count)
            .finish()
    }
}
