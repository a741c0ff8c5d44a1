use super::history::StateInput;
use super::{sealed, EstimatorBackend};
use crate::error::BackendError;

/// Backend for value functions that read their values straight from memory.
///
/// Predicts nothing and trains nothing; the surrounding
/// [`FunctionEstimator`](super::FunctionEstimator) still provides memory and
/// the update barrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectEstimator;

impl DirectEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl sealed::Sealed for DirectEstimator {}

impl EstimatorBackend for DirectEstimator {
    fn output_width(&self) -> Option<usize> {
        None
    }

    fn predict(&mut self, _input: &StateInput) -> Result<Option<Vec<f32>>, BackendError> {
        Ok(None)
    }

    fn predict_uncached(&mut self, _input: &StateInput) -> Result<Option<Vec<f32>>, BackendError> {
        Ok(None)
    }

    fn store(&mut self, _input: StateInput, _values: Vec<f32>) -> Result<(), BackendError> {
        Ok(())
    }

    fn pending(&self) -> usize {
        0
    }

    fn train(&mut self, _iterations: usize, _learning_rate: f64) -> Result<(), BackendError> {
        Ok(())
    }

    fn blend_from(&mut self, _source: &Self, _tau: f64) -> Result<(), BackendError> {
        Ok(())
    }

    fn clear(&mut self) {}

    fn duplicate(&self) -> Self {
        Self
    }
}
