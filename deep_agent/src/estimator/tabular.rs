//! Lookup-table backend.
//!
//! Each distinct feature vector owns a row of values, initialized randomly on
//! first sight. Rows are found by a linear scan with value equality.
//!
//! Training groups staged pairs by row. Errors for the same row are summed,
//! averaged by that row's own pair count, and applied in one optimizer step.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::history::StateInput;
use super::{sealed, EstimatorBackend};
use crate::error::BackendError;
use crate::state::StateKey;

/// Per-row update rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TabularOptimizer {
    Sgd,
    Adam { beta1: f64, beta2: f64, epsilon: f64 },
}

impl TabularOptimizer {
    pub fn adam() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl Default for TabularOptimizer {
    fn default() -> Self {
        Self::Sgd
    }
}

#[derive(Debug, Clone)]
struct Moments {
    first: Vec<f64>,
    second: Vec<f64>,
    steps: i32,
}

#[derive(Debug, Clone)]
struct Row {
    state: Vec<f32>,
    values: Vec<f32>,
    moments: Option<Moments>,
}

/// Backend storing one value row per distinct state.
#[derive(Debug, Clone)]
pub struct TabularEstimator {
    rows: Vec<Row>,
    output_width: usize,
    optimizer: TabularOptimizer,
    staged: BTreeMap<StateKey, (Vec<f32>, Vec<f32>)>,
    rng: StdRng,
}

impl TabularEstimator {
    pub fn new(output_width: usize, optimizer: TabularOptimizer) -> Self {
        Self::with_rng(output_width, optimizer, StdRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic row initialization.
    pub fn seeded(output_width: usize, optimizer: TabularOptimizer, seed: u64) -> Self {
        Self::with_rng(output_width, optimizer, StdRng::seed_from_u64(seed))
    }

    fn with_rng(output_width: usize, optimizer: TabularOptimizer, rng: StdRng) -> Self {
        Self {
            rows: Vec::new(),
            output_width,
            optimizer,
            staged: BTreeMap::new(),
            rng,
        }
    }

    /// Number of distinct states seen.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values for `state` without inserting a row.
    pub fn values(&self, state: &[f32]) -> Option<&[f32]> {
        self.find(state).map(|i| self.rows[i].values.as_slice())
    }

    /// Overwrite the row for `state`.
    pub fn set_values(&mut self, state: &[f32], values: Vec<f32>) -> Result<(), BackendError> {
        self.check_values(&values)?;
        let index = self.row_index(state);
        self.rows[index].values = values;
        Ok(())
    }

    fn find(&self, state: &[f32]) -> Option<usize> {
        self.rows.iter().position(|row| row.state == state)
    }

    fn row_index(&mut self, state: &[f32]) -> usize {
        if let Some(index) = self.find(state) {
            return index;
        }
        let values = (0..self.output_width).map(|_| self.rng.random::<f32>()).collect();
        self.rows.push(Row {
            state: state.to_vec(),
            values,
            moments: None,
        });
        self.rows.len() - 1
    }

    fn check_values(&self, values: &[f32]) -> Result<(), BackendError> {
        if values.len() != self.output_width {
            return Err(BackendError::ShapeMismatch {
                what: "table values",
                expected: self.output_width,
                actual: values.len(),
            });
        }
        Ok(())
    }

    fn step(&mut self, index: usize, gradient: &[f64], learning_rate: f64) {
        let optimizer = self.optimizer;
        let row = &mut self.rows[index];
        match optimizer {
            TabularOptimizer::Sgd => {
                for (value, g) in row.values.iter_mut().zip(gradient) {
                    *value -= (learning_rate * g) as f32;
                }
            }
            TabularOptimizer::Adam { beta1, beta2, epsilon } => {
                let width = row.values.len();
                let moments = row.moments.get_or_insert_with(|| Moments {
                    first: vec![0.0; width],
                    second: vec![0.0; width],
                    steps: 0,
                });
                moments.steps += 1;
                let correction1 = 1.0 - beta1.powi(moments.steps);
                let correction2 = 1.0 - beta2.powi(moments.steps);
                for (i, g) in gradient.iter().enumerate() {
                    moments.first[i] = beta1 * moments.first[i] + (1.0 - beta1) * g;
                    moments.second[i] = beta2 * moments.second[i] + (1.0 - beta2) * g * g;
                    let m = moments.first[i] / correction1;
                    let v = moments.second[i] / correction2;
                    row.values[i] -= (learning_rate * m / (v.sqrt() + epsilon)) as f32;
                }
            }
        }
    }
}

impl sealed::Sealed for TabularEstimator {}

impl EstimatorBackend for TabularEstimator {
    fn output_width(&self) -> Option<usize> {
        Some(self.output_width)
    }

    fn predict(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>, BackendError> {
        let index = self.row_index(input.features());
        Ok(Some(self.rows[index].values.clone()))
    }

    fn predict_uncached(&mut self, input: &StateInput) -> Result<Option<Vec<f32>>, BackendError> {
        self.predict(input)
    }

    fn store(&mut self, input: StateInput, values: Vec<f32>) -> Result<(), BackendError> {
        self.check_values(&values)?;
        self.staged.insert(input.key(), (input.features().to_vec(), values));
        Ok(())
    }

    fn pending(&self) -> usize {
        self.staged.len()
    }

    /// One pass regardless of `iterations`: each row takes a single step on
    /// its averaged error.
    fn train(&mut self, _iterations: usize, learning_rate: f64) -> Result<(), BackendError> {
        let staged = std::mem::take(&mut self.staged);
        let mut errors: BTreeMap<usize, (Vec<f64>, usize)> = BTreeMap::new();
        for (features, target) in staged.values() {
            let index = self.row_index(features);
            let row = &self.rows[index].values;
            let (sum, count) = errors
                .entry(index)
                .or_insert_with(|| (vec![0.0; self.output_width], 0));
            for ((s, current), target) in sum.iter_mut().zip(row).zip(target) {
                *s += (*current - *target) as f64;
            }
            *count += 1;
        }

        for (index, (sum, count)) in errors {
            let gradient: Vec<f64> = sum.iter().map(|e| e / count as f64).collect();
            self.step(index, &gradient, learning_rate);
        }
        self.staged = staged;
        Ok(())
    }

    fn blend_from(&mut self, source: &Self, tau: f64) -> Result<(), BackendError> {
        if source.output_width != self.output_width {
            return Err(BackendError::ShapeMismatch {
                what: "source table",
                expected: self.output_width,
                actual: source.output_width,
            });
        }
        if tau >= 1.0 {
            self.rows = source.rows.clone();
            return Ok(());
        }
        let tau = tau as f32;
        for other in &source.rows {
            match self.find(&other.state) {
                Some(index) => {
                    for (own, theirs) in self.rows[index].values.iter_mut().zip(&other.values) {
                        *own = (1.0 - tau) * *own + tau * theirs;
                    }
                }
                None => self.rows.push(Row {
                    state: other.state.clone(),
                    values: other.values.clone(),
                    moments: None,
                }),
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.staged.clear();
    }

    fn duplicate(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            output_width: self.output_width,
            optimizer: self.optimizer,
            staged: BTreeMap::new(),
            rng: self.rng.clone(),
        }
    }
}
