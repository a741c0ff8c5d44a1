//! Target estimator synchronization.
//!
//! A target estimator is a lagged copy of the live one that supplies stable
//! bootstrap values. After every live update it is synchronized one of two
//! ways:
//!
//! ```text
//! Periodic { cycle: C }   every C-th update:  θ_target = θ_live
//! Polyak   { tau: τ }     every update:       θ_target = τ θ_live + (1 - τ) θ_target
//! ```
//!
//! Parameter blending for neural models walks both modules with a
//! [`ModuleMapper`], matching parameters by traversal order.

use std::sync::atomic::{AtomicUsize, Ordering};

use burn::module::{Module, ModuleMapper, ParamId};
use burn::prelude::*;

use crate::config::EstimatorConfig;

/// How the target follows the live estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetUpdatePolicy {
    /// Hard copy every `cycle` updates.
    Periodic { cycle: usize },
    /// Blend by `tau` on every update.
    Polyak { tau: f64 },
}

impl TargetUpdatePolicy {
    /// A positive `target_function_update_cycle` selects periodic copies; zero
    /// selects Polyak blending with `target_function_tau`.
    pub fn from_config(config: &EstimatorConfig) -> Self {
        match config.target_function_update_cycle {
            0 => Self::Polyak {
                tau: config.target_function_tau,
            },
            cycle => Self::Periodic { cycle },
        }
    }
}

/// Outcome of one synchronization check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetSyncAction {
    /// Leave the target untouched.
    Skip,
    /// Replace the target with the live estimator.
    Copy,
    /// Blend the live estimator into the target by `tau`.
    Blend(f64),
}

/// Decides when the target is synchronized.
#[derive(Debug)]
pub struct TargetSync {
    policy: TargetUpdatePolicy,
    updates_since_copy: AtomicUsize,
}

impl Clone for TargetSync {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy,
            updates_since_copy: AtomicUsize::new(self.updates_since_copy.load(Ordering::Relaxed)),
        }
    }
}

impl TargetSync {
    pub fn new(policy: TargetUpdatePolicy) -> Self {
        Self {
            policy,
            updates_since_copy: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> TargetUpdatePolicy {
        self.policy
    }

    /// Record one live update and return what to do with the target.
    pub fn on_update(&self) -> TargetSyncAction {
        match self.policy {
            TargetUpdatePolicy::Polyak { tau } => TargetSyncAction::Blend(tau),
            TargetUpdatePolicy::Periodic { cycle } => {
                let count = self.updates_since_copy.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= cycle {
                    self.updates_since_copy.store(0, Ordering::Relaxed);
                    TargetSyncAction::Copy
                } else {
                    TargetSyncAction::Skip
                }
            }
        }
    }

    /// Updates counted toward the next periodic copy.
    pub fn pending_updates(&self) -> usize {
        self.updates_since_copy.load(Ordering::Relaxed)
    }

    pub fn reset(&mut self) {
        self.updates_since_copy.store(0, Ordering::Relaxed);
    }
}

struct ParamExtractor<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let size: usize = tensor.dims().iter().product();
        self.params.push(tensor.clone().reshape([size]));
        tensor
    }
}

struct BlendMapper<B: Backend> {
    source: Vec<Tensor<B, 1>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for BlendMapper<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let index = self.index;
        self.index += 1;
        let Some(source) = self.source.get(index) else {
            return tensor;
        };

        let shape = tensor.dims();
        let size: usize = shape.iter().product();
        let blended = source.clone().mul_scalar(self.tau) + tensor.reshape([size]).mul_scalar(1.0 - self.tau);
        // Detached so repeated blends do not grow an autodiff graph.
        blended.reshape(shape).detach().require_grad()
    }
}

/// Move `target` toward `source` by `tau`, parameter by parameter.
///
/// `tau >= 1` copies `source`; `tau <= 0` returns `target` unchanged.
pub fn blend_modules<B, M>(source: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if tau >= 1.0 {
        return source.clone();
    }
    if tau <= 0.0 {
        return target;
    }

    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = source.clone().map(&mut extractor);
    let mut blender = BlendMapper {
        source: extractor.params,
        tau,
        index: 0,
    };
    target.map(&mut blender)
}
