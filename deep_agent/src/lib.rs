//! # deep_agent: interaction history and shared estimators for RL agents
//!
//! Agents record what they observe and do as a linked chain of states, and
//! learn through function estimators that several agents may share.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Environment ──snapshot──► StateSynchronization ──► StateChain   │
//! │       ▲                         (one per env)       (per episode)│
//! │       │ commit_action                                  │         │
//! │  ┌────┴─────┐  act   ┌────────┐                         │         │
//! │  │DeepAgent │◄──────►│ Policy │──┐                      │         │
//! │  │ (thread) │        └────────┘  │  SharedEstimator     │         │
//! │  │          │  add / update      ├─► FunctionEstimator ◄┘         │
//! │  │          │───────────────────►│   ├ UpdateBarrier              │
//! │  └──────────┘  ValueFunction ────┘   ├ Memory                     │
//! │                                      ├ target copy                │
//! │                                      └ Neural | Tabular | Direct  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An estimator trains once every registered agent has reached its update
//! boundary, then syncs its target copy and clears its caches.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deep_agent::{
//!     shared_environment, shared_estimator, shared_synchronization, ActionSelection, AgentConfig,
//!     DeepAgent, EstimatorConfig, EstimatorPolicy, EstimatorValueFunction, FunctionEstimator,
//!     OnlineMemory, QLearning, TabularEstimator, TabularOptimizer,
//! };
//!
//! let estimator = shared_estimator(FunctionEstimator::new(
//!     TabularEstimator::new(2, TabularOptimizer::Sgd),
//!     Box::new(OnlineMemory::new()),
//!     2,
//!     EstimatorConfig::default(),
//! )?);
//! let policy = EstimatorPolicy::new(estimator.clone(), ActionSelection::epsilon_greedy(0.1));
//! let value_function = EstimatorValueFunction::new(estimator, QLearning::new(0.99));
//! let mut agent = DeepAgent::new(
//!     shared_environment(my_env),
//!     shared_synchronization(),
//!     policy,
//!     value_function,
//!     AgentConfig::default(),
//! )?;
//!
//! agent.start_episode();
//! agent.new_time_step()?;
//! agent.act()?;
//! agent.respond(reward)?;
//! agent.end_episode()?;
//! ```

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod estimator;
pub mod memory;
pub mod policy;
pub mod state;
pub mod value;

#[cfg(test)]
mod testing;

pub use agent::{spawn_agent, AgentHandle, AgentId, AgentPhase, AgentStats, DeepAgent, RunnerConfig};
pub use config::{AgentConfig, ConfigError, EstimatorConfig, Params};
pub use environment::{shared_environment, Environment, SharedEnvironment};
pub use error::{AgentError, BackendError, Result};
pub use estimator::{
    shared_estimator, DirectEstimator, EstimatorBackend, FunctionEstimator, NeuralEstimator, SharedEstimator,
    TabularEstimator, TabularOptimizer, ValueModel,
};
pub use memory::{Memory, OnlineMemory, SharedMemory, Transition};
pub use policy::{ActionChoice, ActionSelection, EstimatorPolicy, Policy};
pub use state::{
    shared_synchronization, EnvironmentSnapshot, SharedStateSynchronization, State, StateChain, StateId,
    StateSynchronization,
};
pub use value::{EstimatorValueFunction, QLearning, TargetRule, ValueFunction};
