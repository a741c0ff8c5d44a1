//! Agents and the threads that drive them.
//!
//! - `DeepAgent`: one agent's interaction loop (observe, act, respond, end
//!   episode) and its update boundary
//! - `spawn_agent`: runs an agent on its own thread behind an `AgentHandle`
//! - `RewardBaseline` / `RewardTracker`: reward centering and tracking

mod deep_agent;
mod id;
mod reward;
mod runner;

pub use deep_agent::{AgentPhase, DeepAgent};
pub use id::AgentId;
pub use reward::{ExponentialMovingAverage, RewardBaseline, RewardStats, RewardTracker};
pub use runner::{
    spawn_agent, AgentHandle, AgentStats, EpisodeDriver, RunnerCommand, RunnerConfig, StepOutcome,
};

#[cfg(test)]
mod tests;
