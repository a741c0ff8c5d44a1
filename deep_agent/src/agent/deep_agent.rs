use std::sync::Arc;

use super::reward::{RewardBaseline, RewardStats, RewardTracker};
use super::AgentId;
use crate::config::AgentConfig;
use crate::environment::{Environment, SharedEnvironment};
use crate::error::{AgentError, Result};
use crate::policy::{ActionChoice, Policy};
use crate::state::{SharedStateSynchronization, StateId};
use crate::value::ValueFunction;

/// Where an agent is in its interaction loop.
///
/// ```text
/// Idle ─► EpisodeStarted ─► TimeStepStarted ─► AwaitingReward ─► Responded ─┐
///  ▲                              ▲                                         │
///  │                              └──────────── new_time_step ◄─────────────┤
///  └──────────────────────────────────────────── end_episode ◄──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    EpisodeStarted,
    TimeStepStarted,
    AwaitingReward,
    Responded,
}

/// A learning agent acting in one environment.
///
/// The agent owns its policy and value function; the environment and its
/// [`StateSynchronization`](crate::state::StateSynchronization) may be shared
/// with other agents, and so may the estimators behind the policy and value
/// function.
///
/// Locks are always taken environment before synchronization, and
/// synchronization before estimator.
pub struct DeepAgent<Env, P, V>
where
    Env: Environment,
    P: Policy,
    V: ValueFunction,
{
    id: AgentId,
    environment: SharedEnvironment<Env>,
    synchronization: SharedStateSynchronization,
    episodic: bool,
    config: AgentConfig,
    policy: P,
    value_function: V,
    phase: AgentPhase,
    current: Option<StateId>,
    /// First episode (or timestep) of the running update cycle.
    cycle_start: Option<u64>,
    baseline: RewardBaseline,
    learning_rewards: RewardTracker,
    evaluation_rewards: RewardTracker,
    boundaries: usize,
}

impl<Env, P, V> DeepAgent<Env, P, V>
where
    Env: Environment,
    P: Policy,
    V: ValueFunction,
{
    pub fn new(
        environment: SharedEnvironment<Env>,
        synchronization: SharedStateSynchronization,
        mut policy: P,
        mut value_function: V,
        config: AgentConfig,
    ) -> Result<Self> {
        config.validate()?;
        let episodic = environment.lock().is_episodic();
        let id = AgentId::new();
        policy.register_agent(id);
        value_function.register_agent(id);
        log::debug!(
            "created {} ({}, update cycle {})",
            id,
            if episodic { "episodic" } else { "continuing" },
            config.update_cycle(episodic)
        );
        Ok(Self {
            id,
            environment,
            synchronization,
            episodic,
            baseline: RewardBaseline::new(config.reward_tau),
            learning_rewards: RewardTracker::new(config.reward_tracking_tau),
            evaluation_rewards: RewardTracker::new(config.reward_tracking_tau),
            config,
            policy,
            value_function,
            phase: AgentPhase::Idle,
            current: None,
            cycle_start: None,
            boundaries: 0,
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn is_episodic(&self) -> bool {
        self.episodic
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The state the agent is acting in, if any.
    pub fn current_state(&self) -> Option<StateId> {
        self.current
    }

    pub fn environment(&self) -> &SharedEnvironment<Env> {
        &self.environment
    }

    pub fn synchronization(&self) -> &SharedStateSynchronization {
        &self.synchronization
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn value_function(&self) -> &V {
        &self.value_function
    }

    /// Update boundaries reached so far.
    pub fn boundaries(&self) -> usize {
        self.boundaries
    }

    pub fn start(&mut self) -> Result<()> {
        self.policy.start(self.id)?;
        self.value_function.start(self.id)
    }

    pub fn stop(&mut self) {
        self.policy.stop();
        self.value_function.stop();
    }

    pub fn is_learning(&self) -> bool {
        self.policy.is_learning()
    }

    pub fn set_learning(&mut self, learning: bool) {
        self.policy.set_learning(learning);
    }

    // ------------------------------------------------------------------
    // Interaction loop
    // ------------------------------------------------------------------

    pub fn start_episode(&mut self) {
        self.synchronization.lock().new_episode();
        self.current = None;
        self.phase = AgentPhase::EpisodeStarted;
    }

    /// Observe the environment and move to the next state.
    ///
    /// The state left behind is recorded with the value function. Continuing
    /// tasks also slide the trajectory window and check the update boundary.
    pub fn new_time_step(&mut self) -> Result<StateId> {
        let id = {
            let environment = self.environment.lock();
            let mut synchronization = self.synchronization.lock();
            synchronization.next_state(&*environment).id()
        };
        let previous = self.current.replace(id);
        self.phase = AgentPhase::TimeStepStarted;

        if let Some(previous) = previous {
            self.record(previous)?;
        }
        if !self.episodic {
            self.slide_window(id);
            self.end_episode()?;
        }
        Ok(id)
    }

    /// Let the policy choose an action for the current state.
    pub fn act(&mut self) -> Result<usize> {
        let id = self.current.ok_or(AgentError::NoCurrentState)?;
        let choice = {
            let synchronization = self.synchronization.lock();
            let state = synchronization.state(id).ok_or(AgentError::UnknownState { id })?;
            let choice = self.policy.act(synchronization.chain(), id)?;
            if !state.available_actions().contains(&choice.action) {
                return Err(AgentError::InvalidAction {
                    action: choice.action,
                    available: state.available_actions().clone(),
                });
            }
            choice
        };
        self.commit(id, choice)
    }

    /// Take `action` in the current state. Fails without touching the state
    /// when `action` is not available.
    pub fn act_with(&mut self, action: usize) -> Result<usize> {
        let id = self.current.ok_or(AgentError::NoCurrentState)?;
        let choice = {
            let synchronization = self.synchronization.lock();
            let state = synchronization.state(id).ok_or(AgentError::UnknownState { id })?;
            if !state.available_actions().contains(&action) {
                return Err(AgentError::InvalidAction {
                    action,
                    available: state.available_actions().clone(),
                });
            }
            self.policy.act_with(synchronization.chain(), id, action)?
        };
        self.commit(id, choice)
    }

    /// Record `reward` for the current state; returns the value stored.
    ///
    /// Continuing tasks store the reward centered on a running baseline.
    /// Tracking always sees the raw reward.
    pub fn respond(&mut self, reward: f64) -> Result<f64> {
        let id = self.current.ok_or(AgentError::NoCurrentState)?;
        let recorded = {
            let mut synchronization = self.synchronization.lock();
            let state = synchronization
                .state_mut(id)
                .ok_or(AgentError::UnknownState { id })?;
            let recorded = if self.episodic {
                reward
            } else {
                self.baseline.center(reward)
            };
            state.reward = recorded;
            recorded
        };

        if self.policy.is_learning() {
            self.learning_rewards.record(reward);
        } else {
            self.evaluation_rewards.record(reward);
        }
        self.phase = AgentPhase::Responded;
        Ok(recorded)
    }

    /// Close the episode (every timestep for continuing tasks) and run the
    /// update if this is a cycle boundary. Returns true at a boundary.
    pub fn end_episode(&mut self) -> Result<bool> {
        let Some(id) = self.current else {
            return Ok(false);
        };
        if self.episodic {
            self.record(id)?;
            self.current = None;
            self.phase = AgentPhase::Idle;
            self.policy.end_episode();
        }
        if !self.policy.is_learning() {
            return Ok(false);
        }

        let counter = if self.episodic { id.episode_id } else { id.time_step };
        let cycle = self.config.update_cycle(self.episodic) as u64;
        let start = *self.cycle_start.get_or_insert(counter);
        if counter + 1 < start + cycle {
            return Ok(false);
        }

        let trained = self.value_function.update(self.id)?;
        self.policy.update(self.id)?;
        self.policy.increment();
        self.cycle_start = Some(counter + 1);
        self.boundaries += 1;
        log::debug!(
            "{} reached update boundary at {} (trained: {})",
            self.id,
            id,
            trained
        );
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Reward tracking
    // ------------------------------------------------------------------

    pub fn learning_rewards(&self) -> RewardStats {
        self.learning_rewards.stats()
    }

    pub fn evaluation_rewards(&self) -> RewardStats {
        self.evaluation_rewards.stats()
    }

    pub fn reset_reward_tracking(&mut self) {
        self.learning_rewards.reset();
        self.evaluation_rewards.reset();
    }

    /// Current continuing-task reward baseline.
    pub fn reward_baseline(&self) -> Option<f64> {
        self.baseline.average()
    }

    // ------------------------------------------------------------------

    fn commit(&mut self, id: StateId, choice: ActionChoice) -> Result<usize> {
        {
            let mut synchronization = self.synchronization.lock();
            let state = synchronization
                .state_mut(id)
                .ok_or(AgentError::UnknownState { id })?;
            state.action = Some(choice.action);
            if let Some(value) = choice.policy_value {
                state.policy_value = value;
            }
        }
        self.environment.lock().commit_action(self.id, choice.action);
        self.phase = AgentPhase::AwaitingReward;
        Ok(choice.action)
    }

    /// Hand a completed state to the value function. States the agent never
    /// acted in, or that were pruned, are skipped.
    fn record(&mut self, id: StateId) -> Result<()> {
        let synchronization = Arc::clone(&self.synchronization);
        let synchronization = synchronization.lock();
        match synchronization.state(id) {
            Some(state) if state.action().is_some() => self.value_function.add(synchronization.chain(), id),
            _ => Ok(()),
        }
    }

    fn slide_window(&mut self, id: StateId) {
        let size = self.config.non_episodic_trajectory_history_size as u64;
        if id.time_step <= size + 1 {
            return;
        }
        let keep_from = StateId::new(id.episode_id, id.time_step - size);
        let dropped = self.synchronization.lock().prune_before(keep_from);
        if dropped > 0 {
            log::trace!("{} pruned {} states before {}", self.id, dropped, keep_from);
        }
    }
}
