use super::*;
use crate::config::{AgentConfig, EstimatorConfig};
use crate::environment::shared_environment;
use crate::error::AgentError;
use crate::estimator::{shared_estimator, FunctionEstimator, SharedEstimator, TabularEstimator, TabularOptimizer};
use crate::memory::OnlineMemory;
use crate::policy::{ActionSelection, EstimatorPolicy};
use crate::state::{shared_synchronization, StateId};
use crate::testing::Corridor;
use crate::value::{EstimatorValueFunction, QLearning};

type TestAgent =
    DeepAgent<Corridor, EstimatorPolicy<TabularEstimator>, EstimatorValueFunction<TabularEstimator, QLearning>>;

fn estimator(actions: usize) -> SharedEstimator<TabularEstimator> {
    let backend = TabularEstimator::seeded(actions, TabularOptimizer::Sgd, 7);
    let config = EstimatorConfig::default().with_learning_rate(0.5);
    shared_estimator(FunctionEstimator::new(backend, Box::new(OnlineMemory::new()), actions, config).unwrap())
}

fn agent(corridor: Corridor, estimator: &SharedEstimator<TabularEstimator>, config: AgentConfig) -> TestAgent {
    DeepAgent::new(
        shared_environment(corridor),
        shared_synchronization(),
        EstimatorPolicy::new(estimator.clone(), ActionSelection::Greedy).with_seed(3),
        EstimatorValueFunction::new(estimator.clone(), QLearning::new(0.9)),
        config,
    )
    .unwrap()
}

/// Walk right to the end of the corridor, then end the episode.
fn run_to_goal(agent: &mut TestAgent) -> bool {
    agent.environment().lock().reset();
    agent.start_episode();
    loop {
        agent.new_time_step().unwrap();
        agent.act_with(1).unwrap();
        let (reward, done) = {
            let environment = agent.environment().lock();
            (environment.reward(), environment.at_goal())
        };
        agent.respond(reward).unwrap();
        if done {
            return agent.end_episode().unwrap();
        }
    }
}

fn step(agent: &mut TestAgent, reward: f64) -> f64 {
    agent.new_time_step().unwrap();
    agent.act().unwrap();
    agent.respond(reward).unwrap()
}

struct CorridorDriver;

impl EpisodeDriver<Corridor> for CorridorDriver {
    fn reset(&mut self, environment: &mut Corridor) {
        environment.reset();
    }

    fn outcome(&mut self, environment: &mut Corridor, _agent: AgentId) -> StepOutcome {
        StepOutcome {
            reward: environment.reward(),
            done: environment.at_goal(),
        }
    }
}

// ============================================================================
// Interaction loop
// ============================================================================

#[test]
fn test_phases_follow_the_loop() {
    let estimator = estimator(2);
    let mut agent = agent(Corridor::new(3, true), &estimator, AgentConfig::default());
    assert_eq!(agent.phase(), AgentPhase::Idle);

    agent.start_episode();
    assert_eq!(agent.phase(), AgentPhase::EpisodeStarted);
    let id = agent.new_time_step().unwrap();
    assert_eq!(id, StateId::new(1, 1));
    assert_eq!(agent.phase(), AgentPhase::TimeStepStarted);
    agent.act().unwrap();
    assert_eq!(agent.phase(), AgentPhase::AwaitingReward);
    agent.respond(0.0).unwrap();
    assert_eq!(agent.phase(), AgentPhase::Responded);
    agent.end_episode().unwrap();
    assert_eq!(agent.phase(), AgentPhase::Idle);
    assert_eq!(agent.current_state(), None);
}

#[test]
fn test_act_records_choice_and_commits_it() {
    let estimator = estimator(2);
    let mut agent = agent(Corridor::new(3, true), &estimator, AgentConfig::default());
    agent.start_episode();
    let id = agent.new_time_step().unwrap();
    let action = agent.act().unwrap();

    let synchronization = agent.synchronization().lock();
    let state = synchronization.state(id).unwrap();
    assert_eq!(state.action(), Some(action));
    let environment = agent.environment().lock();
    assert_eq!(environment.committed, vec![(agent.id(), action)]);
}

#[test]
fn test_calls_before_new_time_step_fail() {
    let estimator = estimator(2);
    let mut agent = agent(Corridor::new(3, true), &estimator, AgentConfig::default());
    agent.start_episode();
    assert_eq!(agent.act(), Err(AgentError::NoCurrentState));
    assert_eq!(agent.act_with(1), Err(AgentError::NoCurrentState));
    assert_eq!(agent.respond(1.0), Err(AgentError::NoCurrentState));
    assert_eq!(agent.end_episode(), Ok(false));
}

#[test]
fn test_act_with_unavailable_action_changes_nothing() {
    let estimator = estimator(3);
    let corridor = Corridor::new(3, true).with_actions([0, 1, 2]);
    let mut agent = agent(corridor, &estimator, AgentConfig::default());
    agent.start_episode();
    let id = agent.new_time_step().unwrap();

    let result = agent.act_with(7);
    assert_eq!(
        result,
        Err(AgentError::InvalidAction {
            action: 7,
            available: [0, 1, 2].into_iter().collect(),
        })
    );
    assert_eq!(agent.synchronization().lock().state(id).unwrap().action(), None);
    assert!(agent.environment().lock().committed.is_empty());
    assert_eq!(agent.phase(), AgentPhase::TimeStepStarted);

    assert_eq!(agent.act_with(2), Ok(2));
}

// ============================================================================
// Update boundaries
// ============================================================================

#[test]
fn test_episodic_boundary_every_cycle() {
    let estimator = estimator(2);
    let config = AgentConfig::default().with_agent_update_cycle(2);
    let mut agent = agent(Corridor::new(3, true), &estimator, config);

    let fired: Vec<bool> = (0..4).map(|_| run_to_goal(&mut agent)).collect();
    assert_eq!(fired, vec![false, true, false, true]);
    assert_eq!(agent.boundaries(), 2);

    let estimator = estimator.lock();
    assert_eq!(estimator.update_count(), 2);
    assert!(estimator.memory().is_empty());
}

#[test]
fn test_episode_end_records_final_transition() {
    let estimator = estimator(2);
    // A long cycle keeps memory intact for inspection.
    let config = AgentConfig::default().with_agent_update_cycle(100);
    let mut agent = agent(Corridor::new(3, true), &estimator, config);
    assert!(!run_to_goal(&mut agent));

    let mut estimator = estimator.lock();
    assert_eq!(estimator.memory().len(), 2);
    estimator.sample();
    let sampled = estimator.sampled_entries();
    let terminal: Vec<_> = sampled.iter().filter(|t| t.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].reward(), 1.0);
}

#[test]
fn test_evaluation_never_updates() {
    let estimator = estimator(2);
    let mut agent = agent(Corridor::new(3, true), &estimator, AgentConfig::default());
    agent.set_learning(false);
    for _ in 0..3 {
        assert!(!run_to_goal(&mut agent));
    }
    assert_eq!(estimator.lock().update_count(), 0);
}

#[test]
fn test_shared_estimator_waits_for_both_agents() {
    let estimator = estimator(2);
    let config = AgentConfig::default().with_agent_update_cycle(1);
    let mut a = agent(Corridor::new(3, true), &estimator, config.clone());
    let mut b = agent(Corridor::new(3, true), &estimator, config);
    assert_eq!(estimator.lock().barrier().registered().len(), 2);

    assert!(run_to_goal(&mut a));
    assert_eq!(estimator.lock().update_count(), 0);
    assert_eq!(estimator.lock().memory().len(), 2);

    assert!(run_to_goal(&mut b));
    let estimator = estimator.lock();
    assert_eq!(estimator.update_count(), 1);
    assert!(estimator.memory().is_empty());
}

// ============================================================================
// Continuing tasks
// ============================================================================

#[test]
fn test_continuing_rewards_are_centered() {
    let estimator = estimator(2);
    let mut agent = agent(Corridor::new(4, false), &estimator, AgentConfig::default());
    agent.start_episode();

    assert_eq!(step(&mut agent, 0.0), 0.0);
    let mut centered = f64::MAX;
    for _ in 0..200 {
        centered = step(&mut agent, 5.0);
    }
    assert!(centered.abs() < 1e-6);
    assert!((agent.reward_baseline().unwrap() - 5.0).abs() < 1e-6);

    let id = agent.current_state().unwrap();
    let stored = agent.synchronization().lock().state(id).unwrap().reward;
    assert_eq!(stored, centered);
    // Tracking sees raw rewards.
    assert_eq!(agent.learning_rewards().cumulative, 1000.0);
}

#[test]
fn test_continuing_window_prunes_old_states() {
    let estimator = estimator(2);
    let config = AgentConfig::default().with_non_episodic_trajectory_history_size(3);
    let mut agent = agent(Corridor::new(4, false), &estimator, config);
    agent.start_episode();
    for _ in 0..5 {
        step(&mut agent, 0.0);
    }

    let synchronization = agent.synchronization().lock();
    let chain = synchronization.chain();
    let (t1, t2, t3, t5) = (StateId::new(1, 1), StateId::new(1, 2), StateId::new(1, 3), StateId::new(1, 5));
    assert!(!chain.contains(t1));
    assert_eq!(chain.get(t2).unwrap().previous(), None);
    assert_eq!(chain.get(t3).unwrap().previous(), Some(t2));
    assert_eq!(chain.iter_back(t5).count(), 4);
}

#[test]
fn test_continuing_boundary_counts_time_steps() {
    let estimator = estimator(2);
    let config = AgentConfig::default().with_agent_update_cycle(3);
    let mut agent = agent(Corridor::new(4, false), &estimator, config);
    agent.start_episode();
    for _ in 0..7 {
        step(&mut agent, 0.0);
    }
    // Cycles start at steps 1, 4 and 7: boundaries at steps 3 and 6.
    assert_eq!(agent.boundaries(), 2);
    assert_eq!(estimator.lock().update_count(), 2);
}

// ============================================================================
// Reward tracking
// ============================================================================

#[test]
fn test_rewards_tracked_by_mode() {
    let estimator = estimator(2);
    let mut agent = agent(Corridor::new(3, true), &estimator, AgentConfig::default());
    agent.start_episode();
    step(&mut agent, 1.0);
    agent.set_learning(false);
    step(&mut agent, 2.0);
    step(&mut agent, 2.0);

    assert_eq!(agent.learning_rewards().count, 1);
    assert_eq!(agent.learning_rewards().cumulative, 1.0);
    assert_eq!(agent.evaluation_rewards().count, 2);
    assert_eq!(agent.evaluation_rewards().cumulative, 4.0);

    agent.reset_reward_tracking();
    assert_eq!(agent.evaluation_rewards(), RewardStats::default());
}

// ============================================================================
// Runner
// ============================================================================

#[test]
fn test_runners_share_an_estimator() {
    let estimator = estimator(2);
    let config = AgentConfig::default().with_agent_update_cycle(1);
    let runner = RunnerConfig::default().with_episodes(20).with_max_steps(50);

    let handles: Vec<AgentHandle> = (0..2)
        .map(|seed| {
            let agent = DeepAgent::new(
                shared_environment(Corridor::new(4, true)),
                shared_synchronization(),
                EstimatorPolicy::new(estimator.clone(), ActionSelection::epsilon_greedy(0.3)).with_seed(seed),
                EstimatorValueFunction::new(estimator.clone(), QLearning::new(0.9)),
                config.clone(),
            )
            .unwrap();
            spawn_agent(agent, CorridorDriver, runner.clone()).unwrap()
        })
        .collect();

    for handle in handles {
        let stats = handle.join().unwrap();
        assert_eq!(stats.episodes, 20);
        assert_eq!(stats.boundaries, 20);
        assert!(stats.steps >= 20 * 3);
        assert_eq!(stats.learning.count, stats.steps);
    }
    let updates = estimator.lock().update_count();
    assert!((1..=20).contains(&updates));
}

#[test]
fn test_runner_stops_on_command() {
    let estimator = estimator(2);
    let agent = agent(Corridor::new(4, true), &estimator, AgentConfig::default());
    let handle = spawn_agent(
        agent,
        CorridorDriver,
        RunnerConfig::default().with_episodes(1_000_000).with_max_steps(10),
    )
    .unwrap();
    handle.stop();
    let stats = handle.join().unwrap();
    assert!(stats.episodes < 1_000_000);
}

#[test]
fn test_runner_reports_on_interval() {
    let estimator = estimator(2);
    let agent = agent(Corridor::new(3, true), &estimator, AgentConfig::default());
    let id = agent.id();
    let handle = spawn_agent(
        agent,
        CorridorDriver,
        RunnerConfig::default().with_episodes(4).with_max_steps(20).with_report_interval(2),
    )
    .unwrap();
    while !handle.is_finished() {
        std::thread::yield_now();
    }
    let first = handle.try_stats().unwrap();
    assert_eq!(first.agent, id);
    assert_eq!(first.episodes, 2);
    assert_eq!(handle.try_stats().unwrap().episodes, 4);
    assert_eq!(handle.join().unwrap().episodes, 4);
}
