//! Threaded episode loop for a [`DeepAgent`].
//!
//! Each runner owns one agent on its own thread and is steered over channels.
//! Agents in different runners may share estimators; updates then happen when
//! the last of them reaches its cycle boundary.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::reward::RewardStats;
use super::{AgentId, DeepAgent};
use crate::environment::Environment;
use crate::error::{AgentError, Result};
use crate::policy::Policy;
use crate::value::ValueFunction;

/// Commands accepted by a running agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerCommand {
    Stop,
    RequestStats,
}

/// Progress report of a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent: AgentId,
    pub episodes: usize,
    pub steps: usize,
    /// Update boundaries the agent reached.
    pub boundaries: usize,
    pub learning: RewardStats,
    pub evaluation: RewardStats,
}

/// Result of one committed action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub reward: f64,
    /// The episode ended with this step.
    pub done: bool,
}

/// Glue between an environment and the runner loop: how to start an episode
/// and how to read the outcome of the action just committed.
pub trait EpisodeDriver<Env>: Send + 'static {
    fn reset(&mut self, environment: &mut Env);

    fn outcome(&mut self, environment: &mut Env, agent: AgentId) -> StepOutcome;
}

/// Runner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Episodes to run. Continuing tasks run `episodes * max_steps` steps.
    pub episodes: usize,
    /// Step limit per episode.
    pub max_steps: usize,
    /// Episodes between unsolicited stats reports; 0 disables them.
    pub report_interval: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            max_steps: 1_000,
            report_interval: 0,
        }
    }
}

impl RunnerConfig {
    pub fn with_episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_report_interval(mut self, interval: usize) -> Self {
        self.report_interval = interval;
        self
    }
}

/// Handle to a spawned agent thread.
pub struct AgentHandle {
    agent: AgentId,
    thread: std::thread::JoinHandle<Result<AgentStats>>,
    commands: Sender<RunnerCommand>,
    reports: Receiver<AgentStats>,
}

impl AgentHandle {
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// Ask the agent to stop after its current step.
    pub fn stop(&self) {
        let _ = self.commands.try_send(RunnerCommand::Stop);
    }

    /// Ask for a stats report, delivered through [`try_stats`](Self::try_stats).
    pub fn request_stats(&self) {
        let _ = self.commands.try_send(RunnerCommand::RequestStats);
    }

    /// Latest pending report (non-blocking).
    pub fn try_stats(&self) -> Option<AgentStats> {
        self.reports.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread and return its final stats.
    pub fn join(self) -> Result<AgentStats> {
        let agent = self.agent;
        self.thread
            .join()
            .map_err(|_| AgentError::RunnerPanicked { agent })?
    }
}

#[derive(Default)]
struct Progress {
    episodes: usize,
    steps: usize,
}

impl Progress {
    fn stats<Env, P, V>(&self, agent: &DeepAgent<Env, P, V>) -> AgentStats
    where
        Env: Environment,
        P: Policy,
        V: ValueFunction,
    {
        AgentStats {
            agent: agent.id(),
            episodes: self.episodes,
            steps: self.steps,
            boundaries: agent.boundaries(),
            learning: agent.learning_rewards(),
            evaluation: agent.evaluation_rewards(),
        }
    }
}

/// Run `agent` on its own thread.
pub fn spawn_agent<Env, P, V, D>(
    mut agent: DeepAgent<Env, P, V>,
    mut driver: D,
    config: RunnerConfig,
) -> std::io::Result<AgentHandle>
where
    Env: Environment + 'static,
    P: Policy + 'static,
    V: ValueFunction + 'static,
    D: EpisodeDriver<Env>,
{
    let id = agent.id();
    let (report_tx, report_rx) = crossbeam_channel::bounded(100);
    let (command_tx, command_rx) = crossbeam_channel::bounded(100);

    let thread = std::thread::Builder::new()
        .name(format!("DeepAgent-{}", id.value()))
        .spawn(move || -> Result<AgentStats> {
            let mut progress = Progress::default();
            agent.start()?;
            let result = run(&mut agent, &mut driver, &config, &command_rx, &report_tx, &mut progress);
            agent.stop();
            if let Err(error) = &result {
                log::warn!("{} stopped on error: {}", id, error);
            }
            result.map(|()| progress.stats(&agent))
        })?;

    Ok(AgentHandle {
        agent: id,
        thread,
        commands: command_tx,
        reports: report_rx,
    })
}

fn run<Env, P, V, D>(
    agent: &mut DeepAgent<Env, P, V>,
    driver: &mut D,
    config: &RunnerConfig,
    commands: &Receiver<RunnerCommand>,
    reports: &Sender<AgentStats>,
    progress: &mut Progress,
) -> Result<()>
where
    Env: Environment,
    P: Policy,
    V: ValueFunction,
    D: EpisodeDriver<Env>,
{
    let episodic = agent.is_episodic();
    if !episodic {
        driver.reset(&mut agent.environment().lock());
        agent.start_episode();
    }

    for _ in 0..config.episodes {
        if episodic {
            driver.reset(&mut agent.environment().lock());
            agent.start_episode();
        }

        for _ in 0..config.max_steps {
            if let Ok(command) = commands.try_recv() {
                match command {
                    RunnerCommand::Stop => return Ok(()),
                    RunnerCommand::RequestStats => {
                        let _ = reports.try_send(progress.stats(agent));
                    }
                }
            }

            agent.new_time_step()?;
            agent.act()?;
            let outcome = {
                let id = agent.id();
                let mut environment = agent.environment().lock();
                driver.outcome(&mut environment, id)
            };
            agent.respond(outcome.reward)?;
            progress.steps += 1;
            if episodic && outcome.done {
                break;
            }
        }

        if episodic {
            agent.end_episode()?;
        }
        progress.episodes += 1;
        if config.report_interval > 0 && progress.episodes % config.report_interval == 0 {
            let _ = reports.try_send(progress.stats(agent));
        }
    }

    log::debug!(
        "{} finished {} episodes ({} steps)",
        agent.id(),
        progress.episodes,
        progress.steps
    );
    Ok(())
}
