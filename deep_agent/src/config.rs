//! Typed configuration for agents and function estimators.
//!
//! Both configs follow the same shape: `Default` values, `with_*` builders,
//! `validate()` and `build()`. They can also be filled from a parameter list
//! of the form `name = value, name = value`:
//!
//! ```ignore
//! use deep_agent::config::{AgentConfig, EstimatorConfig, Params};
//!
//! let params = Params::parse("agentUpdateCycle = 5, targetFunctionUpdateCycle = 100")?;
//! params.ensure_known(&[AgentConfig::PARAMS, EstimatorConfig::PARAMS].concat())?;
//! let agent = AgentConfig::default().apply_params(&params)?.build()?;
//! let estimator = EstimatorConfig::default().apply_params(&params)?.build()?;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A count parameter must be positive.
    #[error("{field} must be > 0, got {value}")]
    InvalidCount { field: &'static str, value: usize },

    /// A parameter is outside its valid range.
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A parameter name that no component recognizes.
    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },

    /// A parameter value that does not parse as the expected type.
    #[error("parameter '{name}' expects {expected}, got '{value}'")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    /// An entry without the `name = value` shape.
    #[error("malformed parameter entry '{0}'")]
    MalformedParameter(String),
}

// ============================================================================
// Parameter lists
// ============================================================================

/// Parsed `name = value` parameter list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Parse a comma-separated `name = value` list. Empty entries are skipped.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for entry in text.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedParameter(entry.to_string()))?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return Err(ConfigError::MalformedParameter(entry.to_string()));
            }
            entries.push((name.to_string(), value.to_string()));
        }
        Ok(Self { entries })
    }

    /// Fail on the first name not contained in `known`.
    pub fn ensure_known(&self, known: &[&str]) -> Result<(), ConfigError> {
        match self.entries.iter().find(|(name, _)| !known.contains(&name.as_str())) {
            Some((name, _)) => Err(ConfigError::UnknownParameter { name: name.clone() }),
            None => Ok(()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last value given for `name`.
    fn raw(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_usize(&self, name: &str) -> Result<Option<usize>, ConfigError> {
        self.get_parsed(name, "INT")
    }

    pub fn get_f64(&self, name: &str) -> Result<Option<f64>, ConfigError> {
        self.get_parsed(name, "DOUBLE")
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        self.get_parsed(name, "BOOLEAN")
    }

    fn get_parsed<T: std::str::FromStr>(
        &self,
        name: &str,
        expected: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(value) => value.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: value.to_string(),
                expected,
            }),
        }
    }
}

fn check_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidCount { field, value });
    }
    Ok(())
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

// ============================================================================
// Agent configuration
// ============================================================================

/// Update cycle used for continuing tasks when none is configured.
pub const DEFAULT_NON_EPISODIC_UPDATE_CYCLE: usize = 10;

/// Configuration for a [`DeepAgent`](crate::agent::DeepAgent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Episodes (or timesteps for continuing tasks) between estimator updates.
    /// `None` selects 1 for episodic and 10 for continuing tasks.
    pub agent_update_cycle: Option<usize>,
    /// Decay of the reward baseline used to center continuing-task rewards.
    pub reward_tau: f64,
    /// Decay of the moving average reported by reward tracking.
    pub reward_tracking_tau: f64,
    /// States retained behind the current one for continuing tasks.
    pub non_episodic_trajectory_history_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_update_cycle: None,
            reward_tau: 0.9,
            reward_tracking_tau: 0.99,
            non_episodic_trajectory_history_size: 16,
        }
    }
}

impl AgentConfig {
    /// Parameter names understood by [`AgentConfig::apply_params`].
    pub const PARAMS: &'static [&'static str] = &[
        "agentUpdateCycle",
        "rewardTau",
        "rewardTrackingTau",
        "nonEpisodicTrajectoryHistorySize",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Parse, reject unknown names, apply and validate in one step.
    pub fn from_params(text: &str) -> Result<Self, ConfigError> {
        let params = Params::parse(text)?;
        params.ensure_known(Self::PARAMS)?;
        Self::default().apply_params(&params)?.build()
    }

    /// Overwrite the fields named in `params`. Unknown names are ignored here;
    /// use [`Params::ensure_known`] to reject them.
    pub fn apply_params(mut self, params: &Params) -> Result<Self, ConfigError> {
        if let Some(cycle) = params.get_usize("agentUpdateCycle")? {
            self.agent_update_cycle = Some(cycle);
        }
        if let Some(tau) = params.get_f64("rewardTau")? {
            self.reward_tau = tau;
        }
        if let Some(tau) = params.get_f64("rewardTrackingTau")? {
            self.reward_tracking_tau = tau;
        }
        if let Some(size) = params.get_usize("nonEpisodicTrajectoryHistorySize")? {
            self.non_episodic_trajectory_history_size = size;
        }
        Ok(self)
    }

    /// Effective update cycle for the given task kind.
    pub fn update_cycle(&self, episodic: bool) -> usize {
        match self.agent_update_cycle {
            Some(cycle) => cycle,
            None if episodic => 1,
            None => DEFAULT_NON_EPISODIC_UPDATE_CYCLE,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cycle) = self.agent_update_cycle {
            check_count("agent_update_cycle", cycle)?;
        }
        check_unit("reward_tau", self.reward_tau)?;
        check_unit("reward_tracking_tau", self.reward_tracking_tau)?;
        check_count(
            "non_episodic_trajectory_history_size",
            self.non_episodic_trajectory_history_size,
        )?;
        Ok(())
    }

    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn with_agent_update_cycle(mut self, cycle: usize) -> Self {
        self.agent_update_cycle = Some(cycle);
        self
    }

    pub fn with_reward_tau(mut self, tau: f64) -> Self {
        self.reward_tau = tau;
        self
    }

    pub fn with_reward_tracking_tau(mut self, tau: f64) -> Self {
        self.reward_tracking_tau = tau;
        self
    }

    pub fn with_non_episodic_trajectory_history_size(mut self, size: usize) -> Self {
        self.non_episodic_trajectory_history_size = size;
        self
    }
}

// ============================================================================
// Estimator configuration
// ============================================================================

/// Configuration for a [`FunctionEstimator`](crate::estimator::FunctionEstimator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Updates between hard target copies. 0 selects Polyak blending.
    pub target_function_update_cycle: usize,
    /// Polyak blend rate used when `target_function_update_cycle` is 0.
    pub target_function_tau: f64,
    /// Training passes over the pending batch per update.
    pub number_of_iterations: usize,
    /// Step size handed to the backend optimizer.
    pub learning_rate: f64,
    /// Number of states (current included) fed to the backend.
    pub state_history_size: usize,
    /// Number of past actions fed to the backend.
    pub action_history_size: usize,
    /// Output slot 0 holds a state value and actions start at slot 1.
    pub state_action_value: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            target_function_update_cycle: 0,
            target_function_tau: 0.001,
            number_of_iterations: 1,
            learning_rate: 0.001,
            state_history_size: 1,
            action_history_size: 0,
            state_action_value: false,
        }
    }
}

impl EstimatorConfig {
    /// Parameter names understood by [`EstimatorConfig::apply_params`].
    pub const PARAMS: &'static [&'static str] = &[
        "targetFunctionUpdateCycle",
        "targetFunctionTau",
        "numberOfIterations",
        "learningRate",
        "stateHistorySize",
        "actionHistorySize",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    /// Parse, reject unknown names, apply and validate in one step.
    pub fn from_params(text: &str) -> Result<Self, ConfigError> {
        let params = Params::parse(text)?;
        params.ensure_known(Self::PARAMS)?;
        Self::default().apply_params(&params)?.build()
    }

    pub fn apply_params(mut self, params: &Params) -> Result<Self, ConfigError> {
        if let Some(cycle) = params.get_usize("targetFunctionUpdateCycle")? {
            self.target_function_update_cycle = cycle;
        }
        if let Some(tau) = params.get_f64("targetFunctionTau")? {
            self.target_function_tau = tau;
        }
        if let Some(iterations) = params.get_usize("numberOfIterations")? {
            self.number_of_iterations = iterations;
        }
        if let Some(rate) = params.get_f64("learningRate")? {
            self.learning_rate = rate;
        }
        if let Some(size) = params.get_usize("stateHistorySize")? {
            self.state_history_size = size;
        }
        if let Some(size) = params.get_usize("actionHistorySize")? {
            self.action_history_size = size;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("target_function_tau", self.target_function_tau)?;
        check_count("number_of_iterations", self.number_of_iterations)?;
        check_count("state_history_size", self.state_history_size)?;
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        Ok(())
    }

    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Hard copy every `cycle` updates.
    pub fn with_target_function_update_cycle(mut self, cycle: usize) -> Self {
        self.target_function_update_cycle = cycle;
        self
    }

    pub fn with_target_function_tau(mut self, tau: f64) -> Self {
        self.target_function_tau = tau;
        self
    }

    pub fn with_number_of_iterations(mut self, iterations: usize) -> Self {
        self.number_of_iterations = iterations;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_state_history_size(mut self, size: usize) -> Self {
        self.state_history_size = size;
        self
    }

    pub fn with_action_history_size(mut self, size: usize) -> Self {
        self.action_history_size = size;
        self
    }

    pub fn with_state_action_value(mut self, state_action_value: bool) -> Self {
        self.state_action_value = state_action_value;
        self
    }
}
