//! Agent configuration and builder

use std::path::PathBuf;

use crate::{
    agent::Agent,
    env::{cartpole, EnvRegistry},
    error::{Error, Result, Stage},
    policy::{BuiltinBackend, PolicyBackend},
};

/// Default directory for policy artifacts
pub const DEFAULT_MODEL_DIR: &str = "models";

/// Default artifact name used by [`Agent::save_model`] and [`Agent::load_model`]
pub const DEFAULT_MODEL_NAME: &str = "toy_balance_policy";

/// Default per-episode step budget during evaluation
pub const DEFAULT_MAX_EPISODE_STEPS: usize = 10_000;

/// Settings fixed for the lifetime of an [`Agent`]
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Environment identifier resolved by the registry
    pub env_id: String,

    /// Artifact name used by `save_model` / `load_model`
    pub model_name: String,

    /// Directory holding policy artifacts
    pub model_dir: PathBuf,

    /// Evaluation episodes stop after this many steps
    pub max_episode_steps: usize,

    /// Seed for evaluation resets (episode `i` uses `seed + i`) and for the
    /// default policy
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            env_id: cartpole::TASK_ID.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            max_episode_steps: DEFAULT_MAX_EPISODE_STEPS,
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.env_id.trim().is_empty() {
            return Err(Error::config(Stage::CreateEnvironment, "env_id must not be empty"));
        }
        check_artifact_name(&self.model_name, Stage::Persist)?;
        if self.max_episode_steps == 0 {
            return Err(Error::config(Stage::Evaluate, "max_episode_steps must be positive"));
        }
        Ok(())
    }
}

/// Artifact names become file stems inside the model directory
pub(crate) fn check_artifact_name(name: &str, stage: Stage) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(Error::config(
            stage,
            format!("invalid model name '{name}': use a plain file stem without separators"),
        ));
    }
    Ok(())
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    config: AgentConfig,
    registry: EnvRegistry,
    backend: Box<dyn PolicyBackend>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            config: AgentConfig::default(),
            registry: EnvRegistry::with_builtins(),
            backend: Box::new(BuiltinBackend),
        }
    }
}

impl AgentBuilder {
    /// Start from [`AgentConfig::default`] and the built-in backends
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the environment identifier
    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.config.env_id = env_id.into();
        self
    }

    /// Set the default artifact name
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.config.model_name = name.into();
        self
    }

    /// Set the artifact directory
    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    /// Set the evaluation step budget
    pub fn max_episode_steps(mut self, steps: usize) -> Self {
        self.config.max_episode_steps = steps;
        self
    }

    /// Set the seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Use a custom environment registry
    pub fn registry(mut self, registry: EnvRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use a custom policy backend
    pub fn backend(mut self, backend: impl PolicyBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<Agent> {
        self.config.validate()?;
        Ok(Agent::from_parts(self.config, self.registry, self.backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.env_id, "toy-balance-task");
        assert_eq!(config.max_episode_steps, 10_000);
    }

    #[test]
    fn test_config_validation() {
        let bad = [
            AgentConfig { env_id: " ".into(), ..Default::default() },
            AgentConfig { model_name: "../escape".into(), ..Default::default() },
            AgentConfig { model_name: String::new(), ..Default::default() },
            AgentConfig { max_episode_steps: 0, ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().unwrap_err().is_configuration(), "{config:?}");
        }
    }

    #[test]
    fn test_builder() {
        let agent = AgentBuilder::new()
            .env_id("grid-walk-task")
            .model_name("walker")
            .max_episode_steps(20)
            .seed(3)
            .build()
            .unwrap();
        assert_eq!(agent.config().env_id, "grid-walk-task");
        assert_eq!(agent.config().seed, Some(3));
        assert!(AgentBuilder::new().max_episode_steps(0).build().is_err());
    }
}
