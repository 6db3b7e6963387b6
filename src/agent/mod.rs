//! Agent lifecycle controller
//!
//! An [`Agent`] owns at most one environment handle and one policy and moves
//! between them in a fixed order:
//!
//! ```text
//! create_environment → create_policy → train → evaluate → persist / restore → close
//! ```
//!
//! Dependencies are created on demand: `create_policy` builds the default
//! environment when none exists, and `train` builds a default policy.
//! `evaluate` requires a policy that was created, trained or restored; it
//! never builds one itself.
//!
//! ```no_run
//! use gymrig::agent::Agent;
//!
//! # fn main() -> gymrig::Result<()> {
//! let mut agent = Agent::builder().seed(7).build()?;
//! agent.train(10_000)?;
//! let returns = agent.evaluate(5)?;
//! agent.persist("balance")?;
//! agent.close();
//! # let _ = returns;
//! # Ok(())
//! # }
//! ```

use std::{fmt, fs, path::PathBuf};

use image::RgbImage;

use crate::{
    env::{EnvHandle, EnvRegistry, RenderMode},
    error::{Error, Result, Stage},
    policy::{
        Policy, PolicyBackend, PolicyConfig, PolicyKind, PolicySpec, DEFAULT_LEARNING_RATE,
    },
    train::TrainingSummary,
};

pub mod config;

pub use config::{AgentBuilder, AgentConfig};

/// Extension of persisted policy artifacts
pub const ARTIFACT_EXTENSION: &str = "json";

/// Observable lifecycle state of an [`Agent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Neither environment nor policy
    Uninitialized,
    /// An environment handle but no policy
    EnvironmentReady,
    /// A policy that has not been trained
    PolicyReady,
    /// A policy with at least one training step behind it
    Trained,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Uninitialized => "uninitialized",
            AgentState::EnvironmentReady => "environment-ready",
            AgentState::PolicyReady => "policy-ready",
            AgentState::Trained => "trained",
        };
        f.write_str(name)
    }
}

/// Owns an environment handle and a policy and drives their lifecycle
///
/// Dropping the agent closes its environment.
pub struct Agent {
    config: AgentConfig,
    registry: EnvRegistry,
    backend: Box<dyn PolicyBackend>,
    env: Option<EnvHandle>,
    policy: Option<Box<dyn Policy>>,
}

impl Agent {
    /// Agent with built-in environments and policy backend
    pub fn new(config: AgentConfig) -> Result<Self> {
        AgentBuilder::new().config(config).build()
    }

    /// Builder for custom registries and backends
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub(crate) fn from_parts(
        config: AgentConfig,
        registry: EnvRegistry,
        backend: Box<dyn PolicyBackend>,
    ) -> Self {
        tracing::debug!(env = %config.env_id, backend = backend.name(), "Agent created");
        Self { config, registry, backend, env: None, policy: None }
    }

    /// Configuration fixed at construction
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Environment registry used to resolve `env_id`
    pub fn registry(&self) -> &EnvRegistry {
        &self.registry
    }

    /// Live environment handle, if any
    pub fn environment(&self) -> Option<&EnvHandle> {
        self.env.as_ref()
    }

    /// Current policy, if any
    pub fn policy(&self) -> Option<&dyn Policy> {
        self.policy.as_deref()
    }

    /// Current lifecycle state
    pub fn state(&self) -> AgentState {
        match (&self.policy, &self.env) {
            (Some(policy), _) if policy.steps_trained() > 0 => AgentState::Trained,
            (Some(_), _) => AgentState::PolicyReady,
            (None, Some(_)) => AgentState::EnvironmentReady,
            (None, None) => AgentState::Uninitialized,
        }
    }

    /// Build the environment handle, replacing any existing one
    ///
    /// `parallelism > 1` creates that many instances stepped in lockstep.
    pub fn create_environment(&mut self, parallelism: usize, render_mode: RenderMode) -> Result<()> {
        if parallelism == 0 {
            return Err(Error::config(Stage::CreateEnvironment, "parallelism must be at least 1"));
        }
        self.close();

        let handle = EnvHandle::create(&self.registry, &self.config.env_id, parallelism, render_mode)?;
        if let Some(policy) = &self.policy {
            if policy.observation_space() != &handle.observation_space()
                || policy.action_space() != &handle.action_space()
            {
                tracing::warn!(
                    env = %handle.id(),
                    "New environment spaces differ from the current policy; train and evaluate will fail"
                );
            }
        }
        self.env = Some(handle);
        Ok(())
    }

    /// Build a fresh policy bound to the current environment's spaces
    ///
    /// The learning rate, the configuration and the backend options are
    /// validated before anything else happens. Without an environment, the
    /// default one (`parallelism` 1, no rendering) is created first.
    pub fn create_policy(
        &mut self,
        kind: PolicyKind,
        learning_rate: f64,
        config: PolicyConfig,
    ) -> Result<()> {
        let spec = PolicySpec::new(kind, learning_rate, config)?;
        self.backend.validate(&spec)?;
        self.ensure_environment()?;
        let env = self.env.as_ref().ok_or_else(|| no_environment(Stage::CreatePolicy))?;

        let observation_space = env.observation_space();
        let action_space = env.action_space();
        kind.check_spaces(&observation_space, &action_space)?;

        let policy = self.backend.build(&spec, &observation_space, &action_space)?;
        tracing::info!(
            %kind,
            learning_rate,
            backend = self.backend.name(),
            env = %env.id(),
            "Policy created"
        );
        self.policy = Some(policy);
        Ok(())
    }

    /// Optimize the policy for `total_steps` interaction steps
    ///
    /// Creates the default policy (and environment) when missing. Blocks
    /// until training is done.
    pub fn train(&mut self, total_steps: usize) -> Result<TrainingSummary> {
        if total_steps == 0 {
            return Err(Error::config(Stage::Train, "total_steps must be positive"));
        }
        self.ensure_policy()?;
        self.ensure_environment()?;

        let _span = tracing::info_span!("train", total_steps).entered();
        let (Some(env), Some(policy)) = (self.env.as_mut(), self.policy.as_mut()) else {
            return Err(no_environment(Stage::Train));
        };
        let summary = policy.learn(env, total_steps)?;
        tracing::info!(steps_trained = policy.steps_trained(), "Training complete");
        Ok(summary)
    }

    /// Run `episodes` deterministic episodes and return their total rewards
    ///
    /// Requires a policy; the default environment is created when missing.
    /// The policy is never modified.
    pub fn evaluate(&mut self, episodes: usize) -> Result<Vec<f32>> {
        self.run_episodes(episodes, None)
    }

    /// Like [`Agent::evaluate`], passing the frame rendered after every step
    /// to `on_frame`
    ///
    /// The environment must have been created with [`RenderMode::RgbArray`].
    pub fn evaluate_rendered<F>(&mut self, episodes: usize, mut on_frame: F) -> Result<Vec<f32>>
    where
        F: FnMut(RgbImage) -> Result<()>,
    {
        self.run_episodes(episodes, Some(&mut on_frame))
    }

    fn run_episodes(
        &mut self,
        episodes: usize,
        mut on_frame: Option<&mut dyn FnMut(RgbImage) -> Result<()>>,
    ) -> Result<Vec<f32>> {
        if self.policy.is_none() {
            return Err(Error::state(
                Stage::Evaluate,
                "no policy to evaluate; call create_policy, train or restore first",
            ));
        }
        self.ensure_environment()?;

        let (Some(env), Some(policy)) = (self.env.as_mut(), self.policy.as_ref()) else {
            return Err(no_environment(Stage::Evaluate));
        };
        if on_frame.is_some() && env.render_mode() != RenderMode::RgbArray {
            return Err(Error::state(
                Stage::Evaluate,
                format!(
                    "rendered evaluation needs an environment created with RenderMode::RgbArray, \
                     current mode is {:?}",
                    env.render_mode()
                ),
            ));
        }

        let _span = tracing::info_span!("evaluate", episodes, env = %env.id()).entered();
        let mut returns = Vec::with_capacity(episodes);
        for episode in 0..episodes {
            let seed = self.config.seed.map(|seed| seed.wrapping_add(episode as u64));
            let mut observation = env.reset_one(0, seed)?;
            let mut total = 0.0;
            let mut steps = 0;

            while steps < self.config.max_episode_steps {
                let action = policy.predict(&observation)?;
                let result = env.step_one(0, action)?;
                steps += 1;
                total += result.reward;

                if let Some(callback) = on_frame.as_deref_mut() {
                    if let Some(frame) = env.render()? {
                        callback(frame)?;
                    }
                }
                if result.done() {
                    break;
                }
                observation = result.observation;
            }

            tracing::debug!(episode, steps, total_reward = total, "Episode finished");
            returns.push(total);
        }

        if !returns.is_empty() {
            let mean = returns.iter().sum::<f32>() / returns.len() as f32;
            tracing::info!(episodes, mean_return = mean, "Evaluation complete");
        }
        Ok(returns)
    }

    /// Artifact location for `name`
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.config.model_dir.join(format!("{name}.{ARTIFACT_EXTENSION}"))
    }

    /// Save the policy as `<model_dir>/<name>.json`
    pub fn persist(&self, name: &str) -> Result<PathBuf> {
        let policy = self.policy.as_ref().ok_or_else(|| {
            Error::state(Stage::Persist, "no policy to persist; create or train one first")
        })?;
        config::check_artifact_name(name, Stage::Persist)?;

        let dir = &self.config.model_dir;
        fs::create_dir_all(dir).map_err(|e| {
            Error::io(Stage::Persist, format!("creating model directory {}", dir.display()), e)
        })?;
        let path = self.artifact_path(name);
        policy.save(&path)?;
        tracing::info!(path = %path.display(), steps_trained = policy.steps_trained(), "Policy saved");
        Ok(path)
    }

    /// Replace the policy with the artifact saved under `name`
    ///
    /// The environment is left untouched.
    pub fn restore(&mut self, name: &str) -> Result<()> {
        config::check_artifact_name(name, Stage::Restore)?;
        let path = self.artifact_path(name);
        let policy = self.backend.load(&path)?;

        if let Some(env) = &self.env {
            if policy.observation_space() != &env.observation_space() {
                tracing::warn!(env = %env.id(), "Restored policy does not match the current environment");
            }
        }
        tracing::info!(path = %path.display(), steps_trained = policy.steps_trained(), "Policy restored");
        self.policy = Some(policy);
        Ok(())
    }

    /// [`Agent::persist`] under the configured model name
    pub fn save_model(&self) -> Result<PathBuf> {
        self.persist(&self.config.model_name)
    }

    /// [`Agent::restore`] from the configured model name
    pub fn load_model(&mut self) -> Result<()> {
        let name = self.config.model_name.clone();
        self.restore(&name)
    }

    /// Release the environment handle
    ///
    /// Idempotent. The policy is kept, so a restored or trained policy can
    /// be evaluated again on a fresh environment.
    pub fn close(&mut self) {
        if let Some(mut env) = self.env.take() {
            env.close();
        }
    }

    fn ensure_environment(&mut self) -> Result<()> {
        if self.env.is_none() {
            tracing::debug!(env = %self.config.env_id, "Creating default environment");
            self.create_environment(1, RenderMode::None)?;
        }
        Ok(())
    }

    fn ensure_policy(&mut self) -> Result<()> {
        if self.policy.is_none() {
            tracing::debug!("Creating default policy");
            let config = PolicyConfig { seed: self.config.seed, ..PolicyConfig::default() };
            self.create_policy(PolicyKind::default(), DEFAULT_LEARNING_RATE, config)?;
        }
        Ok(())
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .finish()
    }
}

fn no_environment(stage: Stage) -> Error {
    Error::state(stage, "environment handle missing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut agent = Agent::new(AgentConfig::default()).unwrap();
        assert_eq!(agent.state(), AgentState::Uninitialized);

        agent.create_environment(1, RenderMode::None).unwrap();
        assert_eq!(agent.state(), AgentState::EnvironmentReady);

        let config = PolicyConfig::new().n_steps(16).batch_size(8).n_epochs(1);
        agent.create_policy(PolicyKind::Flat, 1e-3, config).unwrap();
        assert_eq!(agent.state(), AgentState::PolicyReady);

        agent.train(16).unwrap();
        assert_eq!(agent.state(), AgentState::Trained);

        agent.close();
        assert!(agent.environment().is_none());
        assert_eq!(agent.state(), AgentState::Trained, "policy survives close");
    }

    #[test]
    fn test_evaluate_without_policy_is_state_error() {
        let mut agent = Agent::new(AgentConfig::default()).unwrap();
        let err = agent.evaluate(1).unwrap_err();
        assert!(err.is_state());
        assert!(agent.policy().is_none(), "no implicit policy");
    }

    #[test]
    fn test_invalid_policy_config_creates_nothing() {
        let mut agent = Agent::new(AgentConfig::default()).unwrap();
        let err = agent.create_policy(PolicyKind::Flat, -1.0, PolicyConfig::default()).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(agent.state(), AgentState::Uninitialized);
    }

    #[test]
    fn test_incompatible_kind_rejected() {
        let mut agent = Agent::new(AgentConfig::default()).unwrap();
        let err = agent
            .create_policy(PolicyKind::ImageGrid, 1e-3, PolicyConfig::default())
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(agent.state(), AgentState::EnvironmentReady, "auto-created env stays owned");
    }

    #[test]
    fn test_rendered_evaluation_needs_rgb_array() {
        let mut agent = Agent::builder().env_id("grid-walk-task").build().unwrap();
        agent.create_policy(PolicyKind::ImageGrid, 1e-3, PolicyConfig::default()).unwrap();

        let err = agent.evaluate_rendered(1, |_| Ok(())).unwrap_err();
        assert!(err.is_state());
        assert!(err.to_string().contains("RgbArray"));
    }

    #[test]
    fn test_step_budget_caps_episodes() {
        let mut agent = Agent::builder().max_episode_steps(5).seed(1).build().unwrap();
        agent.create_policy(PolicyKind::Flat, 1e-3, PolicyConfig::default()).unwrap();
        for total in agent.evaluate(3).unwrap() {
            assert!(total <= 5.0, "cart-pole pays 1 per step, got {total}");
        }
    }

    #[test]
    fn test_persist_rejects_bad_names() {
        let mut agent = Agent::new(AgentConfig::default()).unwrap();
        agent.create_policy(PolicyKind::Flat, 1e-3, PolicyConfig::default()).unwrap();
        assert!(agent.persist("a/b").unwrap_err().is_configuration());
    }
}
