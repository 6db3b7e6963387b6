//! Vectorized environment pool for lockstep execution
//!
//! `parallelism` independent simulation instances are reset and stepped
//! together using Rayon, presenting batched observations, rewards and flags
//! through a single value.
//!
//! # Example
//!
//! ```rust
//! use gymrig::env::{cartpole::CartPole, pool::EnvPool, Environment};
//!
//! let mut pool = EnvPool::new(|| Box::new(CartPole::new()) as Box<dyn Environment>, 4).unwrap();
//!
//! let observations = pool.reset(Some(0)).unwrap();
//! assert_eq!(observations.len(), 4);
//!
//! let results = pool.step(&[0, 1, 0, 1]).unwrap();
//! assert_eq!(results.len(), 4);
//! ```

use rayon::prelude::*;

use crate::{
    env::{Environment, SpaceInfo, StepResult},
    error::{Error, Result, Stage},
};

/// A pool of environments stepped in lockstep
///
/// For N environments with average step time T, a sequential step costs
/// O(N * T) while the pool costs about O(T) when N ≤ num_cores.
pub struct EnvPool {
    envs: Vec<Box<dyn Environment>>,
}

impl EnvPool {
    /// Create a new environment pool
    ///
    /// # Arguments
    ///
    /// * `env_fn` - Factory function to create environment instances
    /// * `num_envs` - Number of parallel environments (at least 1)
    pub fn new<F>(env_fn: F, num_envs: usize) -> Result<Self>
    where
        F: Fn() -> Box<dyn Environment>,
    {
        Self::from_envs((0..num_envs).map(|_| env_fn()).collect())
    }

    /// Wrap already constructed environments
    ///
    /// All environments must share observation and action spaces.
    pub fn from_envs(envs: Vec<Box<dyn Environment>>) -> Result<Self> {
        let Some(first) = envs.first() else {
            return Err(Error::config(
                Stage::CreateEnvironment,
                "an environment pool needs at least one instance",
            ));
        };

        let (obs_space, action_space) = (first.observation_space(), first.action_space());
        if envs
            .iter()
            .any(|env| env.observation_space() != obs_space || env.action_space() != action_space)
        {
            return Err(Error::config(
                Stage::CreateEnvironment,
                "all pooled environments must share observation and action spaces",
            ));
        }

        Ok(Self { envs })
    }

    /// Reset all environments in parallel
    ///
    /// Instance `i` is seeded with `seed + i` when a seed is given. Returns one
    /// initial observation per environment.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Vec<Vec<f32>>> {
        self.envs
            .par_iter_mut()
            .enumerate()
            .map(|(i, env)| env.reset(seed.map(|s| s.wrapping_add(i as u64))))
            .collect()
    }

    /// Step all environments in parallel with one action each
    pub fn step(&mut self, actions: &[i64]) -> Result<Vec<StepResult>> {
        if actions.len() != self.envs.len() {
            return Err(Error::config(
                Stage::Simulate,
                format!(
                    "number of actions ({}) must match number of environments ({})",
                    actions.len(),
                    self.envs.len()
                ),
            ));
        }

        self.envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .map(|(env, &action)| env.step(action))
            .collect()
    }

    /// Reset a specific environment by index
    pub fn reset_env(&mut self, env_id: usize, seed: Option<u64>) -> Result<Vec<f32>> {
        self.env_mut(env_id)?.reset(seed)
    }

    /// Step a specific environment by index
    pub fn step_env(&mut self, env_id: usize, action: i64) -> Result<StepResult> {
        self.env_mut(env_id)?.step(action)
    }

    /// Borrow a specific environment
    pub fn env(&self, env_id: usize) -> Option<&dyn Environment> {
        self.envs.get(env_id).map(|env| env.as_ref())
    }

    fn env_mut(&mut self, env_id: usize) -> Result<&mut Box<dyn Environment>> {
        let num_envs = self.envs.len();
        self.envs.get_mut(env_id).ok_or_else(|| {
            Error::config(
                Stage::Simulate,
                format!("environment index {env_id} out of range for pool of {num_envs}"),
            )
        })
    }

    /// Get the number of environments in the pool
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Observation space shared by every instance
    pub fn observation_space(&self) -> SpaceInfo {
        self.envs[0].observation_space()
    }

    /// Action space shared by every instance
    pub fn action_space(&self) -> SpaceInfo {
        self.envs[0].action_space()
    }

    /// Close every instance
    pub fn close(&mut self) {
        for env in &mut self.envs {
            env.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::cartpole::CartPole;

    fn cartpole_pool(n: usize) -> EnvPool {
        EnvPool::new(|| Box::new(CartPole::new()), n).unwrap()
    }

    #[test]
    fn test_pool_creation() {
        assert_eq!(cartpole_pool(4).num_envs(), 4);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let err = EnvPool::from_envs(Vec::new()).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_pool_reset() {
        let mut pool = cartpole_pool(4);
        let observations = pool.reset(None).unwrap();

        assert_eq!(observations.len(), 4);
        for obs in observations {
            assert_eq!(obs.len(), 4);
        }
    }

    #[test]
    fn test_seeded_instances_differ_but_repeat() {
        let mut pool = cartpole_pool(3);
        let first = pool.reset(Some(10)).unwrap();
        let second = pool.reset(Some(10)).unwrap();

        assert_eq!(first, second);
        assert_ne!(first[0], first[1], "each instance gets its own seed");
    }

    #[test]
    fn test_pool_step() {
        let mut pool = cartpole_pool(4);
        pool.reset(None).unwrap();

        let results = pool.step(&[0, 1, 0, 1]).unwrap();
        assert_eq!(results.len(), 4);
        for result in results {
            assert_eq!(result.observation.len(), 4);
            assert_eq!(result.reward, 1.0);
        }
    }

    #[test]
    fn test_pool_step_wrong_action_count() {
        let mut pool = cartpole_pool(4);
        pool.reset(None).unwrap();

        let err = pool.step(&[0, 1]).unwrap_err();
        assert!(err.to_string().contains("must match number of environments"));
    }

    #[test]
    fn test_single_env_access() {
        let mut pool = cartpole_pool(2);
        pool.reset(None).unwrap();

        assert_eq!(pool.reset_env(1, Some(4)).unwrap().len(), 4);
        assert_eq!(pool.step_env(1, 0).unwrap().observation.len(), 4);
        assert!(pool.step_env(2, 0).is_err());
    }

    #[test]
    fn test_pool_spaces() {
        let pool = cartpole_pool(4);
        assert_eq!(pool.observation_space().shape, vec![4]);
        assert_eq!(pool.action_space().shape, Vec::<usize>::new());
    }

    #[test]
    fn test_pool_large_batch() {
        let mut pool = cartpole_pool(16);
        assert_eq!(pool.reset(None).unwrap().len(), 16);
        assert_eq!(pool.step(&[0; 16]).unwrap().len(), 16);
    }
}
