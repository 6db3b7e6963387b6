//! Policy capability and the built-in backend
//!
//! The agent only talks to [`Policy`] (predict, learn, save) and
//! [`PolicyBackend`] (build, load), so alternate learning libraries can be
//! substituted without touching the lifecycle controller. The crate ships
//! [`builtin::BuiltinBackend`], a small tch network policy.

use std::{fmt, path::Path, str::FromStr};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    env::{EnvHandle, SpaceInfo, SpaceType},
    error::{Error, Result, Stage},
    train::TrainingSummary,
};

pub mod builtin;
pub mod config;
pub mod features;
pub mod network;

pub use builtin::BuiltinBackend;
pub use config::PolicyConfig;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 3e-4;

/// Input-processing architecture of a policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    /// Flat observation vectors (`MlpPolicy`)
    #[default]
    Flat,
    /// `[height, width, channels]` image observations (`CnnPolicy`)
    ImageGrid,
}

impl PolicyKind {
    /// Check that this architecture can consume the given spaces
    ///
    /// Both kinds need a discrete action space; `Flat` needs a 1-D
    /// observation and `ImageGrid` a 3-D one.
    pub fn check_spaces(&self, observation: &SpaceInfo, action: &SpaceInfo) -> Result<()> {
        if !matches!(action.space_type, SpaceType::Discrete(n) if n > 0) {
            return Err(Error::config(
                Stage::CreatePolicy,
                format!("{self} policies need a discrete action space, got {:?}", action.space_type),
            ));
        }

        let expected_rank = match self {
            PolicyKind::Flat => 1,
            PolicyKind::ImageGrid => 3,
        };
        if observation.shape.len() != expected_rank || observation.flat_size() == 0 {
            return Err(Error::config(
                Stage::CreatePolicy,
                format!(
                    "{self} policies need a {expected_rank}-D observation space, got shape {:?}",
                    observation.shape
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Flat => f.write_str("flat-vector"),
            PolicyKind::ImageGrid => f.write_str("image-grid"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat-vector" | "MlpPolicy" => Ok(PolicyKind::Flat),
            "image-grid" | "CnnPolicy" => Ok(PolicyKind::ImageGrid),
            other => Err(Error::config(
                Stage::CreatePolicy,
                format!("unknown policy kind '{other}' (expected flat-vector or image-grid)"),
            )),
        }
    }
}

/// Everything needed to build a fresh policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Input-processing architecture
    pub kind: PolicyKind,
    /// Optimizer step size
    pub learning_rate: f64,
    /// Optimizer hyperparameters and backend options
    pub config: PolicyConfig,
}

impl PolicySpec {
    /// Bundle and validate
    pub fn new(kind: PolicyKind, learning_rate: f64, config: PolicyConfig) -> Result<Self> {
        let spec = Self { kind, learning_rate, config };
        spec.validate()?;
        Ok(spec)
    }

    /// Validate learning rate and configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::config(
                Stage::CreatePolicy,
                format!("learning_rate must be positive, got {}", self.learning_rate),
            ));
        }
        self.config.validate()
    }
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            learning_rate: DEFAULT_LEARNING_RATE,
            config: PolicyConfig::default(),
        }
    }
}

/// A trainable observation → action mapping
pub trait Policy: Send {
    /// Architecture of this policy
    fn kind(&self) -> PolicyKind;

    /// Observation space the policy was built for
    fn observation_space(&self) -> &SpaceInfo;

    /// Action space the policy was built for
    fn action_space(&self) -> &SpaceInfo;

    /// Action probabilities for one observation
    fn action_probs(&self, observation: &[f32]) -> Result<Vec<f32>>;

    /// Most likely action (deterministic prediction)
    fn predict(&self, observation: &[f32]) -> Result<i64> {
        let probs = self.action_probs(observation)?;
        Ok(argmax(&probs) as i64)
    }

    /// Action sampled from the policy distribution
    fn sample(&self, observation: &[f32], rng: &mut dyn RngCore) -> Result<i64> {
        let probs = self.action_probs(observation)?;
        Ok(sample_index(&probs, rng) as i64)
    }

    /// Run the optimizer for `total_steps` interaction steps on `env`
    fn learn(&mut self, env: &mut EnvHandle, total_steps: usize) -> Result<TrainingSummary>;

    /// Write the policy artifact to `path`
    fn save(&self, path: &Path) -> Result<()>;

    /// Interaction steps this policy has been trained for
    fn steps_trained(&self) -> u64;
}

/// Factory for policies of one learning library
pub trait PolicyBackend: Send + Sync {
    /// Short backend name used in diagnostics
    fn name(&self) -> &str;

    /// Reject options this backend cannot honour
    ///
    /// Runs before any environment exists, so it must not depend on spaces.
    fn validate(&self, spec: &PolicySpec) -> Result<()> {
        spec.validate()
    }

    /// Build a fresh policy for the given spaces
    fn build(
        &self,
        spec: &PolicySpec,
        observation_space: &SpaceInfo,
        action_space: &SpaceInfo,
    ) -> Result<Box<dyn Policy>>;

    /// Load a policy artifact written by [`Policy::save`]
    fn load(&self, path: &Path) -> Result<Box<dyn Policy>>;
}

/// Draw an index from a categorical distribution
pub fn sample_index<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> usize {
    let mut threshold: f32 = rng.gen();
    for (index, &p) in probs.iter().enumerate() {
        if threshold < p {
            return index;
        }
        threshold -= p;
    }
    probs.len().saturating_sub(1)
}

/// Index of the largest value (first one on ties)
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best, best_v)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("flat-vector".parse::<PolicyKind>().unwrap(), PolicyKind::Flat);
        assert_eq!("MlpPolicy".parse::<PolicyKind>().unwrap(), PolicyKind::Flat);
        assert_eq!("CnnPolicy".parse::<PolicyKind>().unwrap(), PolicyKind::ImageGrid);
        assert!("LstmPolicy".parse::<PolicyKind>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_space_compatibility() {
        let discrete = SpaceInfo { shape: vec![], space_type: SpaceType::Discrete(2) };
        let flat = SpaceInfo { shape: vec![4], space_type: SpaceType::Box };
        let image = SpaceInfo { shape: vec![8, 8, 2], space_type: SpaceType::Box };
        let continuous = SpaceInfo { shape: vec![1], space_type: SpaceType::Box };

        assert!(PolicyKind::Flat.check_spaces(&flat, &discrete).is_ok());
        assert!(PolicyKind::ImageGrid.check_spaces(&image, &discrete).is_ok());
        assert!(PolicyKind::Flat.check_spaces(&image, &discrete).unwrap_err().is_configuration());
        assert!(PolicyKind::ImageGrid.check_spaces(&flat, &discrete).is_err());
        assert!(PolicyKind::Flat.check_spaces(&flat, &continuous).is_err());
    }

    #[test]
    fn test_policy_spec_rejects_bad_learning_rate() {
        for lr in [0.0, -1e-3, f64::NAN] {
            let err = PolicySpec::new(PolicyKind::Flat, lr, PolicyConfig::default()).unwrap_err();
            assert!(err.is_configuration(), "lr {lr} should be rejected");
        }
    }

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
    }

    struct Fixed(Vec<f32>, SpaceInfo);

    impl Policy for Fixed {
        fn kind(&self) -> PolicyKind {
            PolicyKind::Flat
        }
        fn observation_space(&self) -> &SpaceInfo {
            &self.1
        }
        fn action_space(&self) -> &SpaceInfo {
            &self.1
        }
        fn action_probs(&self, _observation: &[f32]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
        fn learn(&mut self, _env: &mut EnvHandle, _total_steps: usize) -> Result<TrainingSummary> {
            Ok(TrainingSummary::default())
        }
        fn save(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
        fn steps_trained(&self) -> u64 {
            0
        }
    }

    #[test]
    fn test_sample_follows_distribution() {
        let space = SpaceInfo { shape: vec![1], space_type: SpaceType::Box };
        let policy = Fixed(vec![0.0, 1.0, 0.0], space);
        let mut rng = StdRng::seed_from_u64(0);

        for _ in 0..20 {
            assert_eq!(policy.sample(&[0.0], &mut rng).unwrap(), 1);
        }
        assert_eq!(policy.predict(&[0.0]).unwrap(), 1);
    }
}
