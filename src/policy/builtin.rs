//! Built-in policy backend
//!
//! [`NetworkPolicy`] is a feature extractor plus a [`PolicyNet`] on tch,
//! trained by [`Reinforce`]. The whole policy (spaces, hyperparameters,
//! exported weights and step count) serializes to a single JSON artifact.

use std::{fs, path::Path};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    env::{EnvHandle, SpaceInfo, SpaceType},
    error::{Error, Result, Stage},
    policy::{
        features::FeatureExtractor,
        network::{Activation, NetworkWeights, PolicyNet},
        Policy, PolicyBackend, PolicyKind, PolicySpec,
    },
    train::{Reinforce, TrainingSummary},
};

/// Artifact layout version written by [`NetworkPolicy::save`]
pub const FORMAT_VERSION: u32 = 1;

/// On-disk form of a [`NetworkPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolicyArtifact {
    format_version: u32,
    observation_space: SpaceInfo,
    action_space: SpaceInfo,
    spec: PolicySpec,
    features: FeatureExtractor,
    network: NetworkWeights,
    steps_trained: u64,
}

impl PolicyArtifact {
    fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.format_version
            ));
        }
        if !self.network.is_consistent() {
            return Err("layer shapes do not match their weight buffers".to_string());
        }
        if self.features.input_dim() != self.observation_space.flat_size()
            || self.features.output_dim() != self.network.input_dim()
        {
            return Err("feature extractor does not match the observation space".to_string());
        }
        match self.action_space.space_type {
            SpaceType::Discrete(n) if n == self.network.output_dim() => Ok(()),
            _ => Err("policy head does not match the action space".to_string()),
        }
    }
}

/// Feed-forward policy trained in-process
#[derive(Debug)]
pub struct NetworkPolicy {
    observation_space: SpaceInfo,
    action_space: SpaceInfo,
    spec: PolicySpec,
    features: FeatureExtractor,
    net: PolicyNet,
    steps_trained: u64,
}

impl NetworkPolicy {
    /// Fresh policy for the given spaces
    pub fn new(spec: &PolicySpec, observation_space: &SpaceInfo, action_space: &SpaceInfo) -> Result<Self> {
        spec.validate()?;
        spec.kind.check_spaces(observation_space, action_space)?;
        let activation = activation_option(spec)?;

        let SpaceType::Discrete(num_actions) = action_space.space_type else {
            return Err(Error::config(Stage::CreatePolicy, "discrete action space required"));
        };
        let features = FeatureExtractor::for_space(spec.kind, observation_space);
        let net = PolicyNet::new(
            features.output_dim(),
            spec.config.hidden_dim,
            num_actions,
            activation,
            spec.config.seed,
        );

        tracing::debug!(
            kind = %spec.kind,
            input_dim = features.output_dim(),
            hidden_dim = spec.config.hidden_dim,
            num_actions,
            ?activation,
            "Built network policy"
        );

        Ok(Self {
            observation_space: observation_space.clone(),
            action_space: action_space.clone(),
            spec: spec.clone(),
            features,
            net,
            steps_trained: 0,
        })
    }

    /// Read a policy written by [`Policy::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::io(Stage::Restore, format!("reading policy artifact {}", path.display()), e)
        })?;
        let artifact: PolicyArtifact =
            serde_json::from_str(&contents).map_err(|source| Error::Artifact {
                stage: Stage::Restore,
                path: path.to_path_buf(),
                source,
            })?;

        if let Err(reason) = artifact.check_consistency() {
            return Err(Error::Artifact {
                stage: Stage::Restore,
                path: path.to_path_buf(),
                source: serde::de::Error::custom(reason),
            });
        }

        let net = PolicyNet::from_weights(&artifact.network, Stage::Restore)?;
        Ok(Self {
            observation_space: artifact.observation_space,
            action_space: artifact.action_space,
            spec: artifact.spec,
            features: artifact.features,
            net,
            steps_trained: artifact.steps_trained,
        })
    }

    /// Hyperparameters the policy was built with
    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    /// The underlying network
    pub fn net(&self) -> &PolicyNet {
        &self.net
    }

    /// Current network weights
    pub fn weights(&self) -> Result<NetworkWeights> {
        self.net.export(Stage::Persist)
    }
}

impl Policy for NetworkPolicy {
    fn kind(&self) -> PolicyKind {
        self.spec.kind
    }

    fn observation_space(&self) -> &SpaceInfo {
        &self.observation_space
    }

    fn action_space(&self) -> &SpaceInfo {
        &self.action_space
    }

    fn action_probs(&self, observation: &[f32]) -> Result<Vec<f32>> {
        let input = self.features.extract(observation)?;
        self.net.probs_one(&input, Stage::Evaluate)
    }

    fn learn(&mut self, env: &mut EnvHandle, total_steps: usize) -> Result<TrainingSummary> {
        if env.observation_space() != self.observation_space || env.action_space() != self.action_space {
            return Err(Error::config(
                Stage::Train,
                format!(
                    "environment '{}' spaces do not match the policy (observation {:?}, action {:?})",
                    env.id(),
                    self.observation_space.shape,
                    self.action_space.space_type
                ),
            ));
        }

        // Offset by progress so successive calls do not replay the same samples
        let mut rng = match self.spec.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.steps_trained)),
            None => StdRng::from_entropy(),
        };
        let summary =
            Reinforce::new(&self.net, &self.features, &self.spec, &mut rng).run(env, total_steps)?;
        self.steps_trained += summary.total_steps as u64;
        Ok(summary)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let artifact = PolicyArtifact {
            format_version: FORMAT_VERSION,
            observation_space: self.observation_space.clone(),
            action_space: self.action_space.clone(),
            spec: self.spec.clone(),
            features: self.features.clone(),
            network: self.net.export(Stage::Persist)?,
            steps_trained: self.steps_trained,
        };
        let json = serde_json::to_string_pretty(&artifact).map_err(|source| Error::Artifact {
            stage: Stage::Persist,
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|e| {
            Error::io(Stage::Persist, format!("writing policy artifact {}", path.display()), e)
        })?;
        tracing::debug!(path = %path.display(), steps_trained = self.steps_trained, "Saved policy");
        Ok(())
    }

    fn steps_trained(&self) -> u64 {
        self.steps_trained
    }
}

/// Backend producing [`NetworkPolicy`] instances
///
/// Understands one backend option, `backend.activation` (`"tanh"` or
/// `"relu"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl PolicyBackend for BuiltinBackend {
    fn name(&self) -> &str {
        "builtin"
    }

    fn validate(&self, spec: &PolicySpec) -> Result<()> {
        spec.validate()?;
        activation_option(spec).map(|_| ())
    }

    fn build(
        &self,
        spec: &PolicySpec,
        observation_space: &SpaceInfo,
        action_space: &SpaceInfo,
    ) -> Result<Box<dyn Policy>> {
        Ok(Box::new(NetworkPolicy::new(spec, observation_space, action_space)?))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn Policy>> {
        Ok(Box::new(NetworkPolicy::load(path)?))
    }
}

fn activation_option(spec: &PolicySpec) -> Result<Activation> {
    let mut activation = Activation::default();
    for (key, value) in &spec.config.backend_options {
        match (key.as_str(), value) {
            ("activation", Value::String(name)) if name == "tanh" => activation = Activation::Tanh,
            ("activation", Value::String(name)) if name == "relu" => activation = Activation::Relu,
            ("activation", other) => {
                return Err(Error::config(
                    Stage::CreatePolicy,
                    format!("backend.activation must be \"tanh\" or \"relu\", got {other}"),
                ))
            }
            (unknown, _) => {
                return Err(Error::config(
                    Stage::CreatePolicy,
                    format!("the builtin backend does not understand option 'backend.{unknown}'"),
                ))
            }
        }
    }
    Ok(activation)
}
