//! Actor network built on tch
//!
//! ```text
//! features
//!     |
//! [Dense(hidden)]   orthogonal, gain √2
//!     |
//!  Tanh | ReLU
//!     |
//! [Dense(n)]        orthogonal, gain 0.01
//!     |
//!  logits
//! ```
//!
//! The network lives in its own CPU [`nn::VarStore`]. For the policy artifact
//! its weights are exported to plain [`LayerWeights`] and copied back on load.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use tch::{
    nn::{self, Init, Module, OptimizerConfig},
    Device, Kind, Tensor,
};

use crate::error::{Error, Result, Stage};

/// Serializes seeded initialization, which goes through libtorch's global RNG
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Hidden layer activation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Hyperbolic tangent
    #[default]
    Tanh,
    /// Rectified linear unit
    Relu,
}

impl Activation {
    fn apply(self, xs: &Tensor) -> Tensor {
        match self {
            Activation::Tanh => xs.tanh(),
            Activation::Relu => xs.relu(),
        }
    }
}

/// Weights and biases for a single layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    /// Weight matrix (flattened, row-major, `[out_features, in_features]`)
    pub weights: Vec<f32>,
    /// Bias vector
    pub biases: Vec<f32>,
    /// Input dimension
    pub in_features: usize,
    /// Output dimension
    pub out_features: usize,
}

impl LayerWeights {
    /// Whether the stored buffers match the declared dimensions
    pub fn is_consistent(&self) -> bool {
        self.weights.len() == self.in_features * self.out_features
            && self.biases.len() == self.out_features
    }

    fn export(linear: &nn::Linear, stage: Stage) -> Result<Self> {
        let size = linear.ws.size();
        let (out_features, in_features) = (size[0] as usize, size[1] as usize);
        let weights = tensor_to_vec(&linear.ws, stage)?;
        let biases = match &linear.bs {
            Some(bs) => tensor_to_vec(bs, stage)?,
            None => vec![0.0; out_features],
        };
        Ok(Self { weights, biases, in_features, out_features })
    }

    fn import_into(&self, linear: &mut nn::Linear, stage: Stage) -> Result<()> {
        let shape = [self.out_features as i64, self.in_features as i64];
        tch::no_grad(|| {
            linear.ws.f_copy_(&Tensor::from_slice(&self.weights).view(shape))?;
            if let Some(bs) = linear.bs.as_mut() {
                bs.f_copy_(&Tensor::from_slice(&self.biases))?;
            }
            Ok::<(), tch::TchError>(())
        })
        .map_err(|e| Error::tensor(stage, e))
    }
}

/// Exported form of a [`PolicyNet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    /// Feature → hidden layer
    pub hidden: LayerWeights,
    /// Hidden → action logits
    pub head: LayerWeights,
    /// Hidden activation
    pub activation: Activation,
}

impl NetworkWeights {
    /// Input dimension
    pub fn input_dim(&self) -> usize {
        self.hidden.in_features
    }

    /// Number of actions
    pub fn output_dim(&self) -> usize {
        self.head.out_features
    }

    /// Whether layer shapes agree with each other
    pub fn is_consistent(&self) -> bool {
        self.hidden.is_consistent()
            && self.head.is_consistent()
            && self.hidden.out_features == self.head.in_features
    }
}

/// Two-layer categorical policy network
pub struct PolicyNet {
    vs: nn::VarStore,
    hidden: nn::Linear,
    head: nn::Linear,
    activation: Activation,
}

impl PolicyNet {
    /// Freshly initialized network
    ///
    /// The policy head starts with small weights so the initial policy is
    /// close to uniform. With a `seed` the initialization is reproducible.
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        activation: Activation,
        seed: Option<u64>,
    ) -> Self {
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(seed) = seed {
            tch::manual_seed(seed as i64);
        }

        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let mut hidden_config = nn::LinearConfig::default();
        hidden_config.ws_init = Init::Orthogonal { gain: 2.0_f64.sqrt() };
        hidden_config.bs_init = Some(Init::Const(0.0));
        let mut head_config = hidden_config;
        head_config.ws_init = Init::Orthogonal { gain: 0.01 };

        let hidden = nn::linear(&root / "hidden", input_dim as i64, hidden_dim as i64, hidden_config);
        let head = nn::linear(&root / "head", hidden_dim as i64, output_dim as i64, head_config);

        Self { vs, hidden, head, activation }
    }

    /// Rebuild a network from exported weights
    pub fn from_weights(weights: &NetworkWeights, stage: Stage) -> Result<Self> {
        let mut net = Self::new(
            weights.input_dim(),
            weights.hidden.out_features,
            weights.output_dim(),
            weights.activation,
            None,
        );
        weights.hidden.import_into(&mut net.hidden, stage)?;
        weights.head.import_into(&mut net.head, stage)?;
        Ok(net)
    }

    /// Copy the current weights out of the variable store
    pub fn export(&self, stage: Stage) -> Result<NetworkWeights> {
        Ok(NetworkWeights {
            hidden: LayerWeights::export(&self.hidden, stage)?,
            head: LayerWeights::export(&self.head, stage)?,
            activation: self.activation,
        })
    }

    /// Hidden activation
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Input dimension
    pub fn input_dim(&self) -> usize {
        self.hidden.ws.size()[1] as usize
    }

    /// Number of actions
    pub fn output_dim(&self) -> usize {
        self.head.ws.size()[0] as usize
    }

    /// Action probabilities for a `[batch, input_dim]` tensor, without
    /// tracking gradients
    pub fn probs(&self, xs: &Tensor) -> Tensor {
        tch::no_grad(|| self.forward(xs).softmax(-1, Kind::Float))
    }

    /// Action probabilities for one feature vector
    pub fn probs_one(&self, features: &[f32], stage: Stage) -> Result<Vec<f32>> {
        let xs = Tensor::from_slice(features).view([1, -1]);
        tensor_to_vec(&self.probs(&xs), stage)
    }

    /// `log π(action | features)` for a batch, with gradients
    pub fn log_probs(&self, xs: &Tensor, actions: &Tensor) -> Tensor {
        self.forward(xs)
            .log_softmax(-1, Kind::Float)
            .gather(-1, &actions.unsqueeze(-1), false)
            .squeeze_dim(-1)
    }

    /// Adam optimizer over this network's variables
    pub fn optimizer(&self, learning_rate: f64) -> Result<nn::Optimizer> {
        nn::Adam::default()
            .build(&self.vs, learning_rate)
            .map_err(|e| Error::tensor(Stage::Train, e))
    }

    /// L2 norm over all gradients from the last backward pass
    pub fn grad_norm(&self) -> f64 {
        let sum_squares: f64 = self
            .vs
            .trainable_variables()
            .iter()
            .map(|var| {
                let grad = var.grad();
                if grad.defined() {
                    f64::try_from(&grad.pow_tensor_scalar(2).sum(Kind::Float)).unwrap_or(0.0)
                } else {
                    0.0
                }
            })
            .sum();
        sum_squares.sqrt()
    }
}

impl Module for PolicyNet {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let hidden = self.activation.apply(&xs.apply(&self.hidden));
        hidden.apply(&self.head)
    }
}

impl fmt::Debug for PolicyNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyNet")
            .field("input_dim", &self.input_dim())
            .field("output_dim", &self.output_dim())
            .field("activation", &self.activation)
            .finish()
    }
}

/// Flatten a CPU tensor into a `Vec<f32>`
pub fn tensor_to_vec(tensor: &Tensor, stage: Stage) -> Result<Vec<f32>> {
    let flat = tensor.detach().to_kind(Kind::Float).contiguous().view([-1]);
    Vec::<f32>::try_from(flat).map_err(|e| Error::tensor(stage, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shapes() {
        let net = PolicyNet::new(4, 16, 2, Activation::Tanh, Some(0));
        let xs = Tensor::randn([8, 4], (Kind::Float, Device::Cpu));

        assert_eq!(net.forward(&xs).size(), vec![8, 2]);
        let actions = Tensor::from_slice(&[0i64, 1, 0, 1, 1, 0, 0, 1]);
        assert_eq!(net.log_probs(&xs, &actions).size(), vec![8]);
    }

    #[test]
    fn test_initial_policy_is_near_uniform() {
        let net = PolicyNet::new(4, 16, 2, Activation::Tanh, Some(1));
        let probs = net.probs_one(&[0.1, -0.2, 0.05, 0.0], Stage::Evaluate).unwrap();
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((probs[0] - 0.5).abs() < 0.05, "got {:?}", probs);
    }

    #[test]
    fn test_seeded_networks_match() {
        let a = PolicyNet::new(4, 8, 2, Activation::Relu, Some(7)).export(Stage::Persist).unwrap();
        let b = PolicyNet::new(4, 8, 2, Activation::Relu, Some(7)).export(Stage::Persist).unwrap();
        let c = PolicyNet::new(4, 8, 2, Activation::Relu, Some(8)).export(Stage::Persist).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_consistent());
        assert_eq!(a.activation, Activation::Relu);
    }

    #[test]
    fn test_export_import() {
        let net = PolicyNet::new(3, 8, 3, Activation::Tanh, Some(2));
        let weights = net.export(Stage::Persist).unwrap();
        let copy = PolicyNet::from_weights(&weights, Stage::Restore).unwrap();

        let features = [0.5, -1.0, 0.25];
        assert_eq!(
            copy.probs_one(&features, Stage::Evaluate).unwrap(),
            net.probs_one(&features, Stage::Evaluate).unwrap()
        );
        assert_eq!(copy.export(Stage::Persist).unwrap(), weights);
    }

    #[test]
    fn test_gradient_step_increases_chosen_action() {
        for activation in [Activation::Tanh, Activation::Relu] {
            let net = PolicyNet::new(3, 8, 3, activation, Some(3));
            let mut optimizer = net.optimizer(1e-2).unwrap();
            let features = [0.5f32, -1.0, 0.25];
            let xs = Tensor::from_slice(&features).view([1, -1]);
            let actions = Tensor::from_slice(&[2i64]);
            let before = net.probs_one(&features, Stage::Evaluate).unwrap()[2];

            for _ in 0..20 {
                let loss = -net.log_probs(&xs, &actions).mean(Kind::Float);
                optimizer.zero_grad();
                loss.backward();
                assert!(net.grad_norm() > 0.0);
                optimizer.clip_grad_norm(0.5);
                optimizer.step();
            }

            let after = net.probs_one(&features, Stage::Evaluate).unwrap()[2];
            assert!(after > before, "{activation:?}: {before} -> {after}");
        }
    }
}
