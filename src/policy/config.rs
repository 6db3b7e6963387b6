//! Policy optimizer configuration
//!
//! A closed set of recognized hyperparameters with validation and builder
//! methods, plus a `backend.`-prefixed escape hatch for options that only a
//! particular backend understands. Anything else is rejected, so a typo never
//! silently falls back to a default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result, Stage};

/// Prefix marking an option as a pass-through to the policy backend
pub const BACKEND_PREFIX: &str = "backend.";

/// Option names understood by [`PolicyConfig::from_options`]
pub const RECOGNIZED_OPTIONS: &[&str] =
    &["n_steps", "n_epochs", "batch_size", "gamma", "hidden_dim", "max_grad_norm", "seed"];

/// Optimizer hyperparameters
///
/// Defaults follow the usual settings for small control tasks like
/// CartPole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Interaction steps collected per environment before each update
    pub n_steps: usize,

    /// Passes over each rollout per update
    pub n_epochs: usize,

    /// Minibatch size for gradient steps
    pub batch_size: usize,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// Hidden layer width
    pub hidden_dim: usize,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Seed for weight initialization and action sampling
    pub seed: Option<u64>,

    /// Options passed through to the backend, keyed without the prefix
    pub backend_options: BTreeMap<String, Value>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            n_steps: 2048,
            n_epochs: 10,
            batch_size: 64,
            gamma: 0.99,
            hidden_dim: 64,
            max_grad_norm: 0.5,
            seed: None,
            backend_options: BTreeMap::new(),
        }
    }
}

impl PolicyConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from free-form `(name, value)` options
    ///
    /// Recognized names set the matching field (type-checked); names starting
    /// with `backend.` are kept for the backend; any other name is a
    /// configuration error. The result is validated.
    pub fn from_options<I, K>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut config = Self::default();
        for (name, value) in options {
            config.set_option(&name.into(), value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set one option by name
    pub fn set_option(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(backend_key) = name.strip_prefix(BACKEND_PREFIX) {
            if backend_key.is_empty() {
                return Err(Error::config(Stage::CreatePolicy, "empty backend option name"));
            }
            self.backend_options.insert(backend_key.to_string(), value);
            return Ok(());
        }

        match name {
            "n_steps" => self.n_steps = as_count(name, &value)?,
            "n_epochs" => self.n_epochs = as_count(name, &value)?,
            "batch_size" => self.batch_size = as_count(name, &value)?,
            "hidden_dim" => self.hidden_dim = as_count(name, &value)?,
            "gamma" => self.gamma = as_float(name, &value)?,
            "max_grad_norm" => self.max_grad_norm = as_float(name, &value)?,
            "seed" => {
                self.seed = match value {
                    Value::Null => None,
                    ref v => Some(v.as_u64().ok_or_else(|| type_error(name, "an integer", v))?),
                }
            }
            unknown => {
                return Err(Error::config(
                    Stage::CreatePolicy,
                    format!(
                        "unrecognized option '{unknown}'; recognized options are [{}], \
                         backend-specific options must be prefixed with '{BACKEND_PREFIX}'",
                        RECOGNIZED_OPTIONS.join(", ")
                    ),
                ))
            }
        }
        Ok(())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| Err(Error::config(Stage::CreatePolicy, message));
        if self.n_steps == 0 {
            return fail("n_steps must be positive");
        }
        if self.n_epochs == 0 {
            return fail("n_epochs must be positive");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return fail("gamma must be in [0, 1]");
        }
        if self.hidden_dim == 0 {
            return fail("hidden_dim must be positive");
        }
        if !(self.max_grad_norm.is_finite() && self.max_grad_norm > 0.0) {
            return fail("max_grad_norm must be positive");
        }
        Ok(())
    }

    /// Set rollout length per environment
    pub fn n_steps(mut self, steps: usize) -> Self {
        self.n_steps = steps;
        self
    }

    /// Set number of training epochs
    pub fn n_epochs(mut self, epochs: usize) -> Self {
        self.n_epochs = epochs;
        self
    }

    /// Set minibatch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set hidden layer width
    pub fn hidden_dim(mut self, dim: usize) -> Self {
        self.hidden_dim = dim;
        self
    }

    /// Set maximum gradient norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Set the seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Add a backend pass-through option (`key` without the prefix)
    pub fn backend_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.backend_options.insert(key.into(), value);
        self
    }
}

fn as_count(name: &str, value: &Value) -> Result<usize> {
    value.as_u64().map(|v| v as usize).ok_or_else(|| type_error(name, "a non-negative integer", value))
}

fn as_float(name: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_error(name, "a number", value))
}

fn type_error(name: &str, expected: &str, value: &Value) -> Error {
    Error::config(Stage::CreatePolicy, format!("option '{name}' must be {expected}, got {value}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = PolicyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_steps, 2048);
        assert_eq!(config.n_epochs, 10);
        assert_eq!(config.batch_size, 64);
    }

    #[test]
    fn test_config_validation() {
        assert!(PolicyConfig::new().n_epochs(0).validate().is_err());
        assert!(PolicyConfig::new().batch_size(0).validate().is_err());
        assert!(PolicyConfig::new().n_steps(0).validate().is_err());
        assert!(PolicyConfig::new().gamma(1.5).validate().is_err());
        assert!(PolicyConfig::new().max_grad_norm(0.0).validate().is_err());
        assert!(PolicyConfig::new().gamma(1.0).validate().is_ok());
    }

    #[test]
    fn test_from_options_sets_known_fields() {
        let config = PolicyConfig::from_options([
            ("n_steps", json!(2048)),
            ("batch_size", json!(64)),
            ("n_epochs", json!(10)),
            ("gamma", json!(0.98)),
            ("seed", json!(7)),
        ])
        .unwrap();

        assert_eq!(config.n_steps, 2048);
        assert_eq!(config.gamma, 0.98);
        assert_eq!(config.seed, Some(7));
        assert!(config.backend_options.is_empty());
    }

    #[test]
    fn test_unknown_option_fails_fast() {
        let err = PolicyConfig::from_options([("totally_unknown_option", json!(1))]).unwrap_err();
        assert!(err.is_configuration());
        let message = err.to_string();
        assert!(message.contains("totally_unknown_option"));
        assert!(message.contains("n_epochs"), "lists recognized options: {message}");
    }

    #[test]
    fn test_backend_options_pass_through() {
        let config =
            PolicyConfig::from_options([("backend.activation", json!("relu"))]).unwrap();
        assert_eq!(config.backend_options.get("activation"), Some(&json!("relu")));
    }

    #[test]
    fn test_wrong_types_rejected() {
        assert!(PolicyConfig::from_options([("n_steps", json!("many"))]).is_err());
        assert!(PolicyConfig::from_options([("n_steps", json!(-4))]).is_err());
        assert!(PolicyConfig::from_options([("gamma", json!(true))]).is_err());
        assert!(PolicyConfig::from_options([("backend.", json!(1))]).is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = PolicyConfig::new().n_steps(32).batch_size(16).n_epochs(4).hidden_dim(8);
        assert_eq!(config.n_steps, 32);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.n_epochs, 4);
        assert_eq!(config.hidden_dim, 8);
        assert_eq!(config.gamma, 0.99);
    }
}
