//! Environment traits and implementations
//!
//! This module defines the simulation capability the agent drives
//! ([`Environment`]), the vectorized [`pool::EnvPool`], the owning
//! [`handle::EnvHandle`] and the [`registry::EnvRegistry`] that resolves
//! environment identifiers to factories.

use image::RgbImage;

use crate::error::Result;

/// Core trait for RL environments
///
/// Observations are flat `f32` vectors laid out according to
/// [`Environment::observation_space`]; actions are discrete indices.
pub trait Environment: Send {
    /// Reset the environment and return the initial observation
    ///
    /// A `seed` re-seeds the environment's random source first, making the
    /// following episode reproducible.
    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<f32>>;

    /// Step the environment with an action
    fn step(&mut self, action: i64) -> Result<StepResult>;

    /// Get the observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the action space dimensions
    fn action_space(&self) -> SpaceInfo;

    /// Rasterize the current state
    ///
    /// `Ok(None)` means the environment has no visual form.
    fn draw(&self) -> Result<Option<RgbImage>> {
        Ok(None)
    }

    /// Release any resources held by the environment
    fn close(&mut self) {}
}

/// Result of an environment step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Next observation
    pub observation: Vec<f32>,

    /// Reward received
    pub reward: f32,

    /// Whether the episode terminated
    pub terminated: bool,

    /// Whether the episode was truncated
    pub truncated: bool,
}

impl StepResult {
    /// Episode is over, for either reason
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub space_type: SpaceType,
}

impl SpaceInfo {
    /// Number of scalar elements in one sample of this space
    pub fn flat_size(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Box,
}

/// How an environment handle presents its visual output
///
/// The three modes are mutually exclusive and fixed when the handle is
/// created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// No visual output
    #[default]
    None,
    /// Draw each step to the console
    Human,
    /// Return the raw pixel buffer of each step to the caller
    RgbArray,
}

pub mod cartpole;
pub mod display;
pub mod grid_walk;
pub mod handle;
pub mod pool;
pub mod registry;

pub use handle::EnvHandle;
pub use registry::EnvRegistry;
