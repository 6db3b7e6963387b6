//! The environment handle owned by an agent
//!
//! Wraps an [`EnvPool`] (one instance when `parallelism == 1`) together with
//! the render mode chosen at creation. The handle releases its instances on
//! [`EnvHandle::close`] and, failing that, on drop.

use image::RgbImage;

use crate::{
    env::{
        display::ConsoleDisplay, pool::EnvPool, registry::EnvRegistry, RenderMode, SpaceInfo,
        StepResult,
    },
    error::{Error, Result, Stage},
};

/// A live simulation: one or more instances plus their visual output
pub struct EnvHandle {
    id: String,
    pool: EnvPool,
    render_mode: RenderMode,
    display: Option<ConsoleDisplay>,
    closed: bool,
}

impl EnvHandle {
    /// Resolve `id` and build `parallelism` instances
    pub fn create(
        registry: &EnvRegistry,
        id: &str,
        parallelism: usize,
        render_mode: RenderMode,
    ) -> Result<Self> {
        if parallelism == 0 {
            return Err(Error::config(Stage::CreateEnvironment, "parallelism must be at least 1"));
        }
        let pool = registry.make_pool(id, parallelism)?;
        Self::from_pool(id, pool, render_mode)
    }

    /// Wrap an existing pool
    pub fn from_pool(id: impl Into<String>, pool: EnvPool, render_mode: RenderMode) -> Result<Self> {
        let id = id.into();
        let drawable = match pool.env(0) {
            Some(env) => env.draw()?.is_some(),
            None => false,
        };
        if render_mode != RenderMode::None && !drawable {
            return Err(Error::config(
                Stage::CreateEnvironment,
                format!("environment '{id}' has no visual output; use RenderMode::None"),
            ));
        }
        let display = (render_mode == RenderMode::Human).then(ConsoleDisplay::default);

        tracing::info!(env = %id, num_envs = pool.num_envs(), ?render_mode, "Environment created");
        Ok(Self { id, pool, render_mode, display, closed: false })
    }

    /// Identifier this handle was created from
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of lockstep instances
    pub fn num_envs(&self) -> usize {
        self.pool.num_envs()
    }

    /// Render mode fixed at creation
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Observation space of every instance
    pub fn observation_space(&self) -> SpaceInfo {
        self.pool.observation_space()
    }

    /// Action space of every instance
    pub fn action_space(&self) -> SpaceInfo {
        self.pool.action_space()
    }

    /// Reset every instance, returning batched observations
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Vec<Vec<f32>>> {
        let observations = self.pool.reset(seed)?;
        self.present()?;
        Ok(observations)
    }

    /// Step every instance with one action each
    pub fn step(&mut self, actions: &[i64]) -> Result<Vec<StepResult>> {
        let results = self.pool.step(actions)?;
        self.present()?;
        Ok(results)
    }

    /// Reset a single instance
    pub fn reset_one(&mut self, env_id: usize, seed: Option<u64>) -> Result<Vec<f32>> {
        let observation = self.pool.reset_env(env_id, seed)?;
        if env_id == 0 {
            self.present()?;
        }
        Ok(observation)
    }

    /// Step a single instance
    pub fn step_one(&mut self, env_id: usize, action: i64) -> Result<StepResult> {
        let result = self.pool.step_env(env_id, action)?;
        if env_id == 0 {
            self.present()?;
        }
        Ok(result)
    }

    /// Pixel buffer of instance 0
    ///
    /// Only [`RenderMode::RgbArray`] handles return frames; the other modes
    /// return `None`.
    pub fn render(&self) -> Result<Option<RgbImage>> {
        match (self.render_mode, self.pool.env(0)) {
            (RenderMode::RgbArray, Some(env)) => env.draw(),
            _ => Ok(None),
        }
    }

    /// Human mode draws instance 0 after every reset and step
    fn present(&mut self) -> Result<()> {
        let Some(display) = self.display.as_mut() else {
            return Ok(());
        };
        if let Some(frame) = self.pool.env(0).map(|env| env.draw()).transpose()?.flatten() {
            display.show(&frame);
        }
        Ok(())
    }

    /// Release every instance and the display
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pool.close();
        if let Some(console) = self.display.take() {
            tracing::debug!(frames_shown = console.frames_shown(), "Console display released");
        }
        self.closed = true;
        tracing::info!(env = %self.id, "Environment closed");
    }

    /// Whether [`EnvHandle::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for EnvHandle {
    fn drop(&mut self) {
        self.close();
    }
}
