//! # gymrig
//!
//! Agent lifecycle orchestration and frame capture for toy RL tasks
//!
//! gymrig wires a simulation, a trainable policy and a video writer
//! together: an [`agent::Agent`] creates an environment and a policy on
//! demand, trains, evaluates, persists and restores, and a
//! [`capture::FrameBuffer`] turns the frames of a rendered evaluation into
//! an animated GIF.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gymrig::prelude::*;
//!
//! # fn main() -> gymrig::Result<()> {
//! let mut agent = Agent::builder().env_id("grid-walk-task").seed(1).build()?;
//! agent.create_environment(1, RenderMode::RgbArray)?;
//! agent.create_policy(PolicyKind::ImageGrid, 1e-3, PolicyConfig::default())?;
//! agent.train(5_000)?;
//!
//! let mut frames = FrameBuffer::new();
//! agent.evaluate_rendered(1, |frame| frames.append(frame))?;
//! frames.flush("walk.gif", 30)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Agent lifecycle controller
pub mod agent;

/// Frame buffering and video encoding
pub mod capture;

/// Environment traits and implementations
pub mod env;

/// Error taxonomy
pub mod error;

/// Policy capability, configuration and the built-in backend
pub mod policy;

/// Host setup checks
pub mod setup;

/// Tracing subscriber setup
pub mod telemetry;

/// Training algorithms
pub mod train;

pub use error::{Error, Result};

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        agent::{Agent, AgentConfig, AgentState},
        capture::FrameBuffer,
        env::{EnvRegistry, Environment, RenderMode},
        error::{Error, Result},
        policy::{Policy, PolicyConfig, PolicyKind},
        train::TrainingSummary,
    };
}

/// Current version of gymrig
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
