//! Training algorithms
//!
//! This module implements the policy-gradient loop used by the built-in
//! backend.

pub mod reinforce;
pub mod rollout;
pub mod stats;

pub use reinforce::Reinforce;
pub use rollout::{generate_minibatch_indices, RolloutBuffer};
pub use stats::TrainingSummary;
