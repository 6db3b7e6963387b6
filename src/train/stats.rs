//! Training statistics
//!
//! Per-update values are folded into a [`TrainingSummary`] that the agent
//! returns from `train`.

use std::fmt;

/// Outcome of one `learn` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSummary {
    /// Interaction steps collected, summed over all environment instances
    pub total_steps: usize,

    /// Number of rollout/update cycles
    pub updates: usize,

    /// Gradient steps applied
    pub gradient_steps: usize,

    /// Episodes that finished during training
    pub episodes_completed: usize,

    /// Mean undiscounted return of the finished episodes
    pub mean_episode_return: Option<f32>,

    /// Mean gradient norm before clipping
    pub mean_grad_norm: f64,
}

impl TrainingSummary {
    /// Fold one gradient step into the running mean norm
    pub fn record_gradient(&mut self, norm: f64) {
        self.gradient_steps += 1;
        self.mean_grad_norm += (norm - self.mean_grad_norm) / self.gradient_steps as f64;
    }

    /// Fold finished episode returns into the running mean
    pub fn record_episodes(&mut self, returns: &[f32]) {
        if returns.is_empty() {
            return;
        }
        let previous = self.episodes_completed as f32;
        let total = previous * self.mean_episode_return.unwrap_or(0.0) + returns.iter().sum::<f32>();
        self.episodes_completed += returns.len();
        self.mean_episode_return = Some(total / self.episodes_completed as f32);
    }
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "steps={} updates={} episodes={}",
            self.total_steps, self.updates, self.episodes_completed
        )?;
        if let Some(mean) = self.mean_episode_return {
            write!(f, " mean_return={mean:.2}")?;
        }
        write!(f, " grad_norm={:.4}", self.mean_grad_norm)
    }
}
