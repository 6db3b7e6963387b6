//! Rollout storage for on-policy updates
//!
//! Transitions are stored step-major: index `step * num_envs + env`.

use rand::{seq::SliceRandom, Rng};

/// Transitions gathered between two updates
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    num_envs: usize,
    features: Vec<Vec<f32>>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
}

impl RolloutBuffer {
    /// Empty buffer sized for `num_steps` steps of `num_envs` instances
    pub fn new(num_steps: usize, num_envs: usize) -> Self {
        let capacity = num_steps * num_envs;
        Self {
            num_envs,
            features: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
        }
    }

    /// Store one transition
    ///
    /// Calls must cycle through the instances in order for every step.
    pub fn push(&mut self, features: Vec<f32>, action: usize, reward: f32, done: bool) {
        self.features.push(features);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
    }

    /// Stored transitions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Network input of transition `index`
    pub fn features(&self, index: usize) -> &[f32] {
        &self.features[index]
    }

    /// Action of transition `index`
    pub fn action(&self, index: usize) -> usize {
        self.actions[index]
    }

    /// Discounted reward-to-go for every transition
    ///
    /// The sum restarts at episode boundaries; the tail of an unfinished
    /// episode is not bootstrapped.
    pub fn discounted_returns(&self, gamma: f32) -> Vec<f32> {
        let mut returns = vec![0.0; self.len()];
        let mut running = vec![0.0f32; self.num_envs];

        for index in (0..self.len()).rev() {
            let env = index % self.num_envs;
            if self.dones[index] {
                running[env] = 0.0;
            }
            running[env] = self.rewards[index] + gamma * running[env];
            returns[index] = running[env];
        }
        returns
    }

    /// Returns centred on their mean and scaled to unit variance
    pub fn advantages(&self, gamma: f32) -> Vec<f32> {
        let mut returns = self.discounted_returns(gamma);
        normalize(&mut returns);
        returns
    }
}

/// Normalize values in place to zero mean and unit variance
pub fn normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt().max(1e-8);
    for v in values.iter_mut() {
        *v = (*v - mean) / std;
    }
}

/// Shuffled minibatches covering `0..buffer_size`
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    buffer_size: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..buffer_size).collect();
    indices.shuffle(rng);

    indices.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn test_returns_restart_at_episode_end() {
        let mut buffer = RolloutBuffer::new(3, 1);
        buffer.push(vec![], 0, 1.0, false);
        buffer.push(vec![], 0, 1.0, true);
        buffer.push(vec![], 0, 1.0, false);

        assert_eq!(buffer.discounted_returns(0.5), vec![1.5, 1.0, 1.0]);
    }

    #[test]
    fn test_returns_are_per_environment() {
        let mut buffer = RolloutBuffer::new(2, 2);
        buffer.push(vec![], 0, 1.0, false);
        buffer.push(vec![], 0, 0.0, false);
        buffer.push(vec![], 0, 1.0, false);
        buffer.push(vec![], 0, 2.0, false);

        assert_eq!(buffer.discounted_returns(1.0), vec![2.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_normalize() {
        let mut values = vec![1.0, 2.0, 3.0];
        normalize(&mut values);
        assert!(values.iter().sum::<f32>().abs() < 1e-6);
        assert!(values[0] < 0.0 && values[2] > 0.0);

        let mut constant = vec![5.0; 4];
        normalize(&mut constant);
        assert!(constant.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_minibatches_cover_all_indices() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(10, 4, &mut rng);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 2);

        let mut all: Vec<usize> = batches.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }
}
