//! Minibatch policy-gradient training loop
//!
//! Each update collects `n_steps` transitions per environment instance with
//! the stochastic policy, turns discounted returns into normalized
//! advantages, then runs `n_epochs` passes of Adam over shuffled minibatches
//! of the loss `-mean(log π(a|s) · advantage)`, clipping the gradient norm
//! before every step.

use rand::{rngs::StdRng, Rng};
use tch::{nn, Kind, Tensor};

use crate::{
    env::EnvHandle,
    error::{Error, Result, Stage},
    policy::{features::FeatureExtractor, network::tensor_to_vec, network::PolicyNet, sample_index, PolicySpec},
    train::{
        rollout::{generate_minibatch_indices, RolloutBuffer},
        stats::TrainingSummary,
    },
};

/// Borrowed state the loop updates
pub struct Reinforce<'a> {
    net: &'a PolicyNet,
    extractor: &'a FeatureExtractor,
    spec: &'a PolicySpec,
    rng: &'a mut StdRng,
}

impl<'a> Reinforce<'a> {
    /// Bind a network, its input transform and hyperparameters
    pub fn new(
        net: &'a PolicyNet,
        extractor: &'a FeatureExtractor,
        spec: &'a PolicySpec,
        rng: &'a mut StdRng,
    ) -> Self {
        Self { net, extractor, spec, rng }
    }

    /// Train on `env` until at least `total_steps` transitions were collected
    ///
    /// The last rollout is shortened so that the overshoot stays below the
    /// number of instances.
    pub fn run(&mut self, env: &mut EnvHandle, total_steps: usize) -> Result<TrainingSummary> {
        if total_steps == 0 {
            return Err(Error::config(Stage::Train, "total_steps must be positive"));
        }

        let spec = self.spec;
        let config = &spec.config;
        let num_envs = env.num_envs();
        let num_actions = self.net.output_dim();
        let gamma = config.gamma as f32;
        let mut optimizer = self.net.optimizer(spec.learning_rate)?;

        let reset_seed: u64 = self.rng.gen();
        let mut observations = env.reset(Some(reset_seed))?;
        let mut episode_returns = vec![0.0f32; num_envs];
        let mut summary = TrainingSummary::default();

        tracing::info!(
            total_steps,
            num_envs,
            n_steps = config.n_steps,
            n_epochs = config.n_epochs,
            batch_size = config.batch_size,
            "Starting training"
        );

        while summary.total_steps < total_steps {
            let remaining = total_steps - summary.total_steps;
            let rollout_len = config.n_steps.min(remaining.div_ceil(num_envs));
            let mut buffer = RolloutBuffer::new(rollout_len, num_envs);
            let mut finished = Vec::new();

            for _ in 0..rollout_len {
                let features = observations
                    .iter()
                    .map(|observation| self.extractor.extract(observation))
                    .collect::<Result<Vec<_>>>()?;
                let xs = Tensor::from_slice(&features.concat()).view([num_envs as i64, -1]);
                let probs = tensor_to_vec(&self.net.probs(&xs), Stage::Train)?;
                let actions: Vec<i64> = probs
                    .chunks(num_actions)
                    .map(|row| sample_index(row, &mut *self.rng) as i64)
                    .collect();

                let results = env.step(&actions)?;
                for (env_id, (result, input)) in results.into_iter().zip(features).enumerate() {
                    let done = result.done();
                    buffer.push(input, actions[env_id] as usize, result.reward, done);
                    episode_returns[env_id] += result.reward;

                    observations[env_id] = if done {
                        finished.push(episode_returns[env_id]);
                        episode_returns[env_id] = 0.0;
                        env.reset_one(env_id, None)?
                    } else {
                        result.observation
                    };
                }
            }

            summary.total_steps += buffer.len();
            summary.record_episodes(&finished);
            self.update(&mut optimizer, &buffer, gamma, &mut summary);
            summary.updates += 1;

            tracing::debug!(
                update = summary.updates,
                steps = summary.total_steps,
                episodes = finished.len(),
                mean_return = ?summary.mean_episode_return,
                grad_norm = summary.mean_grad_norm,
                "Update complete"
            );
        }

        tracing::info!(%summary, "Training finished");
        Ok(summary)
    }

    fn update(
        &mut self,
        optimizer: &mut nn::Optimizer,
        buffer: &RolloutBuffer,
        gamma: f32,
        summary: &mut TrainingSummary,
    ) {
        let spec = self.spec;
        let config = &spec.config;
        let advantages = buffer.advantages(gamma);

        for _ in 0..config.n_epochs {
            for batch in generate_minibatch_indices(buffer.len(), config.batch_size, &mut *self.rng) {
                let features: Vec<f32> =
                    batch.iter().flat_map(|&index| buffer.features(index)).copied().collect();
                let actions: Vec<i64> = batch.iter().map(|&index| buffer.action(index) as i64).collect();
                let batch_advantages: Vec<f32> = batch.iter().map(|&index| advantages[index]).collect();

                let xs = Tensor::from_slice(&features).view([batch.len() as i64, -1]);
                let log_probs = self.net.log_probs(&xs, &Tensor::from_slice(&actions));
                let loss = -(log_probs * Tensor::from_slice(&batch_advantages)).mean(Kind::Float);

                optimizer.zero_grad();
                loss.backward();
                summary.record_gradient(self.net.grad_norm());
                optimizer.clip_grad_norm(config.max_grad_norm);
                optimizer.step();
            }
        }
    }
}
