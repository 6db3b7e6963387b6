//! Observation preprocessing ahead of the network

use serde::{Deserialize, Serialize};

use crate::{
    env::SpaceInfo,
    error::{Error, Result, Stage},
    policy::PolicyKind,
};

/// Largest pooled grid side for image observations
pub const MAX_GRID: usize = 8;

/// Maps a raw observation to the network input vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureExtractor {
    /// Pass the vector through unchanged
    Flat {
        /// Observation length
        dim: usize,
    },
    /// Average-pool an `[height, width, channels]` image into square cells
    Grid {
        /// Image height
        height: usize,
        /// Image width
        width: usize,
        /// Channels per pixel
        channels: usize,
        /// Side of one pooling cell in pixels
        cell: usize,
    },
}

impl FeatureExtractor {
    /// Extractor matching `kind` for `observation_space`
    ///
    /// Assumes [`PolicyKind::check_spaces`] already accepted the space.
    pub fn for_space(kind: PolicyKind, observation_space: &SpaceInfo) -> Self {
        match (kind, observation_space.shape.as_slice()) {
            (PolicyKind::ImageGrid, &[height, width, channels]) => {
                let cell = height.max(width).div_ceil(MAX_GRID).max(1);
                FeatureExtractor::Grid { height, width, channels, cell }
            }
            _ => FeatureExtractor::Flat { dim: observation_space.flat_size() },
        }
    }

    /// Expected raw observation length
    pub fn input_dim(&self) -> usize {
        match *self {
            FeatureExtractor::Flat { dim } => dim,
            FeatureExtractor::Grid { height, width, channels, .. } => height * width * channels,
        }
    }

    /// Length of the produced feature vector
    pub fn output_dim(&self) -> usize {
        match *self {
            FeatureExtractor::Flat { dim } => dim,
            FeatureExtractor::Grid { height, width, channels, cell } => {
                height.div_ceil(cell) * width.div_ceil(cell) * channels
            }
        }
    }

    /// Transform one observation
    pub fn extract(&self, observation: &[f32]) -> Result<Vec<f32>> {
        if observation.len() != self.input_dim() {
            return Err(Error::config(
                Stage::Simulate,
                format!(
                    "observation has {} values, the policy expects {}",
                    observation.len(),
                    self.input_dim()
                ),
            ));
        }

        match *self {
            FeatureExtractor::Flat { .. } => Ok(observation.to_vec()),
            FeatureExtractor::Grid { height, width, channels, cell } => {
                let rows = height.div_ceil(cell);
                let cols = width.div_ceil(cell);
                let mut pooled = vec![0.0; rows * cols * channels];
                let mut counts = vec![0u32; rows * cols];

                for y in 0..height {
                    for x in 0..width {
                        let cell_index = (y / cell) * cols + x / cell;
                        counts[cell_index] += 1;
                        let pixel = (y * width + x) * channels;
                        for c in 0..channels {
                            pooled[cell_index * channels + c] += observation[pixel + c];
                        }
                    }
                }

                for (cell_index, &count) in counts.iter().enumerate() {
                    for c in 0..channels {
                        pooled[cell_index * channels + c] /= count as f32;
                    }
                }
                Ok(pooled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SpaceType;

    #[test]
    fn test_flat_passthrough() {
        let space = SpaceInfo { shape: vec![4], space_type: SpaceType::Box };
        let extractor = FeatureExtractor::for_space(PolicyKind::Flat, &space);
        assert_eq!(extractor.output_dim(), 4);
        assert_eq!(extractor.extract(&[1.0, 2.0, 3.0, 4.0]).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(extractor.extract(&[1.0]).is_err());
    }

    #[test]
    fn test_small_grid_keeps_resolution() {
        let space = SpaceInfo { shape: vec![8, 8, 2], space_type: SpaceType::Box };
        let extractor = FeatureExtractor::for_space(PolicyKind::ImageGrid, &space);
        assert_eq!(extractor.output_dim(), 128);

        let mut observation = vec![0.0; 128];
        observation[(3 * 8 + 5) * 2 + 1] = 1.0;
        assert_eq!(extractor.extract(&observation).unwrap(), observation);
    }

    #[test]
    fn test_large_image_is_pooled() {
        let space = SpaceInfo { shape: vec![16, 16, 1], space_type: SpaceType::Box };
        let extractor = FeatureExtractor::for_space(PolicyKind::ImageGrid, &space);
        assert_eq!(extractor.output_dim(), 64);

        // Light up the top-left 2x2 cell
        let mut observation = vec![0.0; 256];
        for (y, x) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            observation[y * 16 + x] = 1.0;
        }
        observation[2] = 1.0;

        let pooled = extractor.extract(&observation).unwrap();
        assert_eq!(pooled[0], 1.0);
        assert_eq!(pooled[1], 0.25);
        assert_eq!(pooled[2..].iter().sum::<f32>(), 0.0);
    }
}
