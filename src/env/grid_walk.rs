//! Grid walk task
//!
//! A fixed-horizon navigation task with image observations, used to exercise
//! the image-grid policy and the capture pipeline:
//! - State: agent and goal cells on a square grid
//! - Observation: `[size, size, 2]` planes (agent plane, goal plane), row-major
//! - Actions: 0 up, 1 down, 2 left, 3 right (moves into walls are ignored)
//! - Reward: +1.0 when the agent reaches the goal (the goal then moves),
//!   -0.01 otherwise
//! - Episodes: never terminate early; always truncated after `horizon` steps

use image::RgbImage;
use plotters::{
    backend::{PixelFormat, RGBPixel},
    prelude::*,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    env::{Environment, SpaceInfo, SpaceType, StepResult},
    error::{Error, Result, Stage},
};

/// Registry identifier of this task
pub const TASK_ID: &str = "grid-walk-task";

/// Default episode length
pub const DEFAULT_HORIZON: usize = 50;

const DEFAULT_SIZE: usize = 8;
const CELL_PIXELS: u32 = 16;
const AGENT_COLOR: RGBColor = RGBColor(40, 90, 220);
const GOAL_COLOR: RGBColor = RGBColor(230, 180, 30);
const GRID_LINE: RGBColor = RGBColor(60, 60, 60);
const FLOOR: RGBColor = RGBColor(20, 20, 20);

/// Fixed-horizon grid navigation environment
#[derive(Debug)]
pub struct GridWalk {
    size: usize,
    agent: (usize, usize),
    goal: (usize, usize),
    steps: usize,
    horizon: usize,
    rng: StdRng,
}

impl GridWalk {
    /// Create an 8x8 grid with a 50-step horizon
    pub fn new() -> Self {
        Self::with_params(DEFAULT_SIZE, DEFAULT_HORIZON)
    }

    /// Create a grid of `size` x `size` cells whose episodes last `horizon`
    /// steps
    pub fn with_params(size: usize, horizon: usize) -> Self {
        let size = size.max(2);
        Self {
            size,
            agent: (0, 0),
            goal: (size - 1, size - 1),
            steps: 0,
            horizon: horizon.max(1),
            rng: StdRng::from_entropy(),
        }
    }

    fn random_cell(&mut self) -> (usize, usize) {
        (self.rng.gen_range(0..self.size), self.rng.gen_range(0..self.size))
    }

    fn place_goal(&mut self) {
        loop {
            let cell = self.random_cell();
            if cell != self.agent {
                self.goal = cell;
                return;
            }
        }
    }

    fn observation(&self) -> Vec<f32> {
        let mut obs = vec![0.0; self.size * self.size * 2];
        let (ar, ac) = self.agent;
        let (gr, gc) = self.goal;
        obs[(ar * self.size + ac) * 2] = 1.0;
        obs[(gr * self.size + gc) * 2 + 1] = 1.0;
        obs
    }
}

impl Default for GridWalk {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for GridWalk {
    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<f32>> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.steps = 0;
        self.agent = self.random_cell();
        self.place_goal();
        Ok(self.observation())
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        let (row, col) = self.agent;
        let last = self.size - 1;
        self.agent = match action {
            0 => (row.saturating_sub(1), col),
            1 => ((row + 1).min(last), col),
            2 => (row, col.saturating_sub(1)),
            3 => (row, (col + 1).min(last)),
            _ => {
                return Err(Error::config(
                    Stage::Simulate,
                    format!("{TASK_ID} accepts actions 0..4, got {action}"),
                ))
            }
        };
        self.steps += 1;

        let reward = if self.agent == self.goal {
            self.place_goal();
            1.0
        } else {
            -0.01
        };

        Ok(StepResult {
            observation: self.observation(),
            reward,
            terminated: false,
            truncated: self.steps >= self.horizon,
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![self.size, self.size, 2], space_type: SpaceType::Box }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], space_type: SpaceType::Discrete(4) }
    }

    fn draw(&self) -> Result<Option<RgbImage>> {
        let side = self.size as u32 * CELL_PIXELS;
        let buffer = self.draw_to_buffer(side).map_err(|e| Error::draw(Stage::Simulate, e))?;
        let frame = RgbImage::from_raw(side, side, buffer)
            .ok_or_else(|| Error::draw(Stage::Simulate, "frame buffer has the wrong length"))?;
        Ok(Some(frame))
    }
}

impl GridWalk {
    /// One square per cell on a grid-line background
    fn draw_to_buffer(&self, side: u32) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut buffer = vec![0; RGBPixel::PIXEL_SIZE * (side * side) as usize];
        {
            let area = BitMapBackend::with_buffer(&mut buffer, (side, side)).into_drawing_area();
            area.fill(&GRID_LINE)?;

            let cell = CELL_PIXELS as i32;
            for row in 0..self.size {
                for col in 0..self.size {
                    let (color, inset) = if (row, col) == self.agent {
                        (AGENT_COLOR, 0)
                    } else if (row, col) == self.goal {
                        (GOAL_COLOR, 0)
                    } else {
                        (FLOOR, 1)
                    };
                    let (x, y) = (col as i32 * cell, row as i32 * cell);
                    area.draw(&Rectangle::new(
                        [(x + inset, y + inset), (x + cell - 1, y + cell - 1)],
                        color.filled(),
                    ))?;
                }
            }
            area.present()?;
        }
        Ok(buffer)
    }
}
