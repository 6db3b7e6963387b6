//! Toy balance task (CartPole-v1 dynamics)
//!
//! A pole is balanced on a cart by pushing the cart left or right.
//!
//! # Physics
//!
//! - State: [x, x_dot, theta, theta_dot] (cart position, cart velocity, pole
//!   angle, pole angular velocity)
//! - Actions: 0 (push left) or 1 (push right)
//! - Reward: +1 for every step taken
//! - Termination: pole angle > 12° or cart position > 2.4
//! - Truncation: 500 steps
//!
//! # Reference
//!
//! Based on Gym CartPole-v1:
//! <https://github.com/openai/gym/blob/master/gym/envs/classic_control/cartpole.py>

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
pub const TASK_ID: &str = "toy-balance-task";

const DEFAULT_FRAME_WIDTH: u32 = 600;
const DEFAULT_FRAME_HEIGHT: u32 = 400;
const POLE_COLOR: RGBColor = RGBColor(202, 152, 101);
const AXLE_COLOR: RGBColor = RGBColor(129, 132, 203);

/// CartPole environment
///
/// A pole is attached to a cart moving along a frictionless track.
/// The goal is to balance the pole by applying forces to the cart.
#[derive(Debug)]
pub struct CartPole {
    // State variables
    x: f32,         // Cart position
    x_dot: f32,     // Cart velocity
    theta: f32,     // Pole angle (radians)
    theta_dot: f32, // Pole angular velocity

    // Episode tracking
    steps: usize,
    max_steps: usize,

    // Physics constants (matching Gym CartPole-v1)
    gravity: f32,
    mass_pole: f32,
    total_mass: f32,
    length: f32,           // Half-length of pole
    pole_mass_length: f32, // pole_mass * length
    force_mag: f32,
    tau: f32, // Time step

    // Thresholds
    theta_threshold: f32,
    x_threshold: f32,

    rng: StdRng,
    frame_width: u32,
    frame_height: u32,
}

impl CartPole {
    /// Create a new CartPole environment with default parameters
    ///
    /// Physics constants match Gym CartPole-v1:
    /// - gravity = 9.8 m/s²
    /// - cart mass = 1.0 kg
    /// - pole mass = 0.1 kg
    /// - pole half-length = 0.5 m
    /// - force magnitude = 10.0 N
    /// - timestep = 0.02 s
    pub fn new() -> Self {
        let gravity = 9.8;
        let mass_cart = 1.0;
        let mass_pole = 0.1;
        let total_mass = mass_cart + mass_pole;
        let length = 0.5;
        let pole_mass_length = mass_pole * length;
        let theta_threshold = 12.0 * 2.0 * std::f32::consts::PI / 360.0; // ~0.2094 radians

        Self {
            x: 0.0,
            x_dot: 0.0,
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            max_steps: 500,
            gravity,
            mass_pole,
            total_mass,
            length,
            pole_mass_length,
            force_mag: 10.0,
            tau: 0.02,
            theta_threshold,
            x_threshold: 2.4,
            rng: StdRng::from_entropy(),
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
        }
    }

    /// Change the size of rendered frames
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width.max(1);
        self.frame_height = height.max(1);
        self
    }

    /// Reset state to random initial conditions
    ///
    /// All state variables are drawn uniformly from [-0.05, 0.05].
    fn reset_state(&mut self) {
        self.x = self.rng.gen_range(-0.05..0.05);
        self.x_dot = self.rng.gen_range(-0.05..0.05);
        self.theta = self.rng.gen_range(-0.05..0.05);
        self.theta_dot = self.rng.gen_range(-0.05..0.05);
    }

    /// Perform one physics simulation step using Euler integration
    ///
    /// ```text
    /// temp = (force + pole_mass_length * theta_dot² * sin(theta)) / total_mass
    /// theta_acc = (g * sin(theta) - cos(theta) * temp) /
    ///             (length * (4/3 - mass_pole * cos²(theta) / total_mass))
    /// x_acc = temp - pole_mass_length * theta_acc * cos(theta) / total_mass
    /// ```
    fn physics_step(&mut self, action: i64) {
        let force = if action == 1 { self.force_mag } else { -self.force_mag };

        let cos_theta = self.theta.cos();
        let sin_theta = self.theta.sin();

        let temp = (force + self.pole_mass_length * self.theta_dot * self.theta_dot * sin_theta)
            / self.total_mass;
        let theta_acc = (self.gravity * sin_theta - cos_theta * temp)
            / (self.length
                * (4.0 / 3.0 - self.mass_pole * cos_theta * cos_theta / self.total_mass));
        let x_acc = temp - self.pole_mass_length * theta_acc * cos_theta / self.total_mass;

        self.x_dot += self.tau * x_acc;
        self.x += self.tau * self.x_dot;
        self.theta_dot += self.tau * theta_acc;
        self.theta += self.tau * self.theta_dot;
    }

    fn is_terminated(&self) -> bool {
        self.x < -self.x_threshold
            || self.x > self.x_threshold
            || self.theta < -self.theta_threshold
            || self.theta > self.theta_threshold
    }

    fn is_truncated(&self) -> bool {
        self.steps >= self.max_steps
    }

    fn observation(&self) -> Vec<f32> {
        vec![self.x, self.x_dot, self.theta, self.theta_dot]
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for CartPole {
    fn reset(&mut self, seed: Option<u64>) -> Result<Vec<f32>> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.reset_state();
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        if !(0..2).contains(&action) {
            return Err(Error::config(
                Stage::Simulate,
                format!("{TASK_ID} accepts actions 0 or 1, got {action}"),
            ));
        }

        self.physics_step(action);
        self.steps += 1;

        Ok(StepResult {
            observation: self.observation(),
            reward: 1.0,
            terminated: self.is_terminated(),
            truncated: self.is_truncated(),
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![4], space_type: SpaceType::Box }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], space_type: SpaceType::Discrete(2) }
    }

    /// Side view: track, cart and pole, scaled so the track spans the
    /// termination range
    fn draw(&self) -> Result<Option<RgbImage>> {
        let buffer = self.draw_to_buffer().map_err(|e| Error::draw(Stage::Simulate, e))?;
        let frame = RgbImage::from_raw(self.frame_width, self.frame_height, buffer)
            .ok_or_else(|| Error::draw(Stage::Simulate, "frame buffer has the wrong length"))?;
        Ok(Some(frame))
    }
}

impl CartPole {
    fn draw_to_buffer(&self) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
        let (width, height) = (self.frame_width, self.frame_height);
        let mut buffer = vec![0; RGBPixel::PIXEL_SIZE * (width * height) as usize];
        {
            let area = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            area.fill(&WHITE)?;

            let scale = width as f32 / (self.x_threshold * 2.0);
            let track_y = (height as f32 * 0.75) as i32;
            let cart_w = (width as f32 / 12.0).max(2.0);
            let cart_h = (cart_w * 0.6).max(2.0) as i32;
            let cart_x = self.x * scale + width as f32 / 2.0;
            let pole_len = scale * 2.0 * self.length;
            let pole_w = (cart_w / 10.0).max(1.0) as u32;

            area.draw(&PathElement::new(vec![(0, track_y), (width as i32 - 1, track_y)], &BLACK))?;
            area.draw(&Rectangle::new(
                [
                    ((cart_x - cart_w / 2.0) as i32, track_y - cart_h),
                    ((cart_x + cart_w / 2.0) as i32, track_y),
                ],
                BLACK.filled(),
            ))?;

            // Pole hinges on the top of the cart and leans by theta from vertical
            let hinge = (cart_x as i32, track_y - cart_h);
            let tip = (
                (cart_x + pole_len * self.theta.sin()) as i32,
                ((track_y - cart_h) as f32 - pole_len * self.theta.cos()) as i32,
            );
            area.draw(&PathElement::new(vec![hinge, tip], POLE_COLOR.stroke_width(pole_w)))?;
            area.draw(&Circle::new(hinge, pole_w.max(2) as i32, AXLE_COLOR.filled()))?;
            area.present()?;
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_cartpole_init() {
        let env = CartPole::new();
        assert_eq!(env.max_steps, 500);
        assert_eq!(env.gravity, 9.8);
        assert_eq!(env.mass_pole, 0.1);
    }

    #[test]
    fn test_cartpole_reset() {
        let mut env = CartPole::new();
        let obs = env.reset(None).unwrap();

        assert_eq!(obs.len(), 4);
        assert_eq!(env.steps, 0);
        for &val in &obs {
            assert!(val.abs() < 0.1, "Initial state should be small perturbation, got {}", val);
        }
    }

    #[test]
    fn test_seeded_reset_is_reproducible() {
        let mut a = CartPole::new();
        let mut b = CartPole::new();
        assert_eq!(a.reset(Some(7)).unwrap(), b.reset(Some(7)).unwrap());
        assert_eq!(a.step(1).unwrap(), b.step(1).unwrap());
    }

    #[test]
    fn test_cartpole_termination() {
        let mut env = CartPole::new();
        env.reset(None).unwrap();

        env.x = 3.0;
        let result = env.step(0).unwrap();
        assert!(result.terminated, "cart beyond 2.4 must terminate");

        env.reset(None).unwrap();
        env.theta = 0.5;
        let result = env.step(0).unwrap();
        assert!(result.terminated, "pole beyond 12 degrees must terminate");
    }

    #[test]
    fn test_cartpole_truncation() {
        let mut env = CartPole::new();
        env.reset(None).unwrap();
        env.steps = env.max_steps - 1;

        let result = env.step(0).unwrap();
        assert!(result.truncated);
        assert!(result.done());
    }

    #[test]
    fn test_invalid_action_rejected() {
        let mut env = CartPole::new();
        env.reset(None).unwrap();
        assert!(env.step(2).unwrap_err().is_configuration());
    }

    #[test]
    fn test_spaces() {
        let env = CartPole::new();
        assert_eq!(env.observation_space().shape, vec![4]);
        assert!(matches!(env.observation_space().space_type, SpaceType::Box));
        assert_eq!(env.action_space().shape, Vec::<usize>::new());
        assert!(matches!(env.action_space().space_type, SpaceType::Discrete(2)));
    }

    #[test]
    fn test_draw_has_configured_size_and_content() {
        let mut env = CartPole::new().with_frame_size(120, 80);
        env.reset(Some(1)).unwrap();

        let frame = env.draw().unwrap().expect("cartpole has a visual form");
        assert_eq!(frame.dimensions(), (120, 80));
        assert!(frame.pixels().any(|p| *p == Rgb([0, 0, 0])), "cart is drawn");
        assert!(frame.pixels().any(|p| *p == Rgb([202, 152, 101])), "pole is drawn");
    }

    #[test]
    fn test_cartpole_episode_ends() {
        let mut env = CartPole::new();
        env.reset(None).unwrap();

        let mut steps = 0;
        for _ in 0..1000 {
            let result = env.step(steps % 2).unwrap();
            steps += 1;
            if result.done() {
                break;
            }
        }

        assert!(steps <= 500, "Episode should not exceed max_steps");
    }
}
