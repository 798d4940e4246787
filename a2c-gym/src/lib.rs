pub mod atari_env;
pub mod frames;
pub mod gym_env;

pub use atari_env::AtariEnv;
pub use frames::{FramePreprocessor, RgbFrame};
pub use gym_env::{GymEnv, GymEnvBuilder};

use anyhow::Result;

pub struct PixelStep {
    pub frame: RgbFrame,
    pub reward: f32,
    pub terminated: bool,
    pub trancuated: bool,
}

/// An environment rendering raw RGB frames with a discrete action set.
pub trait PixelEnv {
    fn reset(&mut self, seed: u64) -> Result<RgbFrame>;
    fn step(&mut self, action: usize) -> Result<PixelStep>;
    fn n_actions(&self) -> usize;

    fn render(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait EnvBuilderTrait {
    type Env: PixelEnv;

    fn build_env(&self) -> Result<Self::Env>;
}
