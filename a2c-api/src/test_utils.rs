use a2c_gym::{EnvBuilderTrait, PixelEnv, PixelStep, RgbFrame};
use anyhow::{Result, ensure};

/// A tiny pixel game. Every frame is a solid colour and the colour names the rewarded action:
/// red pays for action 0, blue for action 1. The colour sequence only depends on the reset seed.
pub struct ScriptedEnv {
    height: usize,
    width: usize,
    episode_len: usize,
    step: usize,
    seed: u64,
    steps_taken: usize,
}

impl ScriptedEnv {
    pub fn new(height: usize, width: usize, episode_len: usize) -> Self {
        Self {
            height,
            width,
            episode_len,
            step: 0,
            seed: 0,
            steps_taken: 0,
        }
    }

    /// Emulator steps over the lifetime of the env, warm-up frames included.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn target_action(&self) -> usize {
        ((self.seed as usize).wrapping_add(self.step) / 2) % 2
    }

    fn frame(&self) -> RgbFrame {
        let colour: [u8; 3] = if self.target_action() == 0 {
            [255, 0, 0]
        } else {
            [0, 0, 255]
        };
        RgbFrame {
            pixels: colour.repeat(self.height * self.width),
            height: self.height,
            width: self.width,
        }
    }
}

impl PixelEnv for ScriptedEnv {
    fn reset(&mut self, seed: u64) -> Result<RgbFrame> {
        self.seed = seed;
        self.step = 0;
        Ok(self.frame())
    }

    fn step(&mut self, action: usize) -> Result<PixelStep> {
        ensure!(self.step < self.episode_len, "episode already finished");
        let reward = if action == self.target_action() { 1. } else { 0. };
        self.step += 1;
        self.steps_taken += 1;
        Ok(PixelStep {
            frame: self.frame(),
            reward,
            terminated: self.step == self.episode_len,
            trancuated: false,
        })
    }

    fn n_actions(&self) -> usize {
        2
    }
}

pub struct ScriptedEnvBuilder {
    pub height: usize,
    pub width: usize,
    pub episode_len: usize,
}

impl Default for ScriptedEnvBuilder {
    fn default() -> Self {
        Self {
            height: 32,
            width: 32,
            episode_len: 8,
        }
    }
}

impl EnvBuilderTrait for ScriptedEnvBuilder {
    type Env = ScriptedEnv;

    fn build_env(&self) -> Result<Self::Env> {
        Ok(ScriptedEnv::new(self.height, self.width, self.episode_len))
    }
}
