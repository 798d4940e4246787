use crate::{PixelEnv, frames::FramePreprocessor};
use a2c_core::env::{Env, EnvironmentDescription, Observation, SnapShot, Space};
use anyhow::{Result, ensure};
use rand::{Rng, SeedableRng, rngs::StdRng};

struct FrameCollection {
    reward: f32,
    terminated: bool,
    trancuated: bool,
}

/// Repeats every action for `n_frames` emulator frames and stacks the preprocessed frames along
/// the channel axis.
pub struct AtariEnv<E: PixelEnv> {
    env: E,
    preprocessor: FramePreprocessor,
    n_frames: usize,
    rng: StdRng,
}

impl<E: PixelEnv> AtariEnv<E> {
    pub fn new(env: E, preprocessor: FramePreprocessor, n_frames: usize) -> Result<Self> {
        ensure!(n_frames > 0, "at least one frame per step is needed");
        Ok(Self {
            env,
            preprocessor,
            n_frames,
            rng: StdRng::seed_from_u64(0),
        })
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    // Once the episode ends the remaining slots repeat the last frame, the emulator is not
    // stepped past the end of an episode.
    fn collect_frames(
        &mut self,
        n_frames: usize,
        action: usize,
        frames: &mut Vec<Observation>,
    ) -> Result<FrameCollection> {
        let mut collection = FrameCollection {
            reward: 0.,
            terminated: false,
            trancuated: false,
        };
        for _ in 0..n_frames {
            if collection.terminated || collection.trancuated {
                let last = frames.last().cloned();
                frames.extend(last);
                continue;
            }
            let step = self.env.step(action)?;
            collection.reward += step.reward;
            collection.terminated = step.terminated;
            collection.trancuated = step.trancuated;
            frames.push(self.preprocessor.process(&step.frame)?);
        }
        Ok(collection)
    }
}

impl<E: PixelEnv> Env for AtariEnv<E> {
    fn reset(&mut self, seed: u64) -> Result<SnapShot> {
        self.rng = StdRng::seed_from_u64(seed);
        let frame = self.env.reset(seed)?;
        let mut frames = Vec::with_capacity(self.n_frames);
        frames.push(self.preprocessor.process(&frame)?);
        let mut warmup = FrameCollection {
            reward: 0.,
            terminated: false,
            trancuated: false,
        };
        if self.n_frames > 1 {
            // the warm-up rewards are not part of the episode
            let action = self.rng.random_range(0..self.env.n_actions());
            warmup = self.collect_frames(self.n_frames - 1, action, &mut frames)?;
        }
        Ok(SnapShot {
            state: Observation::concat_channels(&frames)?,
            reward: 0.,
            terminated: warmup.terminated,
            trancuated: warmup.trancuated,
        })
    }

    fn step(&mut self, action: usize) -> Result<SnapShot> {
        ensure!(
            action < self.env.n_actions(),
            "action {action} is out of range for {} actions",
            self.env.n_actions()
        );
        let mut frames = Vec::with_capacity(self.n_frames);
        let collection = self.collect_frames(self.n_frames, action, &mut frames)?;
        Ok(SnapShot {
            state: Observation::concat_channels(&frames)?,
            reward: collection.reward,
            terminated: collection.terminated,
            trancuated: collection.trancuated,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        let [channels, height, width] = self.preprocessor.output_shape();
        EnvironmentDescription::new(
            vec![channels * self.n_frames, height, width],
            Space::Discrete(self.env.n_actions()),
        )
    }

    fn render(&mut self) -> Result<()> {
        self.env.render()
    }
}
