use crate::HookResult;
use a2c_core::rollout_buffer::EpisodeBuffer;
use anyhow::Result;

pub trait A2CHooks {
    /// Called with the normalized returns right before the losses are built. Returning
    /// `HookResult::Break` drops the episode without a gradient step.
    fn before_learning_hook(
        &mut self,
        episode: &mut EpisodeBuffer,
        returns: &mut Vec<f32>,
    ) -> Result<HookResult>;
}

pub struct DefaultA2CHooks;

impl A2CHooks for DefaultA2CHooks {
    fn before_learning_hook(
        &mut self,
        _episode: &mut EpisodeBuffer,
        _returns: &mut Vec<f32>,
    ) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }
}

impl<F> A2CHooks for F
where
    F: FnMut(&mut EpisodeBuffer, &mut Vec<f32>) -> Result<HookResult>,
{
    fn before_learning_hook(
        &mut self,
        episode: &mut EpisodeBuffer,
        returns: &mut Vec<f32>,
    ) -> Result<HookResult> {
        self(episode, returns)
    }
}
