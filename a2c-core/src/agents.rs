use crate::{policies::Actor, rollout_buffer::EpisodeBuffer};
use anyhow::Result;

/// Losses reported by a single learning step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearnStats {
    pub policy_loss: f32,
    pub value_loss: f32,
}

pub trait Agent {
    type Actor: Actor;

    /// Retrieves the actor used to collect episodes
    fn actor(&mut self) -> &mut Self::Actor;

    /// Learns from a finished episode. The buffer is emptied afterwards.
    fn learn(&mut self, episode: &mut EpisodeBuffer) -> Result<LearnStats>;
}
