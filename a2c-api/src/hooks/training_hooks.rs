use a2c_candle::checkpoint::save_checkpoint;
use a2c_core::{
    on_policy_algorithm::{
        DefaultOnPolicyAlgorithmHooks, EpisodeStats, LearningSchedule, OnPolicyAlgorithmHooks,
    },
    rollout_buffer::EpisodeBuffer,
};
use anyhow::Result;
use candle_nn::VarMap;
use std::path::PathBuf;
use tracing::info;

/// Progress logging and scheduling, a record of every episode, and an optional checkpoint
/// written when training stops.
pub struct TrainingHooks {
    default_hooks: DefaultOnPolicyAlgorithmHooks,
    history: Vec<EpisodeStats>,
    checkpoint: Option<(PathBuf, VarMap)>,
}

impl TrainingHooks {
    pub fn new(learning_schedule: LearningSchedule, log_interval: usize) -> Self {
        Self {
            default_hooks: DefaultOnPolicyAlgorithmHooks::new(learning_schedule, log_interval),
            history: vec![],
            checkpoint: None,
        }
    }

    pub fn with_checkpoint(mut self, path: PathBuf, varmap: VarMap) -> Self {
        self.checkpoint = Some((path, varmap));
        self
    }

    pub fn history(&self) -> &[EpisodeStats] {
        &self.history
    }
}

impl OnPolicyAlgorithmHooks for TrainingHooks {
    fn init_hook(&mut self) -> bool {
        self.default_hooks.init_hook()
    }

    fn post_rollout_hook(&mut self, episode: &mut EpisodeBuffer) -> bool {
        self.default_hooks.post_rollout_hook(episode)
    }

    fn post_training_hook(&mut self, stats: &EpisodeStats) -> bool {
        self.history.push(*stats);
        self.default_hooks.post_training_hook(stats)
    }

    fn shutdown_hook(&mut self) -> Result<()> {
        if let Some(last) = self.history.last() {
            info!(
                "finished after {} episodes, average length {:.2}",
                last.episode, last.running_length
            );
        }
        if let Some((path, varmap)) = &self.checkpoint {
            save_checkpoint(varmap, path)?;
        }
        self.default_hooks.shutdown_hook()
    }
}
