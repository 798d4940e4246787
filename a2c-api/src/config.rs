use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to set up a training run. Missing keys in a config file take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub env_name: String,
    /// Emulator frames per agent step, stacked along the channel axis
    pub n_frames: usize,
    pub frame_width: usize,
    pub frame_height: usize,
    pub gamma: f32,
    pub learning_rate: f64,
    pub max_grad_norm: Option<f32>,
    pub log_interval: usize,
    pub n_episodes: usize,
    /// Stops on the step budget instead of the episode count when set
    pub total_steps: Option<usize>,
    pub max_episode_steps: usize,
    pub render: bool,
    pub seed: u64,
    pub sample_size: Option<usize>,
    /// cpu, cuda or auto
    pub device: String,
    pub checkpoint: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            env_name: "Atlantis-v0".to_owned(),
            n_frames: 1,
            frame_width: 82,
            frame_height: 82,
            gamma: 0.99,
            learning_rate: 3e-2,
            max_grad_norm: None,
            log_interval: 10,
            n_episodes: 100,
            total_steps: None,
            max_episode_steps: 10_000,
            render: false,
            seed: 0,
            sample_size: None,
            device: "auto".to_owned(),
            checkpoint: None,
        }
    }
}

impl TrainConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("parsing training config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_frames > 0, "n_frames must be at least 1");
        ensure!(
            self.frame_width > 0 && self.frame_height > 0,
            "frame size must be positive"
        );
        ensure!(
            (0.0..=1.0).contains(&self.gamma),
            "gamma must be in [0, 1], got {}",
            self.gamma
        );
        ensure!(self.learning_rate > 0., "learning_rate must be positive");
        ensure!(self.log_interval > 0, "log_interval must be positive");
        ensure!(self.max_episode_steps > 0, "max_episode_steps must be positive");
        if let Some(max_grad_norm) = self.max_grad_norm {
            ensure!(max_grad_norm > 0., "max_grad_norm must be positive");
        }
        if let Some(sample_size) = self.sample_size {
            ensure!(sample_size > 0, "sample_size must be positive");
        }
        ensure!(
            matches!(self.device.as_str(), "cpu" | "cuda" | "auto"),
            "device must be cpu, cuda or auto, got {}",
            self.device
        );
        Ok(())
    }
}
