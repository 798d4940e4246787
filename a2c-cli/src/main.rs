use a2c_api::{builders::a2c::A2CAlgoBuilder, config::TrainConfig};
use a2c_core::Algorithm;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "a2c-train", about = "Train an actor-critic agent on an Atari game")]
struct Cli {
    #[arg(long, help = "TOML file with the training configuration")]
    config: Option<PathBuf>,

    #[arg(long, help = "Gymnasium environment id")]
    env: Option<String>,

    #[arg(long, help = "Number of episodes to train for")]
    episodes: Option<usize>,

    #[arg(long, help = "Emulator frames per agent step")]
    n_frames: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    gamma: Option<f32>,

    #[arg(long, help = "Show the game window while training")]
    render: bool,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, help = "cpu, cuda or auto")]
    device: Option<String>,

    #[arg(long, help = "Path to load/save the model checkpoint")]
    checkpoint: Option<PathBuf>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count, help = "Increase verbosity level (default INFO, -v = DEBUG, -vv = TRACE)")]
    verbose: u8,
}

impl Cli {
    fn train_config(&self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_toml_file(path)?,
            None => TrainConfig::default(),
        };
        if let Some(env) = &self.env {
            config.env_name = env.clone();
        }
        if let Some(episodes) = self.episodes {
            config.n_episodes = episodes;
        }
        if let Some(n_frames) = self.n_frames {
            config.n_frames = n_frames;
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(gamma) = self.gamma {
            config.gamma = gamma;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint = Some(checkpoint.clone());
        }
        config.render |= self.render;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .init();

    let config = cli.train_config()?;
    info!(
        env = %config.env_name,
        episodes = config.n_episodes,
        n_frames = config.n_frames,
        "starting training"
    );
    let mut a2c = A2CAlgoBuilder::new(config).build_gym()?;
    a2c.train()?;
    info!(
        "done, {} episodes, average length {:.2}",
        a2c.episodes_played(),
        a2c.running_length()
    );
    Ok(())
}
