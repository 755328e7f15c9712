use anyhow::Result;
use clap::{Parser, ValueEnum};
use interoceptive_dqn::modes::{Experiment, ExperimentConfig, TrainMode};
use interoceptive_dqn::rl::{default_device, TrainingBackend};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "interoceptive_dqn")]
#[command(version, about = "Multi-modal DQN agent for an interoceptive grid world")]
struct Cli {
    /// Experiment config (JSON); defaults are used for anything it omits
    #[arg(long)]
    config: Option<PathBuf>,

    /// Train the agent or only evaluate it
    #[arg(long)]
    experiment: Option<Mode>,

    /// Number of episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Directory receiving checkpoints
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Checkpoint directory to resume from
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Seed for exploration, replay sampling and the world
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Explore, train and checkpoint
    Train,
    /// Evaluate without training
    Test,
}

impl From<Mode> for Experiment {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Train => Experiment::Train,
            Mode::Test => Experiment::Test,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut experiment = match &cli.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };

    // CLI flags override the config file
    if let Some(mode) = cli.experiment {
        experiment.training.experiment = mode.into();
    }
    if let Some(episodes) = cli.episodes {
        experiment.training.num_episodes = episodes;
    }
    if let Some(dir) = cli.checkpoint_dir {
        experiment.training.checkpoint_dir = dir;
    }
    if let Some(dir) = cli.resume {
        experiment.training.resume_from = Some(dir);
    }
    if let Some(seed) = cli.seed {
        experiment.agent.seed = seed;
        experiment.world.seed = seed;
    }

    let device = default_device();
    let mut mode = TrainMode::<TrainingBackend, _>::from_experiment(&experiment, device)?;
    mode.run()?;

    Ok(())
}
