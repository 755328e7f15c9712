//! Training and evaluation loop for the DQN agent
//!
//! Runs episodes against any [`SensorEnvironment`], feeding windowed
//! observations to the agent, filling the replay memory, training once enough
//! experience has been collected and syncing the target network on a fixed
//! global-step period.
//!
//! # Example
//!
//! ```rust,ignore
//! use interoceptive_dqn::modes::{ExperimentConfig, TrainMode};
//! use interoceptive_dqn::rl::{default_device, TrainingBackend};
//!
//! let experiment = ExperimentConfig::default();
//! let mut train_mode = TrainMode::<TrainingBackend, _>::from_experiment(&experiment, default_device())?;
//! train_mode.run()?;
//! ```

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metrics::TrainingStats;
use crate::rl::{
    load_checkpoint, save_checkpoint, DqnAgent, DqnConfig, EnvironmentParams, ExecutionMode,
    SensorEnvironment, SensorSpec, Transition,
};
use crate::world::{HomeostasisWorld, WorldConfig};

/// Whether episodes update the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experiment {
    /// Explore, store transitions, train and checkpoint
    #[default]
    Train,
    /// Act with normalization in eval mode; nothing is stored or trained
    Test,
}

/// Configuration for the episode loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of episodes to run
    pub num_episodes: usize,

    pub experiment: Experiment,

    /// Directory receiving checkpoints
    pub checkpoint_dir: PathBuf,

    /// Save a checkpoint every N episodes
    pub checkpoint_frequency: usize,

    /// Log progress every N episodes
    pub log_frequency: usize,

    /// Checkpoint directory to start from instead of fresh networks
    pub resume_from: Option<PathBuf>,

    /// Rolling window of the episode statistics
    pub stats_window: usize,
}

impl TrainConfig {
    /// # Example
    ///
    /// ```rust
    /// use interoceptive_dqn::modes::TrainConfig;
    /// use std::path::PathBuf;
    ///
    /// let config = TrainConfig::new(500, PathBuf::from("checkpoints"));
    /// assert_eq!(config.checkpoint_frequency, 100);
    /// ```
    pub fn new(num_episodes: usize, checkpoint_dir: PathBuf) -> Self {
        Self {
            num_episodes,
            checkpoint_dir,
            ..Default::default()
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_episodes: 1000,
            experiment: Experiment::Train,
            checkpoint_dir: PathBuf::from("checkpoints"),
            checkpoint_frequency: 100,
            log_frequency: 10,
            resume_from: None,
            stats_window: 100,
        }
    }
}

/// Everything needed to run an experiment, loadable from one JSON file
///
/// ```json
/// {
///   "agent": { "batch_size": 32, "reward_shaping": true },
///   "environment": { "olfactorySensor": { "useOlfactory": true } },
///   "world": { "grid_size": 12 },
///   "training": { "num_episodes": 200 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub agent: DqnConfig,
    pub environment: EnvironmentParams,
    pub world: WorldConfig,
    pub training: TrainConfig,
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read experiment config {:?}", path))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse experiment config {:?}", path))
    }
}

/// Names of the agent settings where `given` differs from `stored`
fn changed_fields(given: &DqnConfig, stored: &DqnConfig) -> Vec<String> {
    let (Ok(serde_json::Value::Object(given)), Ok(serde_json::Value::Object(stored))) =
        (serde_json::to_value(given), serde_json::to_value(stored))
    else {
        return Vec::new();
    };

    let mut changed: Vec<String> = given
        .iter()
        .filter(|(key, value)| stored.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();
    changed.sort();
    changed
}

/// Episode loop for a DQN agent
pub struct TrainMode<B: AutodiffBackend, E: SensorEnvironment> {
    agent: DqnAgent<B>,

    env: E,

    stats: TrainingStats,

    config: TrainConfig,

    /// Episodes completed, including those of a resumed checkpoint
    episodes_done: usize,

    /// Environment steps across all episodes
    global_step: usize,

    /// Target network copies made by this loop
    target_syncs: usize,
}

impl<B: AutodiffBackend> TrainMode<B, HomeostasisWorld> {
    /// Build the agent and the built-in world from an experiment config
    ///
    /// With `training.resume_from` set, the agent comes from that checkpoint
    /// and its stored sensor layout replaces the one in `environment`.
    pub fn from_experiment(experiment: &ExperimentConfig, device: B::Device) -> Result<Self> {
        let (agent, episodes_done) = match &experiment.training.resume_from {
            Some(dir) => {
                let (agent, metadata) = load_checkpoint::<B>(dir, device)
                    .with_context(|| format!("Failed to resume from {:?}", dir))?;
                log::info!(
                    "Resumed from {:?}: {} episodes, {} train steps",
                    dir,
                    metadata.episodes,
                    metadata.train_steps
                );
                let ignored = changed_fields(&experiment.agent, &metadata.config);
                if !ignored.is_empty() {
                    log::warn!(
                        "Checkpoint agent config wins on resume; ignoring given values for: {}",
                        ignored.join(", ")
                    );
                }
                (agent, metadata.episodes)
            }
            None => {
                let sensors = SensorSpec::from_params(&experiment.environment)?;
                let agent = DqnAgent::new(
                    experiment.agent.clone(),
                    sensors,
                    crate::world::WORLD_ACTIONS,
                    device,
                )?;
                (agent, 0)
            }
        };

        let env = HomeostasisWorld::new(experiment.world.clone(), agent.sensor_spec().clone())?;
        let mut mode = Self::new(agent, env, experiment.training.clone())?;
        mode.episodes_done = episodes_done;
        Ok(mode)
    }
}

impl<B: AutodiffBackend, E: SensorEnvironment> TrainMode<B, E> {
    /// # Errors
    ///
    /// Fails if the agent and environment disagree on sensors or actions.
    pub fn new(mut agent: DqnAgent<B>, env: E, config: TrainConfig) -> Result<Self> {
        if agent.sensor_spec() != env.sensor_spec() {
            bail!(
                "Agent sensors {:?} do not match environment sensors {:?}",
                agent.sensor_spec(),
                env.sensor_spec()
            );
        }
        if agent.action_count() != env.action_count() {
            bail!(
                "Agent has {} actions, environment has {}",
                agent.action_count(),
                env.action_count()
            );
        }

        if config.experiment == Experiment::Test {
            agent.set_mode(ExecutionMode::Eval);
        }

        Ok(Self {
            agent,
            env,
            stats: TrainingStats::new(config.stats_window.max(1)),
            config,
            episodes_done: 0,
            global_step: 0,
            target_syncs: 0,
        })
    }

    /// Run all configured episodes
    pub fn run(&mut self) -> Result<()> {
        self.log_header();

        for episode in 1..=self.config.num_episodes {
            let (episode_return, steps) = self.run_episode()?;
            self.episodes_done += 1;
            self.stats
                .record_episode(episode_return, steps, self.agent.epsilon());

            if self.config.log_frequency > 0 && episode % self.config.log_frequency == 0 {
                log::info!(
                    "[Episode {}/{}] {}",
                    episode,
                    self.config.num_episodes,
                    self.stats.format_summary()
                );
            }

            if self.is_training()
                && self.config.checkpoint_frequency > 0
                && episode % self.config.checkpoint_frequency == 0
            {
                self.save_checkpoint()?;
            }
        }

        if self.is_training() {
            self.save_checkpoint()?;
        }

        log::info!("Finished: {}", self.stats.format_summary());
        Ok(())
    }

    /// Run one episode
    ///
    /// # Returns
    ///
    /// The episode return and the number of steps taken
    pub fn run_episode(&mut self) -> Result<(f32, usize)> {
        let max_steps = self.agent.config().max_time_step;
        let train_start = self.agent.config().train_start;
        let batch_size = self.agent.config().batch_size;
        let target_period = self.agent.config().target_update_period;

        // The first window repeats the initial observation
        let first = self.agent.assembler().extract(&self.env.reset())?;
        let mut window = self.agent.assembler().stack(&first, &first)?;
        let mut latest = first;

        let mut episode_return = 0.0;
        let mut steps = 0;

        while steps < max_steps {
            let (action, _, _) = self.agent.step(&window);
            let outcome = self.env.step(action);

            let observation = self.agent.assembler().extract(&outcome.payload)?;
            let next_window = self.agent.assembler().stack(&latest, &observation)?;

            steps += 1;
            self.global_step += 1;
            let done = outcome.terminated || steps == max_steps;

            let reward = self.agent.get_reward(&window, &next_window, action, done);
            episode_return += reward;

            if self.is_training() {
                if !done {
                    self.agent.append_sample(Transition::new(
                        window,
                        action,
                        reward,
                        next_window.clone(),
                        done,
                    ));
                }

                let stored = self.agent.buffer().len();
                if stored > train_start && stored >= batch_size {
                    let loss = self.agent.train()?;
                    self.stats.record_update(loss);

                    if self.global_step % target_period == 0 {
                        self.agent.update_target_model();
                        self.target_syncs += 1;
                        log::debug!("Target network synced at step {}", self.global_step);
                    }
                }
            }

            if done {
                break;
            }
            window = next_window;
            latest = observation;
        }

        Ok((episode_return, steps))
    }

    fn is_training(&self) -> bool {
        self.config.experiment == Experiment::Train
    }

    fn save_checkpoint(&self) -> Result<()> {
        save_checkpoint(&self.agent, &self.config.checkpoint_dir, self.episodes_done).with_context(
            || {
                format!(
                    "Failed to save checkpoint to {:?}",
                    self.config.checkpoint_dir
                )
            },
        )
    }

    fn log_header(&self) {
        let agent = self.agent.config();
        log::info!(
            "{:?} run: {} episodes, sensors {:?}, {} actions",
            self.config.experiment,
            self.config.num_episodes,
            self.agent.sensor_spec().active_modalities(),
            self.agent.action_count()
        );
        log::info!(
            "lr {} | gamma {} | batch {} | replay {} | target period {} | shaping {}",
            agent.learning_rate,
            agent.gamma,
            agent.batch_size,
            agent.replay_capacity,
            agent.target_update_period,
            agent.reward_shaping
        );
    }

    /// Get a reference to the agent
    pub fn agent(&self) -> &DqnAgent<B> {
        &self.agent
    }

    /// Get the episode statistics
    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Get the number of environment steps taken so far
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Get the number of completed episodes
    pub fn episodes_done(&self) -> usize {
        self.episodes_done
    }

    /// Get the number of target network syncs performed
    pub fn target_syncs(&self) -> usize {
        self.target_syncs
    }
}
