//! Checkpoints for trained agents
//!
//! A checkpoint is a directory holding:
//! - `online.mpk` - online network weights (Burn record format)
//! - `target.mpk` - target network weights
//! - `meta.json` - hyperparameters, network layout and training progress
//!
//! Replay memory and optimizer state are not persisted.

use super::dqn::{DqnAgent, Inner};
use super::{DqnConfig, QNetwork, QNetworkConfig};
use anyhow::{Context, Result};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

const ONLINE_FILE: &str = "online";
const TARGET_FILE: &str = "target";
const META_FILE: &str = "meta.json";

/// Metadata saved next to the network weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub config: DqnConfig,

    /// Network layout, including the sensor spec and action count
    pub network: QNetworkConfig,

    /// Completed training steps
    pub train_steps: usize,

    /// Completed episodes
    pub episodes: usize,

    /// Exploration rate at save time
    pub epsilon: f64,

    /// Crate version that wrote the checkpoint
    pub version: String,
}

impl CheckpointMetadata {
    pub fn from_agent<B: AutodiffBackend>(agent: &DqnAgent<B>, episodes: usize) -> Self {
        Self {
            config: agent.config().clone(),
            network: agent.network_config().clone(),
            train_steps: agent.train_steps(),
            episodes,
            epsilon: agent.epsilon(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Write both networks and the metadata into `dir`, creating it if needed
pub fn save_checkpoint<B: AutodiffBackend>(
    agent: &DqnAgent<B>,
    dir: &Path,
    episodes: usize,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create checkpoint directory: {:?}", dir))?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(agent.online_network().clone().into_record(), dir.join(ONLINE_FILE))
        .context("Failed to save online network weights")?;
    recorder
        .record(agent.target_network().clone().into_record(), dir.join(TARGET_FILE))
        .context("Failed to save target network weights")?;

    let metadata = CheckpointMetadata::from_agent(agent, episodes);
    let meta_path = dir.join(META_FILE);
    let meta_json =
        serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    std::fs::write(&meta_path, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", meta_path))?;

    log::info!("Checkpoint saved to {:?} ({} episodes)", dir, episodes);
    Ok(())
}

/// Read the metadata of a checkpoint directory
pub fn load_metadata(dir: &Path) -> Result<CheckpointMetadata> {
    let meta_path = dir.join(META_FILE);
    let meta_json = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read metadata from {:?}", meta_path))?;
    serde_json::from_str(&meta_json).context("Failed to deserialize metadata")
}

/// Load one network's weights into a network built from `network_config`
///
/// `path` is the record file without its `.mpk` extension.
pub fn load_network<B: Backend>(
    path: &Path,
    network_config: &QNetworkConfig,
    device: &B::Device,
) -> Result<QNetwork<B>> {
    let network = network_config.init::<B>(device);

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Failed to load network weights from {:?}", path))?;

    Ok(network.load_record(record))
}

/// Rebuild an agent from a checkpoint directory
pub fn load_checkpoint<B: AutodiffBackend>(
    dir: &Path,
    device: B::Device,
) -> Result<(DqnAgent<B>, CheckpointMetadata)> {
    let metadata = load_metadata(dir)?;

    let online = load_network::<B>(&dir.join(ONLINE_FILE), &metadata.network, &device)?;
    let target = load_network::<Inner<B>>(&dir.join(TARGET_FILE), &metadata.network, &device)?;

    let agent = DqnAgent::restore(
        metadata.config.clone(),
        metadata.network.clone(),
        online,
        target,
        metadata.train_steps,
        device,
    )
    .context("Checkpoint holds an invalid agent configuration")?;

    Ok((agent, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::network::ExecutionMode;
    use crate::rl::{default_device, RawSensorPayload, SensorSpec, TrainingBackend};
    use burn::module::AutodiffModule;
    use tempfile::TempDir;

    fn agent() -> DqnAgent<TrainingBackend> {
        let spec = SensorSpec::new().with_olfactory(2).with_touch();
        DqnAgent::new(DqnConfig::default(), spec, 4, default_device()).unwrap()
    }

    #[test]
    fn test_metadata_serialization() {
        let metadata = CheckpointMetadata::from_agent(&agent(), 12);
        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: CheckpointMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, metadata);
        assert_eq!(deserialized.episodes, 12);
        assert_eq!(deserialized.network.action_count, 4);
    }

    #[test]
    fn test_checkpoint_roundtrip_preserves_outputs() {
        let dir = TempDir::new().unwrap();
        let original = agent();
        save_checkpoint(&original, dir.path(), 3).unwrap();

        assert!(dir.path().join("online.mpk").exists());
        assert!(dir.path().join("target.mpk").exists());
        assert!(dir.path().join("meta.json").exists());

        let (restored, metadata) = load_checkpoint::<TrainingBackend>(dir.path(), default_device()).unwrap();
        assert_eq!(metadata.episodes, 3);
        assert_eq!(restored.sensor_spec(), original.sensor_spec());

        let obs = original
            .assembler()
            .extract(&RawSensorPayload::vector_only(vec![0.1, 0.2, 0.3, 0.4, 1.0]))
            .unwrap();
        let window = original.assembler().stack(&obs, &obs).unwrap();

        let before = original
            .online_network()
            .valid()
            .forward(&window, ExecutionMode::Eval)
            .into_data();
        let after = restored
            .online_network()
            .valid()
            .forward(&window, ExecutionMode::Eval)
            .into_data();
        before.assert_approx_eq(&after, 6);
    }

    #[test]
    fn test_load_missing_checkpoint_fails() {
        let dir = TempDir::new().unwrap();
        let result = load_checkpoint::<TrainingBackend>(&dir.path().join("nope"), default_device());
        assert!(result.is_err());
    }
}
