//! Multi-modal Deep Q-Learning
//!
//! Provides:
//! - Sensor specification and raw payload layout
//! - Observation assembly: extraction, two-step windowing, batching
//! - Bounded replay memory
//! - Multi-branch Q-network with explicit train/eval normalization
//! - DQN agent with epsilon-greedy exploration and a target network
//! - Checkpoint persistence

pub mod action;
pub mod backend;
pub mod batch_norm;
pub mod buffer;
pub mod config;
pub mod dqn;
pub mod environment;
pub mod network;
pub mod observation;
pub mod persistence;
pub mod reward;
pub mod sensors;

pub use action::ActionType;
pub use backend::{default_device, InferenceBackend, TrainingBackend};
pub use buffer::{ReplayBuffer, Transition};
pub use config::DqnConfig;
pub use dqn::{DqnAgent, Inner};
pub use environment::{EnvStep, RawSensorPayload, SensorEnvironment};
pub use network::{ExecutionMode, QNetwork, QNetworkConfig};
pub use observation::{
    Observation, ObservationAssembler, ObservationBatch, SensorFrame, TransitionBatch,
    WindowedObservation,
};
pub use persistence::{load_checkpoint, load_metadata, load_network, save_checkpoint, CheckpointMetadata};
pub use reward::{shaped_reward, sparse_reward, HealthTerm};
pub use sensors::{EnvironmentParams, Modality, SensorSpec, VisionShape};
