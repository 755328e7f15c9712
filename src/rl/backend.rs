//! Backend type aliases and device management
//!
//! - **TrainingBackend**: Autodiff-enabled NdArray backend for the online network (CPU)
//! - **InferenceBackend**: Plain NdArray backend for observations, replay and the target network
//!
//! # Example
//!
//! ```rust
//! use interoceptive_dqn::rl::{default_device, DqnAgent, DqnConfig, SensorSpec, TrainingBackend};
//!
//! let device = default_device();
//! let agent = DqnAgent::<TrainingBackend>::new(DqnConfig::default(), SensorSpec::new(), 5, device);
//! assert!(agent.is_ok());
//! ```

use burn::backend::{
    ndarray::{NdArray, NdArrayDevice},
    Autodiff,
};

/// Backend for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend for inference, replay storage and bootstrap targets
pub type InferenceBackend = NdArray<f32>;

/// Default NdArray device (CPU)
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
