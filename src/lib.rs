//! Interoceptive DQN - a multi-modal Deep Q-Learning agent for embodied homeostasis
//!
//! This library provides:
//! - The DQN core: sensors, observation assembly, replay, Q-network, agent (rl module)
//! - A built-in homeostasis grid world (world module)
//! - Episode statistics (metrics module)
//! - The training/evaluation loop and experiment configuration (modes module)

pub mod error;
pub mod metrics;
pub mod modes;
pub mod rl;
pub mod world;

pub use error::{DqnError, Result};
