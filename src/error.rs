//! Error types for the DQN core

use thiserror::Error;

use crate::rl::sensors::Modality;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DqnError {
    /// The raw sensor payload does not hold what the sensor spec requires.
    #[error("Sensor payload mismatch on {channel}: expected {expected} values, got {got}")]
    SpecMismatch {
        channel: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Active modality sets differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: Vec<Modality>,
        right: Vec<Modality>,
    },

    #[error("Insufficient data: requested {requested}, available {available}")]
    InsufficientData { requested: usize, available: usize },

    #[error("All {rejected} transitions in the batch were malformed")]
    MalformedTransition { rejected: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DqnError>;
