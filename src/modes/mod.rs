pub mod train;

pub use train::{Experiment, ExperimentConfig, TrainConfig, TrainMode};
