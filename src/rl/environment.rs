//! Interface to the simulated world
//!
//! The agent never talks to a simulator directly. Anything that can produce
//! raw sensor payloads and accept a discrete action implements
//! [`SensorEnvironment`]; the built-in [`HomeostasisWorld`](crate::world::HomeostasisWorld)
//! is one such implementation.

use super::sensors::SensorSpec;

/// Raw per-step sensor readings for a single agent
///
/// - `visual`: one frame laid out as `[height, width, channels]`, values in `0..=255`
/// - `vector`: fixed-order concatenation `[ev, olfactory?, thermal?, collision?, touch?]`
///
/// Simulators may append extra trailing values to `vector`; they are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSensorPayload {
    pub visual: Option<Vec<f32>>,
    pub vector: Vec<f32>,
}

impl RawSensorPayload {
    pub fn new(visual: Option<Vec<f32>>, vector: Vec<f32>) -> Self {
        Self { visual, vector }
    }

    /// Payload without a visual channel
    pub fn vector_only(vector: Vec<f32>) -> Self {
        Self {
            visual: None,
            vector,
        }
    }
}

/// Result of stepping the environment with one action
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    pub payload: RawSensorPayload,
    /// The episode ended inside the environment (e.g. the agent died)
    pub terminated: bool,
}

/// A single-agent environment with a discrete action space
pub trait SensorEnvironment {
    /// Sensor layout of the payloads this environment produces
    fn sensor_spec(&self) -> &SensorSpec;

    /// Number of discrete actions; valid actions are `0..action_count()`
    fn action_count(&self) -> usize;

    /// Start a new episode and return the first observation
    fn reset(&mut self) -> RawSensorPayload;

    /// Apply `action` and advance the simulation by one step
    fn step(&mut self, action: usize) -> EnvStep;
}
