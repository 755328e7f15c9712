//! DQN hyperparameter configuration

use serde::{Deserialize, Serialize};

use super::reward::HealthTerm;

/// Configuration for the DQN agent
///
/// Unknown fields are rejected and missing ones fall back to the defaults
/// below, so partial JSON configs are fine.
///
/// # Example
///
/// ```rust
/// use interoceptive_dqn::rl::DqnConfig;
///
/// let config = DqnConfig {
///     batch_size: 64,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DqnConfig {
    /// Learning rate for the Adam optimizer
    ///
    /// Default: 1e-4
    pub learning_rate: f64,

    /// Discount factor for bootstrapped targets
    ///
    /// Default: 0.99
    pub gamma: f32,

    /// Exploration rate before any training step
    ///
    /// Default: 1.0
    pub epsilon_start: f64,

    /// Exploration floor
    ///
    /// Default: 0.1
    pub epsilon_end: f64,

    /// Number of training steps over which epsilon decays linearly
    ///
    /// Default: 1_000_000
    pub exploration_steps: usize,

    /// Transitions per training step
    ///
    /// Default: 32
    pub batch_size: usize,

    /// Maximum number of stored transitions
    ///
    /// Default: 50_000
    pub replay_capacity: usize,

    /// Copy online weights to the target network every N global steps
    ///
    /// Default: 1000
    pub target_update_period: usize,

    /// Use the shaped (dense) reward instead of the sparse terminal reward
    ///
    /// Default: false
    pub reward_shaping: bool,

    /// How health enters the shaped reward
    ///
    /// Default: direct
    pub health_term: HealthTerm,

    /// Episode length cap
    ///
    /// Default: 1000
    pub max_time_step: usize,

    /// Training starts once the buffer holds more than this many transitions
    ///
    /// Default: 1000
    pub train_start: usize,

    /// Seed for exploration and replay sampling
    ///
    /// Default: 0
    pub seed: u64,
}

impl DqnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount epsilon drops per training step
    pub fn epsilon_decay_step(&self) -> f64 {
        if self.exploration_steps == 0 {
            return self.epsilon_start - self.epsilon_end;
        }
        (self.epsilon_start - self.epsilon_end) / self.exploration_steps as f64
    }

    /// Exploration rate after `train_steps` training steps
    ///
    /// Linear from `epsilon_start` to `epsilon_end`, exactly `epsilon_end`
    /// from `exploration_steps` onwards.
    pub fn epsilon_at(&self, train_steps: usize) -> f64 {
        if train_steps >= self.exploration_steps {
            return self.epsilon_end;
        }
        let epsilon = self.epsilon_start - self.epsilon_decay_step() * train_steps as f64;
        epsilon.max(self.epsilon_end)
    }

    /// Check that all hyperparameters are in valid ranges
    ///
    /// # Example
    ///
    /// ```rust
    /// use interoceptive_dqn::rl::DqnConfig;
    ///
    /// let mut config = DqnConfig::default();
    /// config.gamma = 1.5;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate <= 0.0 {
            return Err(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must be in [0, 1], got {}", self.gamma));
        }

        if !(0.0..=1.0).contains(&self.epsilon_start) || !(0.0..=1.0).contains(&self.epsilon_end) {
            return Err(format!(
                "epsilon bounds must be in [0, 1], got {} → {}",
                self.epsilon_start, self.epsilon_end
            ));
        }

        if self.epsilon_end > self.epsilon_start {
            return Err(format!(
                "epsilon_end ({}) cannot exceed epsilon_start ({})",
                self.epsilon_end, self.epsilon_start
            ));
        }

        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }

        if self.batch_size > self.replay_capacity {
            return Err(format!(
                "batch_size ({}) cannot exceed replay_capacity ({})",
                self.batch_size, self.replay_capacity
            ));
        }

        if self.target_update_period == 0 {
            return Err("target_update_period must be at least 1".to_string());
        }

        if self.max_time_step == 0 {
            return Err("max_time_step must be at least 1".to_string());
        }

        Ok(())
    }
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_end: 0.1,
            exploration_steps: 1_000_000,
            batch_size: 32,
            replay_capacity: 50_000,
            target_update_period: 1000,
            reward_shaping: false,
            health_term: HealthTerm::Direct,
            max_time_step: 1000,
            train_start: 1000,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DqnConfig::default();
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.gamma, 0.99);
        assert_eq!(config.epsilon_start, 1.0);
        assert_eq!(config.epsilon_end, 0.1);
        assert_eq!(config.exploration_steps, 1_000_000);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.replay_capacity, 50_000);
        assert_eq!(config.target_update_period, 1000);
        assert!(!config.reward_shaping);
        assert_eq!(config.health_term, HealthTerm::Direct);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DqnConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: Vec<fn(&mut DqnConfig)> = vec![
            |c| c.learning_rate = 0.0,
            |c| c.gamma = -0.1,
            |c| c.epsilon_start = 1.5,
            |c| c.epsilon_end = 0.9,
            |c| c.batch_size = 0,
            |c| c.replay_capacity = 8,
            |c| c.target_update_period = 0,
            |c| c.max_time_step = 0,
        ];

        for (i, mutate) in cases.into_iter().enumerate() {
            let mut config = DqnConfig {
                epsilon_start: 0.5,
                ..Default::default()
            };
            mutate(&mut config);
            assert!(config.validate().is_err(), "case {} should be rejected", i);
        }
    }

    #[test]
    fn test_epsilon_schedule() {
        let config = DqnConfig {
            epsilon_start: 1.0,
            epsilon_end: 0.1,
            exploration_steps: 10,
            ..Default::default()
        };

        assert_eq!(config.epsilon_at(0), 1.0);
        assert!((config.epsilon_at(5) - 0.55).abs() < 1e-12);
        assert_eq!(config.epsilon_at(10), 0.1);
        assert_eq!(config.epsilon_at(1000), 0.1);

        let mut previous = config.epsilon_at(0);
        for step in 1..20 {
            let epsilon = config.epsilon_at(step);
            assert!(epsilon <= previous);
            assert!(epsilon >= config.epsilon_end);
            previous = epsilon;
        }
    }

    #[test]
    fn test_zero_exploration_steps_starts_at_floor() {
        let config = DqnConfig {
            exploration_steps: 0,
            ..Default::default()
        };
        assert_eq!(config.epsilon_at(0), config.epsilon_end);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DqnConfig =
            serde_json::from_str(r#"{"batch_size": 8, "health_term": "inverted"}"#).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.health_term, HealthTerm::Inverted);
        assert_eq!(config.gamma, 0.99);
    }
}
