//! Reward functions over essential-variable readings

use serde::{Deserialize, Serialize};

use super::action::ActionType;

/// Reward for any terminal step under shaping
pub const TERMINAL_REWARD: f32 = -10.0;

const EV_SCALE: f64 = 0.01;
const HEALTH_SCALE: f64 = 0.15;
const ACTION_PENALTY: f64 = 0.001;

/// How the fourth essential variable enters the shaped reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTerm {
    /// Penalize `ev[3]` itself
    #[default]
    Direct,
    /// Penalize the distance from full health, `100 - ev[3]`
    Inverted,
    /// Ignore `ev[3]`
    Off,
}

/// Dense reward from the next step's essential variables
///
/// `ev` holds the most recent EV reading. Missing components count as zero.
///
/// # Example
///
/// ```rust
/// use interoceptive_dqn::rl::{shaped_reward, HealthTerm};
///
/// let reward = shaped_reward(&[3.0, 4.0, 0.0, 20.0], 0, false, HealthTerm::Off);
/// assert!((reward + 0.25).abs() < 1e-6);
/// ```
pub fn shaped_reward(ev: &[f32], action: usize, done: bool, health: HealthTerm) -> f32 {
    if done {
        return TERMINAL_REWARD;
    }

    let component = |i: usize| ev.get(i).copied().unwrap_or(0.0) as f64;

    let drive: f64 = (0..3).map(|i| component(i).powi(2)).sum();
    let health = match health {
        HealthTerm::Direct => (HEALTH_SCALE * component(3)).powi(2),
        HealthTerm::Inverted => (HEALTH_SCALE * (100.0 - component(3))).powi(2),
        HealthTerm::Off => 0.0,
    };

    let mut reward = -EV_SCALE * (drive + health);
    let free = ActionType::from_index(action).is_some_and(ActionType::is_free);
    if !free {
        reward -= ACTION_PENALTY;
    }

    reward.clamp(-10.0, 10.0) as f32
}

/// Terminal-only reward
pub fn sparse_reward(done: bool) -> f32 {
    if done {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARD: usize = 1;
    const NONE: usize = 0;

    #[test]
    fn test_shaped_reward_without_health() {
        let reward = shaped_reward(&[3.0, 4.0, 0.0, 20.0], NONE, false, HealthTerm::Off);
        assert!((reward - (-0.25)).abs() < 1e-6, "got {}", reward);
    }

    #[test]
    fn test_shaped_reward_direct_health() {
        let reward = shaped_reward(&[3.0, 4.0, 0.0, 20.0], NONE, false, HealthTerm::Direct);
        assert!((reward - (-0.34)).abs() < 1e-6, "got {}", reward);
    }

    #[test]
    fn test_shaped_reward_inverted_health() {
        // (0.15 * 80)^2 = 144
        let reward = shaped_reward(&[3.0, 4.0, 0.0, 20.0], NONE, false, HealthTerm::Inverted);
        assert!((reward - (-1.69)).abs() < 1e-5, "got {}", reward);
    }

    #[test]
    fn test_action_penalty() {
        let reward = shaped_reward(&[3.0, 4.0, 0.0, 20.0], FORWARD, false, HealthTerm::Off);
        assert!((reward - (-0.251)).abs() < 1e-6, "got {}", reward);
    }

    #[test]
    fn test_terminal_overrides_everything() {
        assert_eq!(shaped_reward(&[3.0, 4.0, 0.0, 20.0], FORWARD, true, HealthTerm::Direct), -10.0);
        assert_eq!(shaped_reward(&[], NONE, true, HealthTerm::Off), -10.0);
    }

    #[test]
    fn test_reward_is_clipped() {
        let reward = shaped_reward(&[100.0, 100.0, 100.0], NONE, false, HealthTerm::Off);
        assert_eq!(reward, -10.0);
    }

    #[test]
    fn test_short_ev_treats_missing_as_zero() {
        let reward = shaped_reward(&[1.0, 2.0], NONE, false, HealthTerm::Inverted);
        // 1 + 4 + (0.15 * 100)^2 = 230
        assert!((reward - (-2.3)).abs() < 1e-5, "got {}", reward);
    }

    #[test]
    fn test_sparse_reward() {
        assert_eq!(sparse_reward(true), -1.0);
        assert_eq!(sparse_reward(false), 0.0);
    }
}
