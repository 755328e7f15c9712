//! Training statistics tracking for DQN
//!
//! Rolling averages of episode returns, episode lengths and training losses.

use std::collections::VecDeque;

/// Training statistics tracker with rolling averages
///
/// # Example
///
/// ```rust
/// use interoceptive_dqn::metrics::TrainingStats;
///
/// let mut stats = TrainingStats::new(100);
///
/// stats.record_episode(-12.5, 150, 0.9);
/// stats.record_update(0.02);
///
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    /// Episode returns (rolling window)
    episode_returns: VecDeque<f32>,

    /// Episode lengths in steps (rolling window)
    episode_lengths: VecDeque<usize>,

    /// Training losses (rolling window)
    losses: VecDeque<f32>,

    /// Exploration rate at the end of the latest episode
    epsilon: f64,

    total_episodes: usize,

    total_steps: usize,

    total_updates: usize,

    /// Window size for rolling averages
    window_size: usize,
}

impl TrainingStats {
    /// Create a tracker keeping the last `window_size` values of each metric
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_returns: VecDeque::with_capacity(window_size),
            episode_lengths: VecDeque::with_capacity(window_size),
            losses: VecDeque::with_capacity(window_size),
            epsilon: 1.0,
            total_episodes: 0,
            total_steps: 0,
            total_updates: 0,
            window_size,
        }
    }

    /// Record the completion of an episode
    ///
    /// # Example
    ///
    /// ```rust
    /// use interoceptive_dqn::metrics::TrainingStats;
    ///
    /// let mut stats = TrainingStats::new(100);
    /// stats.record_episode(-3.0, 150, 0.5);
    ///
    /// assert_eq!(stats.total_episodes(), 1);
    /// assert_eq!(stats.total_steps(), 150);
    /// ```
    pub fn record_episode(&mut self, episode_return: f32, length: usize, epsilon: f64) {
        Self::push_deque(&mut self.episode_returns, episode_return, self.window_size);
        Self::push_deque(&mut self.episode_lengths, length, self.window_size);
        self.epsilon = epsilon;
        self.total_episodes += 1;
        self.total_steps += length;
    }

    /// Record the loss of one training step
    pub fn record_update(&mut self, loss: f32) {
        Self::push_deque(&mut self.losses, loss, self.window_size);
        self.total_updates += 1;
    }

    pub fn mean_episode_return(&self) -> f32 {
        Self::mean(&self.episode_returns)
    }

    pub fn mean_episode_length(&self) -> f32 {
        if self.episode_lengths.is_empty() {
            0.0
        } else {
            self.episode_lengths.iter().sum::<usize>() as f32 / self.episode_lengths.len() as f32
        }
    }

    /// Mean training loss, or 0.0 before the first update
    pub fn mean_loss(&self) -> f32 {
        Self::mean(&self.losses)
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary of the current statistics
    ///
    /// ```text
    /// Episodes: 1 | Steps: 150 | Return: -12.50 | Len: 150.0 | Loss: 0.0200 | Updates: 1 | Eps: 0.900
    /// ```
    pub fn format_summary(&self) -> String {
        format!(
            "Episodes: {} | Steps: {} | Return: {:.2} | Len: {:.1} | Loss: {:.4} | Updates: {} | Eps: {:.3}",
            self.total_episodes,
            self.total_steps,
            self.mean_episode_return(),
            self.mean_episode_length(),
            self.mean_loss(),
            self.total_updates,
            self.epsilon,
        )
    }

    fn mean(deque: &VecDeque<f32>) -> f32 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<f32>() / deque.len() as f32
        }
    }

    fn push_deque<T>(deque: &mut VecDeque<T>, value: T, window_size: usize) {
        if deque.len() >= window_size {
            deque.pop_front();
        }
        deque.push_back(value);
    }
}
