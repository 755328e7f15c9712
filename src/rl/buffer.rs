//! Experience replay memory for DQN training
//!
//! A bounded FIFO of windowed transitions. Once full, appending evicts the
//! oldest entry. Sampling draws uniformly without replacement.

use burn::tensor::backend::Backend;
use rand::Rng;
use std::collections::VecDeque;

use super::observation::WindowedObservation;
use crate::error::{DqnError, Result};

/// One step of experience, stored on the inference backend
#[derive(Debug, Clone)]
pub struct Transition<B: Backend> {
    pub observation: WindowedObservation<B>,
    pub action: usize,
    pub reward: f32,
    pub next_observation: WindowedObservation<B>,
    pub done: bool,
}

impl<B: Backend> Transition<B> {
    pub fn new(
        observation: WindowedObservation<B>,
        action: usize,
        reward: f32,
        next_observation: WindowedObservation<B>,
        done: bool,
    ) -> Self {
        Self {
            observation,
            action,
            reward,
            next_observation,
            done,
        }
    }
}

/// Bounded replay memory
///
/// # Type Parameters
///
/// * `B` - The Burn backend the stored tensors live on
pub struct ReplayBuffer<B: Backend> {
    entries: VecDeque<Transition<B>>,
    capacity: usize,
}

impl<B: Backend> ReplayBuffer<B> {
    /// Create an empty buffer holding at most `capacity` transitions
    ///
    /// A capacity of zero yields a buffer that silently drops every append.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append a transition, evicting the oldest one when full
    pub fn append(&mut self, transition: Transition<B>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(transition);
    }

    /// Draw `n` distinct transitions uniformly at random
    ///
    /// # Errors
    ///
    /// [`DqnError::InsufficientData`] if fewer than `n` transitions are stored.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<&Transition<B>>> {
        if n > self.entries.len() {
            return Err(DqnError::InsufficientData {
                requested: n,
                available: self.entries.len(),
            });
        }

        Ok(rand::seq::index::sample(rng, self.entries.len(), n)
            .into_iter()
            .map(|i| &self.entries[i])
            .collect())
    }

    /// Get the number of stored transitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no transitions are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the next append evicts the oldest transition
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Get the maximum number of stored transitions
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every stored transition
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition<B>> {
        self.entries.iter()
    }
}
