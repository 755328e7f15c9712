//! Deep Q-Network agent
//!
//! Owns the online and target Q-networks, the replay memory, the optimizer and
//! the epsilon-greedy exploration schedule.

use super::buffer::{ReplayBuffer, Transition};
use super::config::DqnConfig;
use super::network::{ExecutionMode, QNetwork, QNetworkConfig};
use super::observation::{ObservationAssembler, WindowedObservation};
use super::reward::{shaped_reward, sparse_reward};
use super::sensors::SensorSpec;
use crate::error::{DqnError, Result};
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion, Int, Tensor},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Every gradient component is clamped to `[-GRAD_CLIP, GRAD_CLIP]`
const GRAD_CLIP: f32 = 1.0;

/// Inference backend of an autodiff backend
pub type Inner<B> = <B as AutodiffBackend>::InnerBackend;

/// DQN agent over windowed multi-modal observations
///
/// # Type Parameters
///
/// * `B` - Autodiff backend for the online network; the target network,
///   observations and replay memory live on its inner backend
///
/// # Example
///
/// ```rust
/// use interoceptive_dqn::rl::{DqnAgent, DqnConfig, RawSensorPayload, SensorSpec};
/// use burn::backend::{Autodiff, ndarray::{NdArray, NdArrayDevice}};
///
/// type Backend = Autodiff<NdArray<f32>>;
///
/// let spec = SensorSpec::new().with_touch();
/// let mut agent =
///     DqnAgent::<Backend>::new(DqnConfig::default(), spec, 5, NdArrayDevice::default()).unwrap();
///
/// let obs = agent.assembler().extract(&RawSensorPayload::vector_only(vec![0.0, 0.0, 1.0])).unwrap();
/// let window = agent.assembler().stack(&obs, &obs).unwrap();
/// let (action, q_values, _) = agent.step(&window);
///
/// assert!(action < 5);
/// assert_eq!(q_values.dims(), [1, 5]);
/// ```
pub struct DqnAgent<B: AutodiffBackend> {
    /// Network being trained
    online: QNetwork<B>,

    /// Periodically synced copy of `online` used for bootstrap targets
    target: QNetwork<Inner<B>>,

    optim: OptimizerAdaptor<Adam, QNetwork<B>, B>,

    assembler: ObservationAssembler<Inner<B>>,

    buffer: ReplayBuffer<Inner<B>>,

    config: DqnConfig,

    network_config: QNetworkConfig,

    epsilon: f64,

    /// Completed training steps
    train_steps: usize,

    last_loss: Option<f32>,

    mode: ExecutionMode,

    rng: StdRng,
}

impl<B: AutodiffBackend> DqnAgent<B> {
    /// Create an agent with freshly initialised networks
    ///
    /// The target network starts as an exact copy of the online network.
    ///
    /// # Errors
    ///
    /// [`DqnError::InvalidConfig`] for invalid hyperparameters, an invalid
    /// sensor spec or an empty action space.
    pub fn new(
        config: DqnConfig,
        sensors: SensorSpec,
        action_count: usize,
        device: B::Device,
    ) -> Result<Self> {
        let network_config = QNetworkConfig::new(sensors, action_count);
        Self::validate(&config, &network_config)?;

        let online = network_config.init::<B>(&device);
        let target = online.valid();
        Ok(Self::from_parts(config, network_config, online, target, 0, device))
    }

    /// Rebuild an agent around existing networks
    ///
    /// Epsilon is derived from `train_steps`. The replay memory starts empty
    /// and the optimizer state is fresh.
    pub fn restore(
        config: DqnConfig,
        network_config: QNetworkConfig,
        online: QNetwork<B>,
        target: QNetwork<Inner<B>>,
        train_steps: usize,
        device: B::Device,
    ) -> Result<Self> {
        Self::validate(&config, &network_config)?;
        Ok(Self::from_parts(
            config,
            network_config,
            online,
            target,
            train_steps,
            device,
        ))
    }

    fn validate(config: &DqnConfig, network_config: &QNetworkConfig) -> Result<()> {
        config.validate().map_err(DqnError::InvalidConfig)?;
        network_config.sensors.validate()?;
        if network_config.action_count == 0 {
            return Err(DqnError::InvalidConfig(
                "action_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn from_parts(
        config: DqnConfig,
        network_config: QNetworkConfig,
        online: QNetwork<B>,
        target: QNetwork<Inner<B>>,
        train_steps: usize,
        device: B::Device,
    ) -> Self {
        let optim = AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Value(GRAD_CLIP)))
            .init();

        Self {
            online,
            target,
            optim,
            assembler: ObservationAssembler::new(network_config.sensors.clone(), device),
            buffer: ReplayBuffer::new(config.replay_capacity),
            epsilon: config.epsilon_at(train_steps),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            network_config,
            train_steps,
            last_loss: None,
            mode: ExecutionMode::Train,
        }
    }

    /// Epsilon-greedy action selection
    ///
    /// Q-values always come from the online network. In train mode the
    /// forward pass also refreshes its normalization statistics.
    ///
    /// # Returns
    ///
    /// - `action` - chosen action index
    /// - `q_values` - online Q-values `[1, actions]`
    /// - `greedy` - whether the action is the argmax rather than a random draw
    pub fn step(&mut self, observation: &WindowedObservation<Inner<B>>) -> (usize, Tensor<Inner<B>, 2>, bool) {
        let input = observation.clone().into_frame().lift::<B>();
        let q_values = self.online.forward(&input, self.mode).inner();

        let explore: f64 = self.rng.gen();
        if explore < self.epsilon {
            let action = self.rng.gen_range(0..self.network_config.action_count);
            return (action, q_values, false);
        }

        let action = q_values
            .clone()
            .argmax(1)
            .into_scalar()
            .elem::<i64>() as usize;
        (action, q_values, true)
    }

    /// Reward for the transition `observation → next_observation`
    ///
    /// Shaped rewards read the most recent essential-variable reading, i.e.
    /// the newer half of the window's EV tensor.
    pub fn get_reward(
        &self,
        _observation: &WindowedObservation<Inner<B>>,
        next_observation: &WindowedObservation<Inner<B>>,
        action: usize,
        done: bool,
    ) -> f32 {
        if !self.config.reward_shaping {
            return sparse_reward(done);
        }

        let ev: Vec<f32> = next_observation.ev.to_data().iter::<f32>().collect();
        let latest = &ev[ev.len() / 2..];
        shaped_reward(latest, action, done, self.config.health_term)
    }

    /// Store a transition in the replay memory
    pub fn append_sample(&mut self, transition: Transition<Inner<B>>) {
        self.buffer.append(transition);
    }

    /// One gradient step on a sampled minibatch
    ///
    /// Epsilon decays only once the batch has been drawn and assembled, so a
    /// failed call leaves the agent untouched apart from the sampling RNG.
    ///
    /// # Errors
    ///
    /// - [`DqnError::InsufficientData`] if the buffer holds fewer than `batch_size` transitions
    /// - [`DqnError::MalformedTransition`] if no sampled transition is usable
    ///
    /// # Returns
    ///
    /// The mean Huber loss of the step
    pub fn train(&mut self) -> Result<f32> {
        let batch_size = self.config.batch_size;
        if self.buffer.len() < batch_size {
            return Err(DqnError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        let sampled = self.buffer.sample(batch_size, &mut self.rng)?;
        let batch = self
            .assembler
            .batch(sampled, self.network_config.action_count)?;
        let n = batch.len();

        self.train_steps += 1;
        self.epsilon = self.config.epsilon_at(self.train_steps);

        // Q(s, a) for the taken actions
        let observations = batch.observations.into_frame().lift::<B>();
        let q_values = self.online.forward(&observations, ExecutionMode::Train);
        let actions = Tensor::<B, 1, Int>::from_inner(batch.actions).reshape([n, 1]);
        let predicted: Tensor<B, 1> = q_values.gather(1, actions).squeeze(1);

        // r + γ · max_a' Q_target(s', a'), terminal steps included as-is
        let next_q = self
            .target
            .forward_frozen(&batch.next_observations, self.mode);
        let next_max: Tensor<Inner<B>, 1> = next_q.max_dim(1).squeeze(1);
        let targets = batch.rewards + next_max.mul_scalar(self.config.gamma);
        let targets = Tensor::<B, 1>::from_inner(targets);

        let loss = huber_loss(predicted, targets);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.online);
        self.online = self
            .optim
            .step(self.config.learning_rate, self.online.clone(), grads);

        self.last_loss = Some(loss_value);
        log::debug!(
            "train step {}: loss {:.6}, epsilon {:.4}, {} rejected",
            self.train_steps,
            loss_value,
            self.epsilon,
            batch.rejected
        );
        Ok(loss_value)
    }

    /// Replace the target network with a copy of the online network
    pub fn update_target_model(&mut self) {
        self.target = self.online.valid();
    }

    /// Switch between train and eval normalization
    pub fn set_mode(&mut self, mode: ExecutionMode) {
        self.mode = mode;
    }

    /// Get the current execution mode
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Get the current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Get the loss of the most recent training step
    pub fn last_loss(&self) -> Option<f32> {
        self.last_loss
    }

    /// Get the number of completed training steps
    pub fn train_steps(&self) -> usize {
        self.train_steps
    }

    /// Get a reference to the replay memory
    pub fn buffer(&self) -> &ReplayBuffer<Inner<B>> {
        &self.buffer
    }

    /// Get a reference to the observation assembler
    pub fn assembler(&self) -> &ObservationAssembler<Inner<B>> {
        &self.assembler
    }

    /// Get a reference to the online network
    pub fn online_network(&self) -> &QNetwork<B> {
        &self.online
    }

    /// Get a reference to the target network
    pub fn target_network(&self) -> &QNetwork<Inner<B>> {
        &self.target
    }

    /// Get a reference to the DQN configuration
    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    /// Get a reference to the network configuration
    pub fn network_config(&self) -> &QNetworkConfig {
        &self.network_config
    }

    /// Get the sensor layout the agent was built for
    pub fn sensor_spec(&self) -> &SensorSpec {
        &self.network_config.sensors
    }

    /// Get the number of discrete actions
    pub fn action_count(&self) -> usize {
        self.network_config.action_count
    }
}

/// Smooth-L1 loss with δ = 1, mean-reduced
fn huber_loss<B: AutodiffBackend>(predicted: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
    let abs = (predicted - targets).abs();
    let quadratic = abs.clone().clamp_max(1.0);
    let linear = abs - quadratic.clone();
    (quadratic.powf_scalar(2.0).mul_scalar(0.5) + linear).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::environment::RawSensorPayload;
    use crate::rl::reward::HealthTerm;
    use crate::rl::sensors::VisionShape;
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use burn::tensor::TensorData;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn small_config() -> DqnConfig {
        DqnConfig {
            batch_size: 4,
            replay_capacity: 64,
            exploration_steps: 5,
            learning_rate: 1e-3,
            ..Default::default()
        }
    }

    fn agent(config: DqnConfig, spec: SensorSpec) -> DqnAgent<TestBackend> {
        DqnAgent::new(config, spec, 5, NdArrayDevice::default()).unwrap()
    }

    fn window(
        agent: &DqnAgent<TestBackend>,
        vector: Vec<f32>,
    ) -> WindowedObservation<NdArray<f32>> {
        let spec = agent.sensor_spec();
        let visual = spec
            .vision()
            .map(|shape| (0..shape.len()).map(|i| (i % 200) as f32).collect());
        let obs = agent
            .assembler()
            .extract(&RawSensorPayload::new(visual, vector))
            .unwrap();
        agent.assembler().stack(&obs, &obs).unwrap()
    }

    fn fill(agent: &mut DqnAgent<TestBackend>, count: usize) {
        let width = agent.sensor_spec().vector_len();
        for i in 0..count {
            let obs = window(agent, vec![i as f32 * 0.1; width]);
            let next = window(agent, vec![i as f32 * 0.1 + 0.05; width]);
            agent.append_sample(Transition::new(obs, i % 5, -0.1, next, false));
        }
    }

    #[test]
    fn test_new_rejects_empty_action_space() {
        let result = DqnAgent::<TestBackend>::new(
            DqnConfig::default(),
            SensorSpec::new(),
            0,
            NdArrayDevice::default(),
        );
        assert!(matches!(result, Err(DqnError::InvalidConfig(_))));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DqnConfig {
            gamma: 2.0,
            ..Default::default()
        };
        let result = DqnAgent::<TestBackend>::new(config, SensorSpec::new(), 5, NdArrayDevice::default());
        assert!(matches!(result, Err(DqnError::InvalidConfig(_))));
    }

    #[test]
    fn test_step_is_greedy_at_zero_epsilon() {
        let config = DqnConfig {
            epsilon_start: 0.0,
            epsilon_end: 0.0,
            ..small_config()
        };
        let mut agent = agent(config, SensorSpec::new().with_olfactory(3));
        let obs = window(&agent, vec![0.2, 0.4, 1.0, 0.5, 0.25]);

        for _ in 0..5 {
            let (action, q_values, greedy) = agent.step(&obs);
            assert!(greedy);

            let best = q_values
                .clone()
                .argmax(1)
                .into_scalar()
                .elem::<i64>() as usize;
            assert_eq!(action, best);
        }
    }

    #[test]
    fn test_step_explores_at_full_epsilon() {
        let mut agent = agent(small_config(), SensorSpec::new());
        let obs = window(&agent, vec![0.0, 0.0]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let (action, q_values, greedy) = agent.step(&obs);
            assert!(!greedy);
            assert!(action < 5);
            assert_eq!(q_values.dims(), [1, 5]);
            seen.insert(action);
        }
        assert_eq!(seen.len(), 5, "random actions should cover the action space");
    }

    #[test]
    fn test_get_reward_regimes() {
        let sparse = agent(small_config(), SensorSpec::new());
        let obs = window(&sparse, vec![0.0, 0.0]);
        assert_eq!(sparse.get_reward(&obs, &obs, 1, false), 0.0);
        assert_eq!(sparse.get_reward(&obs, &obs, 1, true), -1.0);

        let config = DqnConfig {
            reward_shaping: true,
            health_term: HealthTerm::Off,
            ..small_config()
        };
        // thermal + collision give four EV components
        let shaped = agent(config, SensorSpec::new().with_thermal(1).with_collision(1));
        let obs = window(&shaped, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let next = window(&shaped, vec![3.0, 4.0, 0.0, 20.0, 0.0, 0.0]);

        let reward = shaped.get_reward(&obs, &next, 0, false);
        assert!((reward + 0.25).abs() < 1e-6, "got {}", reward);
        assert_eq!(shaped.get_reward(&obs, &next, 0, true), -10.0);
    }

    #[test]
    fn test_train_requires_full_batch() {
        let mut agent = agent(small_config(), SensorSpec::new());
        fill(&mut agent, 3);

        let before = agent.epsilon();
        let result = agent.train();

        assert_eq!(
            result.unwrap_err(),
            DqnError::InsufficientData {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(agent.epsilon(), before);
        assert_eq!(agent.train_steps(), 0);
        assert_eq!(agent.buffer().len(), 3);
        assert!(agent.last_loss().is_none());
    }

    #[test]
    fn test_train_decays_epsilon_to_floor() {
        let mut agent = agent(small_config(), SensorSpec::new().with_touch());
        fill(&mut agent, 8);

        let mut previous = agent.epsilon();
        for _ in 0..8 {
            let loss = agent.train().unwrap();
            assert!(loss.is_finite());
            assert!(agent.epsilon() <= previous);
            assert!(agent.epsilon() >= 0.1);
            previous = agent.epsilon();

            if agent.train_steps() >= 5 {
                assert_eq!(agent.epsilon(), 0.1);
            }
        }
        assert!(agent.last_loss().is_some());
    }

    #[test]
    fn test_train_changes_online_weights_only() {
        let mut agent = agent(small_config(), SensorSpec::new().with_olfactory(2));
        fill(&mut agent, 8);
        let obs = window(&agent, vec![0.3, 0.3, 0.3, 0.3]);

        let online_before = agent
            .online_network()
            .valid()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();
        let target_before = agent
            .target_network()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();

        for _ in 0..3 {
            agent.train().unwrap();
        }

        let online_after = agent
            .online_network()
            .valid()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();
        let target_after = agent
            .target_network()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();

        assert_ne!(online_before, online_after);
        assert_eq!(target_before, target_after);
    }

    #[test]
    fn test_train_leaves_target_normalization_untouched() {
        let mut agent = agent(
            small_config(),
            SensorSpec::new()
                .with_vision(VisionShape::new(16, 16, 3))
                .with_olfactory(2),
        );
        assert_eq!(agent.mode(), ExecutionMode::Train);
        fill(&mut agent, 8);
        let obs = window(&agent, vec![0.5, 0.1, 0.2, 0.3]);

        let target_before = agent
            .target_network()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();
        for _ in 0..3 {
            agent.train().unwrap();
        }
        let target_after = agent
            .target_network()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();

        assert_eq!(target_before, target_after);
    }

    #[test]
    fn test_train_with_only_malformed_transitions_changes_nothing() {
        let mut agent = agent(small_config(), SensorSpec::new().with_olfactory(2));
        for i in 0..6 {
            let obs = window(&agent, vec![0.1 * i as f32; 4]);
            // Action 7 is outside the five-action space
            agent.append_sample(Transition::new(obs.clone(), 7, -0.1, obs, false));
        }
        let query = window(&agent, vec![0.3, 0.3, 0.3, 0.3]);
        let q_before = agent
            .online_network()
            .valid()
            .forward(&query, ExecutionMode::Eval)
            .into_data();
        let epsilon = agent.epsilon();

        let result = agent.train();

        assert_eq!(
            result.unwrap_err(),
            DqnError::MalformedTransition { rejected: 4 }
        );
        assert_eq!(agent.train_steps(), 0);
        assert_eq!(agent.epsilon(), epsilon);
        assert!(agent.last_loss().is_none());
        assert_eq!(agent.buffer().len(), 6);

        let q_after = agent
            .online_network()
            .valid()
            .forward(&query, ExecutionMode::Eval)
            .into_data();
        assert_eq!(q_before, q_after);
    }

    #[test]
    fn test_update_target_model_syncs_outputs() {
        let mut agent = agent(
            small_config(),
            SensorSpec::new()
                .with_vision(VisionShape::new(8, 8, 3))
                .with_olfactory(2),
        );
        fill(&mut agent, 8);
        for _ in 0..2 {
            agent.train().unwrap();
        }
        agent.update_target_model();

        let obs = window(&agent, vec![0.5, 0.1, 0.2, 0.3]);
        let online = agent
            .online_network()
            .valid()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();
        let target = agent
            .target_network()
            .forward(&obs, ExecutionMode::Eval)
            .into_data();
        online.assert_approx_eq(&target, 6);
    }

    #[test]
    fn test_huber_loss() {
        let device = NdArrayDevice::default();
        let predicted = Tensor::<TestBackend, 1>::from_data(
            TensorData::new(vec![0.0f32, 0.0, 0.0], [3]),
            &device,
        );
        let targets = Tensor::<TestBackend, 1>::from_data(
            TensorData::new(vec![0.5f32, -2.0, 0.0], [3]),
            &device,
        );

        // 0.125 (quadratic) + 1.5 (linear) + 0
        let loss = huber_loss(predicted, targets).into_scalar().elem::<f32>();
        assert!((loss - 1.625 / 3.0).abs() < 1e-6, "got {}", loss);
    }
}
