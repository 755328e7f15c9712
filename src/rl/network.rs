//! Multi-branch Q-network
//!
//! Each active sensor modality gets its own encoder. Encoded features are
//! concatenated in a fixed order and mapped to one Q-value per action.
//!
//! # Architecture
//!
//! ```text
//! ev        [batch, 2·ev]            → Linear(→ 50)
//! vision    [batch, 2·C, H, W] / 255 → 4 × (Conv2d(k=3, s=2, p=1) + BatchNorm + ReLU)
//!                                    → Flatten → Linear(→ 1000) + ReLU
//! olfactory [batch, 2·n]             → Linear(→ 100) + ReLU
//! thermal   [batch, 2·n]             → Linear(→ 100) + ReLU
//! touch     [batch, 2]               → Linear(→ 100) + ReLU
//! collision [batch, 2·n]             → Linear(→ 100) + ReLU
//!   ↓ Concat (ev, vision, olfactory, thermal, touch, collision)
//!   ↓ Linear(→ 400) + ReLU
//!   ↓ Linear(→ actions)
//! ```
//!
//! Conv channels are 16, 32, 64, 128. Inactive modalities have no encoder
//! and contribute nothing to the fusion width.
//!
//! # Example
//!
//! ```rust
//! use interoceptive_dqn::rl::{ExecutionMode, ObservationAssembler, QNetworkConfig, RawSensorPayload, SensorSpec};
//! use burn::backend::ndarray::{NdArray, NdArrayDevice};
//!
//! type Backend = NdArray<f32>;
//!
//! let device = NdArrayDevice::default();
//! let spec = SensorSpec::new().with_touch();
//! let network = QNetworkConfig::new(spec.clone(), 5).init::<Backend>(&device);
//!
//! let assembler = ObservationAssembler::<Backend>::new(spec, device);
//! let obs = assembler.extract(&RawSensorPayload::vector_only(vec![0.0, 0.0, 1.0])).unwrap();
//! let window = assembler.stack(&obs, &obs).unwrap();
//!
//! let q_values = network.forward(&window, ExecutionMode::Eval);
//! assert_eq!(q_values.dims(), [1, 5]);
//! ```

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation::relu, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use super::batch_norm::ModeBatchNorm;
use super::observation::SensorFrame;
use super::sensors::{Modality, SensorSpec, VisionShape};

/// Whether normalization layers use batch statistics (and update their
/// running averages) or the stored running averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Train,
    Eval,
}

/// Architecture hyperparameters of the Q-network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetworkConfig {
    /// Sensor layout the network consumes (widths are per single observation)
    pub sensors: SensorSpec,

    /// Number of discrete actions
    pub action_count: usize,

    /// Output width of the EV encoder (default: 50)
    pub ev_units: usize,

    /// Output width of the vision encoder (default: 1000)
    pub vision_units: usize,

    /// Output width of each vector-sensor encoder (default: 100)
    pub vector_units: usize,

    /// Width of the fused hidden layer (default: 400)
    pub fusion_units: usize,

    /// Output channels of the four conv layers (default: [16, 32, 64, 128])
    pub conv_channels: [usize; 4],
}

impl QNetworkConfig {
    pub fn new(sensors: SensorSpec, action_count: usize) -> Self {
        Self {
            sensors,
            action_count,
            ev_units: 50,
            vision_units: 1000,
            vector_units: 100,
            fusion_units: 400,
            conv_channels: [16, 32, 64, 128],
        }
    }

    /// Encoder output width of a modality, zero if inactive
    pub fn branch_width(&self, modality: Modality) -> usize {
        match modality {
            Modality::Ev => self.ev_units,
            Modality::Vision if self.sensors.uses(modality) => self.vision_units,
            other if self.sensors.uses(other) => self.vector_units,
            _ => 0,
        }
    }

    /// Input width of the fusion layer
    pub fn fusion_width(&self) -> usize {
        Modality::FUSION_ORDER
            .iter()
            .map(|modality| self.branch_width(*modality))
            .sum()
    }

    /// Flattened size of the conv stack output for a given frame shape
    pub fn conv_output_len(&self, shape: VisionShape) -> usize {
        let (mut height, mut width) = (shape.height, shape.width);
        for _ in 0..self.conv_channels.len() {
            // k=3, s=2, p=1
            height = (height + 1) / 2;
            width = (width + 1) / 2;
        }
        self.conv_channels[self.conv_channels.len() - 1] * height * width
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        let vector_encoder = |modality: Modality| {
            self.sensors.width(modality).map(|width| {
                LinearConfig::new(2 * width, self.vector_units).init(device)
            })
        };

        QNetwork {
            ev: LinearConfig::new(2 * self.sensors.ev_width(), self.ev_units).init(device),
            vision: self.sensors.vision().map(|shape| self.init_vision(shape, device)),
            olfactory: vector_encoder(Modality::Olfactory),
            thermal: vector_encoder(Modality::Thermal),
            touch: vector_encoder(Modality::Touch),
            collision: vector_encoder(Modality::Collision),
            fusion: LinearConfig::new(self.fusion_width(), self.fusion_units).init(device),
            output: LinearConfig::new(self.fusion_units, self.action_count).init(device),
        }
    }

    fn init_vision<B: Backend>(&self, shape: VisionShape, device: &B::Device) -> VisionEncoder<B> {
        let mut convs = Vec::with_capacity(self.conv_channels.len());
        let mut norms = Vec::with_capacity(self.conv_channels.len());
        let mut in_channels = 2 * shape.channels;

        for &out_channels in &self.conv_channels {
            convs.push(
                Conv2dConfig::new([in_channels, out_channels], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            norms.push(ModeBatchNorm::new(out_channels, device));
            in_channels = out_channels;
        }

        VisionEncoder {
            convs,
            norms,
            projection: LinearConfig::new(self.conv_output_len(shape), self.vision_units)
                .init(device),
        }
    }
}

/// Convolutional encoder for stacked camera frames
#[derive(Module, Debug)]
pub struct VisionEncoder<B: Backend> {
    convs: Vec<Conv2d<B>>,
    norms: Vec<ModeBatchNorm<B>>,
    projection: Linear<B>,
}

impl<B: Backend> VisionEncoder<B> {
    /// Encode `[batch, 2·C, H, W]` pixels; `track` controls whether train mode
    /// refreshes the normalization running statistics
    pub fn forward(&self, pixels: Tensor<B, 4>, mode: ExecutionMode, track: bool) -> Tensor<B, 2> {
        let mut x = pixels.div_scalar(255.0);
        for (conv, norm) in self.convs.iter().zip(&self.norms) {
            let conv_out = conv.forward(x);
            let normalized = if track {
                norm.forward(conv_out, mode)
            } else {
                norm.forward_frozen(conv_out, mode)
            };
            x = relu(normalized);
        }

        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);
        relu(self.projection.forward(x))
    }
}

/// Q-value estimator over windowed multi-modal observations
///
/// # Type Parameters
///
/// * `B` - The Burn backend to use (e.g., `NdArray<f32>`, `Autodiff<NdArray<f32>>`)
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    ev: Linear<B>,
    vision: Option<VisionEncoder<B>>,
    olfactory: Option<Linear<B>>,
    thermal: Option<Linear<B>>,
    touch: Option<Linear<B>>,
    collision: Option<Linear<B>>,
    fusion: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> QNetwork<B> {
    fn vector_encoder(&self, modality: Modality) -> Option<&Linear<B>> {
        match modality {
            Modality::Olfactory => self.olfactory.as_ref(),
            Modality::Thermal => self.thermal.as_ref(),
            Modality::Touch => self.touch.as_ref(),
            Modality::Collision => self.collision.as_ref(),
            Modality::Ev | Modality::Vision => None,
        }
    }

    /// Compute Q-values `[batch, actions]` for windowed observations
    ///
    /// A modality present in `frame` without a matching encoder (or the other
    /// way round) is skipped; callers are expected to pass frames built from
    /// the same sensor spec as the network.
    pub fn forward(&self, frame: &SensorFrame<B>, mode: ExecutionMode) -> Tensor<B, 2> {
        self.evaluate(frame, mode, true)
    }

    /// Forward pass that leaves the normalization running statistics as they are
    ///
    /// Used for bootstrap targets, so the target network only changes through
    /// an explicit copy of the online weights.
    pub fn forward_frozen(&self, frame: &SensorFrame<B>, mode: ExecutionMode) -> Tensor<B, 2> {
        self.evaluate(frame, mode, false)
    }

    fn evaluate(&self, frame: &SensorFrame<B>, mode: ExecutionMode, track: bool) -> Tensor<B, 2> {
        let mut features = Vec::with_capacity(Modality::FUSION_ORDER.len());

        for modality in Modality::FUSION_ORDER {
            match modality {
                Modality::Ev => features.push(self.ev.forward(frame.ev.clone())),
                Modality::Vision => {
                    if let (Some(encoder), Some(pixels)) = (&self.vision, &frame.vision) {
                        features.push(encoder.forward(pixels.clone(), mode, track));
                    }
                }
                vector => {
                    if let (Some(encoder), Some(input)) =
                        (self.vector_encoder(vector), frame.vector(vector))
                    {
                        features.push(relu(encoder.forward(input.clone())));
                    }
                }
            }
        }

        let x = Tensor::cat(features, 1);
        let x = relu(self.fusion.forward(x));
        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::environment::RawSensorPayload;
    use crate::rl::observation::{ObservationAssembler, WindowedObservation};
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn window(spec: &SensorSpec, seed: f32) -> WindowedObservation<TestBackend> {
        let assembler = ObservationAssembler::<TestBackend>::new(spec.clone(), NdArrayDevice::default());
        let vector = (0..spec.vector_len()).map(|i| seed + i as f32 * 0.1).collect();
        let visual = spec
            .vision()
            .map(|shape| (0..shape.len()).map(|i| ((i * 7) % 256) as f32).collect());
        let obs = assembler.extract(&RawSensorPayload::new(visual, vector)).unwrap();
        assembler.stack(&obs, &obs).unwrap()
    }

    #[test]
    fn test_fusion_width_tracks_active_modalities() {
        let config = QNetworkConfig::new(SensorSpec::new(), 5);
        assert_eq!(config.fusion_width(), 50);

        let config = QNetworkConfig::new(
            SensorSpec::new()
                .with_vision(VisionShape::new(64, 64, 3))
                .with_olfactory(10),
            5,
        );
        assert_eq!(config.fusion_width(), 50 + 1000 + 100);
    }

    #[test]
    fn test_conv_output_len() {
        let config = QNetworkConfig::new(SensorSpec::new(), 5);
        assert_eq!(config.conv_output_len(VisionShape::new(64, 64, 3)), 128 * 4 * 4);
        assert_eq!(config.conv_output_len(VisionShape::new(7, 5, 3)), 128);
    }

    #[test]
    fn test_forward_shapes_for_every_combination() {
        let device = NdArrayDevice::default();
        let specs = [
            SensorSpec::new(),
            SensorSpec::new().with_touch(),
            SensorSpec::new().with_olfactory(4).with_thermal(3),
            SensorSpec::new()
                .with_vision(VisionShape::new(8, 8, 3))
                .with_collision(2),
            SensorSpec::new()
                .with_vision(VisionShape::new(8, 8, 3))
                .with_olfactory(4)
                .with_thermal(3)
                .with_touch()
                .with_collision(2),
        ];

        for spec in specs {
            let network = QNetworkConfig::new(spec.clone(), 5).init::<TestBackend>(&device);
            let q_values = network.forward(&window(&spec, 0.0), ExecutionMode::Eval);
            assert_eq!(q_values.dims(), [1, 5], "spec {:?}", spec);
        }
    }

    #[test]
    fn test_batched_forward() {
        let device = NdArrayDevice::default();
        let spec = SensorSpec::new()
            .with_vision(VisionShape::new(8, 8, 3))
            .with_olfactory(4);
        let network = QNetworkConfig::new(spec.clone(), 4).init::<TestBackend>(&device);

        let frames: Vec<_> = (0..3).map(|i| window(&spec, i as f32).into_frame()).collect();
        let batch = SensorFrame {
            ev: Tensor::cat(frames.iter().map(|f| f.ev.clone()).collect(), 0),
            vision: Some(Tensor::cat(
                frames.iter().filter_map(|f| f.vision.clone()).collect(),
                0,
            )),
            olfactory: Some(Tensor::cat(
                frames.iter().filter_map(|f| f.olfactory.clone()).collect(),
                0,
            )),
            thermal: None,
            touch: None,
            collision: None,
        };

        let q_values = network.forward(&batch, ExecutionMode::Train);
        assert_eq!(q_values.dims(), [3, 4]);
    }

    #[test]
    fn test_gradient_reaches_every_branch() {
        let device = NdArrayDevice::default();
        let spec = SensorSpec::new().with_olfactory(3).with_touch();
        let network = QNetworkConfig::new(spec.clone(), 3).init::<TestAutodiffBackend>(&device);

        let frame = window(&spec, 1.0).into_frame();
        let ev = Tensor::<TestAutodiffBackend, 2>::from_inner(frame.ev).require_grad();
        let olfactory =
            Tensor::<TestAutodiffBackend, 2>::from_inner(frame.olfactory.unwrap()).require_grad();
        let touch =
            Tensor::<TestAutodiffBackend, 2>::from_inner(frame.touch.unwrap()).require_grad();

        let input = SensorFrame {
            ev: ev.clone(),
            vision: None,
            olfactory: Some(olfactory.clone()),
            thermal: None,
            touch: Some(touch.clone()),
            collision: None,
        };

        let grads = network.forward(&input, ExecutionMode::Train).sum().backward();

        assert!(ev.grad(&grads).is_some(), "EV branch should receive gradients");
        assert!(olfactory.grad(&grads).is_some(), "Olfactory branch should receive gradients");
        assert!(touch.grad(&grads).is_some(), "Touch branch should receive gradients");
    }

    #[test]
    fn test_frozen_forward_keeps_normalization_state() {
        let device = NdArrayDevice::default();
        let spec = SensorSpec::new().with_vision(VisionShape::new(16, 16, 3));
        let network = QNetworkConfig::new(spec.clone(), 4).init::<TestBackend>(&device);
        let input = window(&spec, 0.5);

        let before = network.forward(&input, ExecutionMode::Eval).into_data();
        for _ in 0..3 {
            network.forward_frozen(&input, ExecutionMode::Train);
        }
        let after = network.forward(&input, ExecutionMode::Eval).into_data();
        assert_eq!(before, after);

        network.forward(&input, ExecutionMode::Train);
        let tracked = network.forward(&input, ExecutionMode::Eval).into_data();
        assert_ne!(before, tracked);
    }

    #[test]
    fn test_eval_mode_is_deterministic() {
        let device = NdArrayDevice::default();
        let spec = SensorSpec::new().with_vision(VisionShape::new(8, 8, 3));
        let network = QNetworkConfig::new(spec.clone(), 4).init::<TestBackend>(&device);
        let input = window(&spec, 0.5);

        let first = network.forward(&input, ExecutionMode::Eval).into_data();
        let second = network.forward(&input, ExecutionMode::Eval).into_data();
        assert_eq!(first, second);
    }
}
