//! Observation assembly: raw payloads → per-modality tensors → windows → batches
//!
//! Every stage produces a [`SensorFrame`], a closed struct with one optional
//! tensor per modality. Vector modalities are `[batch, features]`, vision is
//! `[batch, channels, height, width]`. The newtypes [`Observation`],
//! [`WindowedObservation`] and [`ObservationBatch`] mark which stage a frame
//! belongs to.

use burn::tensor::{backend::AutodiffBackend, backend::Backend, Int, Tensor, TensorData};
use std::ops::Deref;

use super::buffer::Transition;
use super::environment::RawSensorPayload;
use super::sensors::{Modality, SensorSpec};
use crate::error::{DqnError, Result};

/// One tensor per active modality
#[derive(Debug, Clone)]
pub struct SensorFrame<B: Backend> {
    pub ev: Tensor<B, 2>,
    pub vision: Option<Tensor<B, 4>>,
    pub olfactory: Option<Tensor<B, 2>>,
    pub thermal: Option<Tensor<B, 2>>,
    pub touch: Option<Tensor<B, 2>>,
    pub collision: Option<Tensor<B, 2>>,
}

impl<B: Backend> SensorFrame<B> {
    /// Vector-valued tensor of a modality (`None` for vision or inactive modalities)
    pub fn vector(&self, modality: Modality) -> Option<&Tensor<B, 2>> {
        match modality {
            Modality::Ev => Some(&self.ev),
            Modality::Vision => None,
            Modality::Olfactory => self.olfactory.as_ref(),
            Modality::Thermal => self.thermal.as_ref(),
            Modality::Touch => self.touch.as_ref(),
            Modality::Collision => self.collision.as_ref(),
        }
    }

    /// Modalities present in this frame, in fusion order
    pub fn modalities(&self) -> Vec<Modality> {
        Modality::FUSION_ORDER
            .into_iter()
            .filter(|modality| match modality {
                Modality::Vision => self.vision.is_some(),
                other => self.vector(*other).is_some(),
            })
            .collect()
    }

    /// Leading (batch) dimension
    pub fn batch_size(&self) -> usize {
        self.ev.dims()[0]
    }

    /// Feature width of a modality (channel count for vision)
    pub fn feature_width(&self, modality: Modality) -> Option<usize> {
        match modality {
            Modality::Vision => self.vision.as_ref().map(|pixels| pixels.dims()[1]),
            other => self.vector(other).map(|tensor| tensor.dims()[1]),
        }
    }

    /// Move the frame onto an autodiff backend without tracking gradients
    pub fn lift<AD>(self) -> SensorFrame<AD>
    where
        AD: AutodiffBackend<InnerBackend = B>,
    {
        SensorFrame {
            ev: Tensor::from_inner(self.ev),
            vision: self.vision.map(Tensor::from_inner),
            olfactory: self.olfactory.map(Tensor::from_inner),
            thermal: self.thermal.map(Tensor::from_inner),
            touch: self.touch.map(Tensor::from_inner),
            collision: self.collision.map(Tensor::from_inner),
        }
    }

    /// Concatenate frames with identical modality sets
    ///
    /// Vector tensors are joined along `vector_dim`, vision along `vision_dim`.
    fn concat(frames: Vec<SensorFrame<B>>, vector_dim: usize, vision_dim: usize) -> Self {
        let n = frames.len();
        let mut ev = Vec::with_capacity(n);
        let mut vision = Vec::with_capacity(n);
        let mut olfactory = Vec::with_capacity(n);
        let mut thermal = Vec::with_capacity(n);
        let mut touch = Vec::with_capacity(n);
        let mut collision = Vec::with_capacity(n);

        for frame in frames {
            ev.push(frame.ev);
            vision.extend(frame.vision);
            olfactory.extend(frame.olfactory);
            thermal.extend(frame.thermal);
            touch.extend(frame.touch);
            collision.extend(frame.collision);
        }

        SensorFrame {
            ev: Tensor::cat(ev, vector_dim),
            vision: cat_present(vision, vision_dim),
            olfactory: cat_present(olfactory, vector_dim),
            thermal: cat_present(thermal, vector_dim),
            touch: cat_present(touch, vector_dim),
            collision: cat_present(collision, vector_dim),
        }
    }
}

fn cat_present<B: Backend, const D: usize>(
    parts: Vec<Tensor<B, D>>,
    dim: usize,
) -> Option<Tensor<B, D>> {
    if parts.is_empty() {
        None
    } else {
        Some(Tensor::cat(parts, dim))
    }
}

macro_rules! frame_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name<B: Backend>(SensorFrame<B>);

        impl<B: Backend> $name<B> {
            pub fn into_frame(self) -> SensorFrame<B> {
                self.0
            }
        }

        impl<B: Backend> Deref for $name<B> {
            type Target = SensorFrame<B>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

frame_newtype!(
    /// Sensor readings of a single step (batch size 1)
    Observation
);
frame_newtype!(
    /// Two consecutive observations joined along the feature axis (batch size 1)
    WindowedObservation
);
frame_newtype!(
    /// Windowed observations of many transitions joined along the batch axis
    ObservationBatch
);

/// Tensors for one training step
#[derive(Debug, Clone)]
pub struct TransitionBatch<B: Backend> {
    pub observations: ObservationBatch<B>,
    /// Action indices `[batch]`
    pub actions: Tensor<B, 1, Int>,
    /// Rewards `[batch]`
    pub rewards: Tensor<B, 1>,
    pub next_observations: ObservationBatch<B>,
    pub dones: Vec<bool>,
    /// Number of input transitions that were filtered out as malformed
    pub rejected: usize,
}

impl<B: Backend> TransitionBatch<B> {
    pub fn len(&self) -> usize {
        self.dones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dones.is_empty()
    }
}

/// Converts raw sensor payloads into tensors laid out by a [`SensorSpec`]
///
/// # Example
///
/// ```rust
/// use interoceptive_dqn::rl::{ObservationAssembler, RawSensorPayload, SensorSpec};
/// use burn::backend::ndarray::{NdArray, NdArrayDevice};
///
/// type Backend = NdArray<f32>;
///
/// let spec = SensorSpec::new().with_olfactory(3);
/// let assembler = ObservationAssembler::<Backend>::new(spec, NdArrayDevice::default());
///
/// let payload = RawSensorPayload::vector_only(vec![0.1, 0.2, 1.0, 2.0, 3.0]);
/// let obs = assembler.extract(&payload).unwrap();
/// let window = assembler.stack(&obs, &obs).unwrap();
///
/// assert_eq!(window.ev.dims(), [1, 4]);
/// assert_eq!(window.olfactory.as_ref().unwrap().dims(), [1, 6]);
/// ```
#[derive(Debug, Clone)]
pub struct ObservationAssembler<B: Backend> {
    spec: SensorSpec,
    device: B::Device,
}

impl<B: Backend> ObservationAssembler<B> {
    pub fn new(spec: SensorSpec, device: B::Device) -> Self {
        Self { spec, device }
    }

    pub fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Split a raw payload into per-modality tensors
    ///
    /// The vector channel is cut at the offsets given by the sensor spec. The
    /// visual frame is reordered from `[H, W, C]` to `[1, C, H, W]`.
    ///
    /// # Errors
    ///
    /// [`DqnError::SpecMismatch`] if the vector channel is shorter than the
    /// spec requires, or the visual frame is missing or has the wrong size.
    pub fn extract(&self, payload: &RawSensorPayload) -> Result<Observation<B>> {
        let required = self.spec.vector_len();
        if payload.vector.len() < required {
            return Err(DqnError::SpecMismatch {
                channel: "vector",
                expected: required,
                got: payload.vector.len(),
            });
        }

        let mut frame = SensorFrame {
            ev: Tensor::zeros([1, self.spec.ev_width()], &self.device),
            vision: None,
            olfactory: None,
            thermal: None,
            touch: None,
            collision: None,
        };

        for (modality, range) in self.spec.vector_layout() {
            let width = range.len();
            let values = payload.vector[range].to_vec();
            let tensor = Tensor::<B, 2>::from_data(TensorData::new(values, [1, width]), &self.device);
            match modality {
                Modality::Ev => frame.ev = tensor,
                Modality::Olfactory => frame.olfactory = Some(tensor),
                Modality::Thermal => frame.thermal = Some(tensor),
                Modality::Touch => frame.touch = Some(tensor),
                Modality::Collision => frame.collision = Some(tensor),
                Modality::Vision => {}
            }
        }

        if let Some(shape) = self.spec.vision() {
            let pixels = payload.visual.as_deref().unwrap_or(&[]);
            if pixels.len() != shape.len() {
                return Err(DqnError::SpecMismatch {
                    channel: "visual",
                    expected: shape.len(),
                    got: pixels.len(),
                });
            }

            // [H, W, C] → [C, W, H] → [C, H, W] → [1, C, H, W]
            let image = Tensor::<B, 3>::from_data(
                TensorData::new(pixels.to_vec(), [shape.height, shape.width, shape.channels]),
                &self.device,
            );
            let image: Tensor<B, 4> = image.swap_dims(0, 2).swap_dims(1, 2).unsqueeze_dim(0);
            frame.vision = Some(image);
        }

        Ok(Observation(frame))
    }

    /// Join two consecutive observations, older first
    ///
    /// # Errors
    ///
    /// [`DqnError::ShapeMismatch`] if the two observations expose different modalities.
    pub fn stack(
        &self,
        previous: &Observation<B>,
        current: &Observation<B>,
    ) -> Result<WindowedObservation<B>> {
        let left = previous.modalities();
        let right = current.modalities();
        if left != right {
            return Err(DqnError::ShapeMismatch { left, right });
        }

        let frame = SensorFrame::concat(vec![previous.0.clone(), current.0.clone()], 1, 1);
        Ok(WindowedObservation(frame))
    }

    /// Build training tensors from a set of transitions
    ///
    /// Transitions that do not match the sensor spec, or whose action lies
    /// outside `0..action_count`, are dropped with a warning.
    ///
    /// # Errors
    ///
    /// - [`DqnError::InsufficientData`] if `transitions` is empty
    /// - [`DqnError::MalformedTransition`] if every transition was dropped
    pub fn batch<'a, I>(&self, transitions: I, action_count: usize) -> Result<TransitionBatch<B>>
    where
        I: IntoIterator<Item = &'a Transition<B>>,
        B: 'a,
    {
        let mut valid = Vec::new();
        let mut rejected = 0;

        for transition in transitions {
            match self.check_transition(transition, action_count) {
                Ok(()) => valid.push(transition),
                Err(reason) => {
                    rejected += 1;
                    log::warn!("Dropping malformed transition: {}", reason);
                }
            }
        }

        if valid.is_empty() {
            if rejected == 0 {
                return Err(DqnError::InsufficientData {
                    requested: 1,
                    available: 0,
                });
            }
            return Err(DqnError::MalformedTransition { rejected });
        }
        if rejected > 0 {
            log::warn!(
                "Filtered {} malformed transitions, batching the remaining {}",
                rejected,
                valid.len()
            );
        }

        let observations = valid
            .iter()
            .map(|transition| transition.observation.0.clone())
            .collect();
        let next_observations = valid
            .iter()
            .map(|transition| transition.next_observation.0.clone())
            .collect();

        let n = valid.len();
        let actions: Vec<i64> = valid.iter().map(|transition| transition.action as i64).collect();
        let rewards: Vec<f32> = valid.iter().map(|transition| transition.reward).collect();
        let dones = valid.iter().map(|transition| transition.done).collect();

        Ok(TransitionBatch {
            observations: ObservationBatch(SensorFrame::concat(observations, 0, 0)),
            actions: Tensor::<B, 1, Int>::from_data(TensorData::new(actions, [n]), &self.device),
            rewards: Tensor::from_data(TensorData::new(rewards, [n]), &self.device),
            next_observations: ObservationBatch(SensorFrame::concat(next_observations, 0, 0)),
            dones,
            rejected,
        })
    }

    fn check_transition(
        &self,
        transition: &Transition<B>,
        action_count: usize,
    ) -> std::result::Result<(), String> {
        if transition.action >= action_count {
            return Err(format!(
                "action {} outside 0..{}",
                transition.action, action_count
            ));
        }
        if !transition.reward.is_finite() {
            return Err(format!("non-finite reward {}", transition.reward));
        }
        self.check_window(&transition.observation)
            .map_err(|reason| format!("observation: {}", reason))?;
        self.check_window(&transition.next_observation)
            .map_err(|reason| format!("next observation: {}", reason))
    }

    /// A stored window must hold one sample with exactly the sensor layout's modalities at double width
    fn check_window(&self, window: &WindowedObservation<B>) -> std::result::Result<(), String> {
        let expected = self.spec.active_modalities();
        let present = window.modalities();
        if present != expected {
            return Err(format!(
                "modalities {:?}, expected {:?}",
                present, expected
            ));
        }

        if window.batch_size() != 1 {
            return Err(format!("batch size {}, expected 1", window.batch_size()));
        }

        for modality in expected {
            let expected_width = self.spec.width(modality).map(|width| 2 * width);
            let width = window.feature_width(modality);
            if width != expected_width {
                return Err(format!(
                    "{} width {:?}, expected {:?}",
                    modality.name(),
                    width,
                    expected_width
                ));
            }
        }

        if let (Some(shape), Some(pixels)) = (self.spec.vision(), window.vision.as_ref()) {
            let [_, _, height, width] = pixels.dims();
            if height != shape.height || width != shape.width {
                return Err(format!(
                    "vision frame {}x{}, expected {}x{}",
                    height, width, shape.height, shape.width
                ));
            }
        }

        Ok(())
    }
}
