//! Sensor modalities and the static sensor layout of an environment
//!
//! A [`SensorSpec`] records which modalities the environment exposes and how
//! wide each one is. It is built once from [`EnvironmentParams`] and shared by
//! the observation assembler, the Q-network and the checkpoint metadata, so
//! that every stage agrees on the same layout.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{DqnError, Result};

/// A single sensor modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Essential variables (interoceptive state)
    Ev,
    Vision,
    Olfactory,
    Thermal,
    Touch,
    Collision,
}

impl Modality {
    /// Order in which branch outputs are concatenated before fusion
    pub const FUSION_ORDER: [Modality; 6] = [
        Modality::Ev,
        Modality::Vision,
        Modality::Olfactory,
        Modality::Thermal,
        Modality::Touch,
        Modality::Collision,
    ];

    /// Optional vector-valued exteroceptive sensors, in fusion order
    pub const VECTOR_SENSORS: [Modality; 4] = [
        Modality::Olfactory,
        Modality::Thermal,
        Modality::Touch,
        Modality::Collision,
    ];

    /// Order in which vector sensors appear in the raw vector channel
    pub const PAYLOAD_ORDER: [Modality; 5] = [
        Modality::Ev,
        Modality::Olfactory,
        Modality::Thermal,
        Modality::Collision,
        Modality::Touch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Modality::Ev => "ev",
            Modality::Vision => "vision",
            Modality::Olfactory => "olfactory",
            Modality::Thermal => "thermal",
            Modality::Touch => "touch",
            Modality::Collision => "collision",
        }
    }
}

/// Shape of a single visual frame as delivered by the environment (`[H, W, C]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl VisionShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of scalar values in one frame
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VisionShape {
    fn default() -> Self {
        Self::new(64, 64, 3)
    }
}

/// Active sensor modalities and their single-step feature widths
///
/// `None` means the modality is switched off. The essential-variable width is
/// derived: two base variables (food, water) plus one for body temperature when
/// thermal sensing is on and one for damage when collision sensing is on.
///
/// # Example
///
/// ```rust
/// use interoceptive_dqn::rl::{Modality, SensorSpec};
///
/// let spec = SensorSpec::new().with_olfactory(10).with_thermal(8);
/// assert_eq!(spec.ev_width(), 3);
/// assert_eq!(spec.width(Modality::Olfactory), Some(10));
/// assert_eq!(spec.vector_len(), 3 + 10 + 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorSpec {
    vision: Option<VisionShape>,
    olfactory: Option<usize>,
    thermal: Option<usize>,
    touch: Option<usize>,
    collision: Option<usize>,
}

impl SensorSpec {
    /// Spec with only the essential variables active
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision(mut self, shape: VisionShape) -> Self {
        self.vision = Some(shape);
        self
    }

    pub fn with_olfactory(mut self, width: usize) -> Self {
        self.olfactory = Some(width);
        self
    }

    pub fn with_thermal(mut self, width: usize) -> Self {
        self.thermal = Some(width);
        self
    }

    /// Touch is a single scalar per step.
    pub fn with_touch(mut self) -> Self {
        self.touch = Some(1);
        self
    }

    pub fn with_collision(mut self, width: usize) -> Self {
        self.collision = Some(width);
        self
    }

    /// Build a spec from the simulator's environment parameters
    pub fn from_params(params: &EnvironmentParams) -> Result<Self> {
        let mut spec = Self::new();

        if params.visual_sensor.use_visual {
            spec = spec.with_vision(VisionShape::new(
                params.visual_sensor.visual_height,
                params.visual_sensor.visual_width,
                params.visual_sensor.visual_channels,
            ));
        }
        if params.olfactory_sensor.use_olfactory {
            spec = spec.with_olfactory(params.olfactory_sensor.olfactory_feature_size);
        }
        if params.thermo_sensor.use_thermo {
            spec = spec.with_thermal(params.thermo_sensor.thermo_sensor_size);
        }
        if params.collision_sensor.use_collision {
            spec = spec.with_collision(params.collision_sensor.collision_feature_size);
        }
        if params.touch_sensor.use_touch_obs {
            spec = spec.with_touch();
        }

        spec.validate()?;
        Ok(spec)
    }

    /// Reject active modalities with a zero width
    pub fn validate(&self) -> Result<()> {
        if let Some(shape) = self.vision {
            if shape.is_empty() {
                return Err(DqnError::InvalidConfig(format!(
                    "vision frame must be non-empty, got {}x{}x{}",
                    shape.height, shape.width, shape.channels
                )));
            }
        }
        for modality in Modality::VECTOR_SENSORS {
            if self.width(modality) == Some(0) {
                return Err(DqnError::InvalidConfig(format!(
                    "{} sensor is active with zero width",
                    modality.name()
                )));
            }
        }
        Ok(())
    }

    pub fn ev_width(&self) -> usize {
        2 + usize::from(self.thermal.is_some()) + usize::from(self.collision.is_some())
    }

    pub fn vision(&self) -> Option<VisionShape> {
        self.vision
    }

    /// Whether a modality is active
    pub fn uses(&self, modality: Modality) -> bool {
        match modality {
            Modality::Ev => true,
            Modality::Vision => self.vision.is_some(),
            other => self.width(other).is_some(),
        }
    }

    /// Single-step feature width of a modality
    ///
    /// For vision this is the channel count of one frame.
    pub fn width(&self, modality: Modality) -> Option<usize> {
        match modality {
            Modality::Ev => Some(self.ev_width()),
            Modality::Vision => self.vision.map(|shape| shape.channels),
            Modality::Olfactory => self.olfactory,
            Modality::Thermal => self.thermal,
            Modality::Touch => self.touch,
            Modality::Collision => self.collision,
        }
    }

    /// Active modalities in fusion order
    pub fn active_modalities(&self) -> Vec<Modality> {
        Modality::FUSION_ORDER
            .into_iter()
            .filter(|modality| self.uses(*modality))
            .collect()
    }

    /// Offsets of each active vector modality within the raw vector channel
    pub fn vector_layout(&self) -> Vec<(Modality, Range<usize>)> {
        let mut offset = 0;
        Modality::PAYLOAD_ORDER
            .into_iter()
            .filter_map(|modality| {
                let width = self.width(modality)?;
                let range = offset..offset + width;
                offset += width;
                Some((modality, range))
            })
            .collect()
    }

    /// Minimum length of the raw vector channel
    pub fn vector_len(&self) -> usize {
        self.vector_layout()
            .last()
            .map(|(_, range)| range.end)
            .unwrap_or(0)
    }
}

/// Sensor section of the simulator's environment parameters
///
/// Field names follow the simulator's JSON layout (camelCase).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentParams {
    pub visual_sensor: VisualSensorParams,
    pub olfactory_sensor: OlfactorySensorParams,
    pub thermo_sensor: ThermoSensorParams,
    pub collision_sensor: CollisionSensorParams,
    pub touch_sensor: TouchSensorParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualSensorParams {
    pub use_visual: bool,
    #[serde(alias = "visualHight")]
    pub visual_height: usize,
    pub visual_width: usize,
    pub visual_channels: usize,
}

impl Default for VisualSensorParams {
    fn default() -> Self {
        let shape = VisionShape::default();
        Self {
            use_visual: false,
            visual_height: shape.height,
            visual_width: shape.width,
            visual_channels: shape.channels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OlfactorySensorParams {
    pub use_olfactory: bool,
    pub olfactory_feature_size: usize,
}

impl Default for OlfactorySensorParams {
    fn default() -> Self {
        Self {
            use_olfactory: false,
            olfactory_feature_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThermoSensorParams {
    pub use_thermo: bool,
    pub thermo_sensor_size: usize,
}

impl Default for ThermoSensorParams {
    fn default() -> Self {
        Self {
            use_thermo: false,
            thermo_sensor_size: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollisionSensorParams {
    pub use_collision: bool,
    pub collision_feature_size: usize,
}

impl Default for CollisionSensorParams {
    fn default() -> Self {
        Self {
            use_collision: false,
            collision_feature_size: 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TouchSensorParams {
    pub use_touch_obs: bool,
}
