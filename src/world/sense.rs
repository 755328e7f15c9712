//! Sensor rendering for the homeostasis world

use std::f32::consts::TAU;

use super::config::WorldConfig;
use super::state::{Position, ResourceKind, WorldState};
use crate::rl::{Modality, RawSensorPayload, SensorSpec};

const BACKGROUND: [f32; 3] = [40.0, 40.0, 40.0];
const FOOD: [f32; 3] = [40.0, 200.0, 40.0];
const WATER: [f32; 3] = [40.0, 80.0, 220.0];
const AGENT: [f32; 3] = [220.0, 60.0, 40.0];
const FACING: [f32; 3] = [200.0, 200.0, 60.0];

/// Ambient temperature of a cell relative to the body setpoint
pub fn ambient_temperature(config: &WorldConfig, pos: Position) -> f32 {
    let span = (config.grid_size.max(2) - 1) as f32;
    config.thermal_range * (2.0 * pos.x as f32 / span - 1.0)
}

/// Neighbouring cell in the direction `angle` (radians, clockwise from north)
fn feeler(origin: Position, angle: f32) -> Position {
    origin.moved_by(angle.sin().round() as i32, (-angle.cos()).round() as i32)
}

/// Feeler angles spread evenly around the agent, starting straight ahead
fn feeler_angles(state: &WorldState, count: usize) -> impl Iterator<Item = f32> {
    let base = state.heading.angle();
    (0..count).map(move |k| base + TAU * k as f32 / count as f32)
}

/// Build the raw payload the agent perceives in `state`
pub fn render(state: &WorldState, spec: &SensorSpec, config: &WorldConfig) -> RawSensorPayload {
    let mut vector = Vec::with_capacity(spec.vector_len());

    for (modality, range) in spec.vector_layout() {
        let width = range.len();
        match modality {
            Modality::Ev => {
                vector.push(state.physiology.food);
                vector.push(state.physiology.water);
                if spec.uses(Modality::Thermal) {
                    vector.push(state.physiology.temperature);
                }
                if spec.uses(Modality::Collision) {
                    vector.push(state.physiology.damage);
                }
            }
            Modality::Olfactory => vector.extend(smell(state, width)),
            Modality::Thermal => vector.extend(
                feeler_angles(state, width).map(|angle| {
                    let mut cell = feeler(state.agent, angle);
                    if !state.is_in_bounds(cell) {
                        cell = state.agent;
                    }
                    ambient_temperature(config, cell) - state.physiology.temperature
                }),
            ),
            Modality::Collision => vector.extend(feeler_angles(state, width).map(|angle| {
                if state.is_in_bounds(feeler(state.agent, angle)) {
                    0.0
                } else {
                    1.0
                }
            })),
            Modality::Touch => {
                let touching = state.bumped
                    || state.resource_at(state.agent).is_some()
                    || state.resource_at(state.ahead()).is_some();
                vector.push(if touching { 1.0 } else { 0.0 });
            }
            Modality::Vision => {}
        }
    }

    let visual = spec.vision().map(|shape| {
        let mut pixels = Vec::with_capacity(shape.len());
        for py in 0..shape.height {
            for px in 0..shape.width {
                let cell = Position::new(
                    (px * state.grid_size / shape.width) as i32,
                    (py * state.grid_size / shape.height) as i32,
                );
                let color = cell_color(state, cell);
                pixels.extend((0..shape.channels).map(|c| color[c % 3]));
            }
        }
        pixels
    });

    RawSensorPayload::new(visual, vector)
}

fn cell_color(state: &WorldState, cell: Position) -> [f32; 3] {
    if cell == state.agent {
        return AGENT;
    }
    if let Some(index) = state.resource_at(cell) {
        return match state.resources[index].kind {
            ResourceKind::Food => FOOD,
            ResourceKind::Water => WATER,
        };
    }
    if cell == state.ahead() {
        return FACING;
    }
    BACKGROUND
}

/// Directional smell: each feature sums inverse-distance intensity of the
/// resources lying within 90° of its direction
fn smell(state: &WorldState, width: usize) -> Vec<f32> {
    feeler_angles(state, width)
        .map(|direction| {
            state
                .resources
                .iter()
                .map(|resource| {
                    let distance = state.agent.distance(resource.position);
                    if distance == 0.0 {
                        return 1.0;
                    }
                    let dx = (resource.position.x - state.agent.x) as f32;
                    let dy = (resource.position.y - state.agent.y) as f32;
                    let bearing = dx.atan2(-dy);
                    (bearing - direction).cos().max(0.0) / (1.0 + distance)
                })
                .sum()
        })
        .collect()
}
