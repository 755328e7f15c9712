use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{
    config::WorldConfig,
    sense::{ambient_temperature, render},
    state::{Heading, Physiology, Position, Resource, ResourceKind, WorldState},
};
use crate::error::{DqnError, Result};
use crate::rl::{ActionType, EnvStep, Modality, RawSensorPayload, SensorEnvironment, SensorSpec};

/// Actions the world understands: NONE, FORWARD, LEFT, RIGHT, EAT
pub const WORLD_ACTIONS: usize = 5;

/// Grid world in which an agent must keep its essential variables near their setpoints
///
/// Food and water deviations drift downwards every step and are restored by
/// eating at a matching resource (on the agent's cell or the one ahead).
/// Body temperature follows the ambient temperature of the current cell when
/// thermal sensing is on; bumping into the boundary causes damage when
/// collision sensing is on. The episode ends once any variable leaves the
/// viable range.
pub struct HomeostasisWorld {
    config: WorldConfig,
    sensors: SensorSpec,
    state: WorldState,
    rng: StdRng,
}

impl HomeostasisWorld {
    pub fn new(config: WorldConfig, sensors: SensorSpec) -> Result<Self> {
        config.validate().map_err(DqnError::InvalidConfig)?;
        sensors.validate()?;

        let rng = StdRng::seed_from_u64(config.seed);
        let state = WorldState {
            agent: Position::new(0, 0),
            heading: Heading::North,
            resources: Vec::new(),
            physiology: Physiology::default(),
            grid_size: config.grid_size,
            steps: 0,
            is_alive: true,
            bumped: false,
        };

        let mut world = Self {
            config,
            sensors,
            state,
            rng,
        };
        world.reset_state();
        Ok(world)
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current sensor readings
    pub fn observe(&self) -> RawSensorPayload {
        render(&self.state, &self.sensors, &self.config)
    }

    fn reset_state(&mut self) {
        let center = (self.config.grid_size / 2) as i32;
        self.state.agent = Position::new(center, center);
        self.state.heading = Heading::North;
        self.state.physiology = Physiology::default();
        self.state.steps = 0;
        self.state.is_alive = true;
        self.state.bumped = false;
        self.state.resources.clear();

        let kinds = std::iter::repeat(ResourceKind::Food)
            .take(self.config.food_sources)
            .chain(std::iter::repeat(ResourceKind::Water).take(self.config.water_sources));
        for kind in kinds {
            let position = self.free_cell();
            self.state.resources.push(Resource { position, kind });
        }
    }

    /// Random cell holding neither the agent nor a resource
    fn free_cell(&mut self) -> Position {
        loop {
            let x = self.rng.gen_range(0..self.config.grid_size) as i32;
            let y = self.rng.gen_range(0..self.config.grid_size) as i32;
            let pos = Position::new(x, y);

            if pos != self.state.agent && self.state.resource_at(pos).is_none() {
                return pos;
            }
        }
    }

    fn eat(&mut self) {
        let target = self
            .state
            .resource_at(self.state.agent)
            .or_else(|| self.state.resource_at(self.state.ahead()));

        if let Some(index) = target {
            let kind = self.state.resources[index].kind;
            match kind {
                ResourceKind::Food => self.state.physiology.food += self.config.intake,
                ResourceKind::Water => self.state.physiology.water += self.config.intake,
            }
            // Consumed resources regrow elsewhere
            self.state.resources.remove(index);
            let position = self.free_cell();
            self.state.resources.push(Resource { position, kind });
        }
    }

    fn metabolize(&mut self) {
        let physiology = &mut self.state.physiology;
        physiology.food -= self.config.metabolic_drift;
        physiology.water -= self.config.metabolic_drift;

        if self.sensors.uses(Modality::Thermal) {
            let ambient = ambient_temperature(&self.config, self.state.agent);
            physiology.temperature += (ambient - physiology.temperature) * self.config.thermal_coupling;
        }
        if self.sensors.uses(Modality::Collision) {
            if self.state.bumped {
                physiology.damage += self.config.bump_damage;
            }
            physiology.damage = (physiology.damage - self.config.healing).max(0.0);
        }
    }
}

impl SensorEnvironment for HomeostasisWorld {
    fn sensor_spec(&self) -> &SensorSpec {
        &self.sensors
    }

    fn action_count(&self) -> usize {
        WORLD_ACTIONS
    }

    fn reset(&mut self) -> RawSensorPayload {
        self.reset_state();
        self.observe()
    }

    fn step(&mut self, action: usize) -> EnvStep {
        if !self.state.is_alive {
            return EnvStep {
                payload: self.observe(),
                terminated: true,
            };
        }

        self.state.bumped = false;
        match ActionType::from_index(action) {
            Some(ActionType::Forward) => {
                let next = self.state.ahead();
                if self.state.is_in_bounds(next) {
                    self.state.agent = next;
                } else {
                    self.state.bumped = true;
                }
            }
            Some(ActionType::Left) => self.state.heading = self.state.heading.turned_left(),
            Some(ActionType::Right) => self.state.heading = self.state.heading.turned_right(),
            Some(ActionType::Eat) => self.eat(),
            // NONE and actions the world does not model
            _ => {}
        }

        self.metabolize();
        self.state.steps += 1;

        let terminated = self.state.physiology.max_deviation() > self.config.viable_limit;
        self.state.is_alive = !terminated;

        EnvStep {
            payload: self.observe(),
            terminated,
        }
    }
}
