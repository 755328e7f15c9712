use serde::{Deserialize, Serialize};

/// Configuration for the homeostasis grid world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Side length of the square grid
    pub grid_size: usize,
    /// Number of food sources on the grid
    pub food_sources: usize,
    /// Number of water sources on the grid
    pub water_sources: usize,

    // Physiology
    /// Amount food and water deviate per step
    pub metabolic_drift: f32,
    /// Amount eating restores
    pub intake: f32,
    /// Episode ends once any essential variable leaves `[-viable_limit, viable_limit]`
    pub viable_limit: f32,
    /// Fraction of the gap to the ambient temperature closed per step
    pub thermal_coupling: f32,
    /// Ambient temperature at the grid edges relative to the setpoint
    pub thermal_range: f32,
    /// Damage taken when bumping into the boundary
    pub bump_damage: f32,
    /// Damage healed per step
    pub healing: f32,

    /// Seed for resource placement
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_size: 12,
            food_sources: 4,
            water_sources: 4,
            metabolic_drift: 0.05,
            intake: 3.0,
            viable_limit: 15.0,
            thermal_coupling: 0.1,
            thermal_range: 10.0,
            bump_damage: 2.0,
            healing: 0.02,
            seed: 0,
        }
    }
}

impl WorldConfig {
    /// Create a configuration with a custom grid size
    pub fn new(grid_size: usize) -> Self {
        Self {
            grid_size,
            ..Default::default()
        }
    }

    /// Small grid for tests
    pub fn small() -> Self {
        Self::new(6)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.grid_size < 3 {
            return Err(format!("grid_size must be at least 3, got {}", self.grid_size));
        }
        let cells = self.grid_size * self.grid_size;
        if self.food_sources + self.water_sources >= cells {
            return Err(format!(
                "{} resources do not fit on a {}x{} grid",
                self.food_sources + self.water_sources,
                self.grid_size,
                self.grid_size
            ));
        }
        if self.viable_limit <= 0.0 {
            return Err(format!(
                "viable_limit must be positive, got {}",
                self.viable_limit
            ));
        }
        Ok(())
    }
}
