//! World configuration and validation.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Tunable parameters for a world.
///
/// Geometry fields fix the grid and camera; the remaining fields are the
/// gameplay constants shared by every species policy. `Default` holds the
/// standard level values; [`WorldConfig::validate`] rejects inconsistent
/// combinations before any world state is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Edge length of one square tile, in pixels.
    pub tile_size: u32,
    /// Grid width in tiles.
    pub grid_width: u32,
    /// Grid height in tiles.
    pub grid_height: u32,
    /// Camera window width in pixels.
    pub window_width: u32,
    /// Camera window height in pixels.
    pub window_height: u32,
    /// Tile whose occupation by the player wins the game.
    pub target_tile: (u32, u32),
    /// Seed for the world RNG; `None` draws one from entropy.
    pub rng_seed: Option<u64>,
    /// Gravitational acceleration in m/s², negative is downward.
    pub gravity: f64,
    /// Meters represented by one pixel.
    pub meters_per_pixel: f64,
    /// Exclusive upper bound on a single `advance_time` step, in seconds.
    pub max_step: f64,
    /// Hit points exchanged on player/enemy perimeter contact.
    pub contact_damage: u32,
    /// Hit points the player gains from a stationary friendly.
    pub plant_heal: u32,
    /// Hit points lost per water interval.
    pub water_damage: u32,
    /// Hit points lost per magma interval (first application immediate).
    pub magma_damage: u32,
    /// Hit points a swimmer loses per interval spent out of water.
    pub swimmer_air_damage: u32,
    /// Hit points a crawler loses when pressed against a swimmer.
    pub crawler_clash_damage: u32,
    /// Hit points a swimmer loses when pressed against a crawler.
    pub swimmer_clash_damage: u32,
    /// Accumulator period for terrain contact damage, in seconds.
    pub terrain_damage_interval: f64,
    /// Length of the invulnerability window after contact damage, in seconds.
    pub untouchable_window: f64,
    /// Time a dead body lingers motionless before removal, in seconds.
    pub death_grace: f64,
    /// Maximum number of bodies attached to one world.
    pub body_cap: usize,
    /// Maximum number of live swarms in one world.
    pub swarm_cap: usize,
    /// Minimum distance kept between the player and each window edge.
    pub window_margin: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tile_size: 64,
            grid_width: 64,
            grid_height: 16,
            window_width: 1024,
            window_height: 768,
            target_tile: (60, 2),
            rng_seed: None,
            gravity: -10.0,
            meters_per_pixel: 0.01,
            max_step: 0.2,
            contact_damage: 50,
            plant_heal: 50,
            water_damage: 2,
            magma_damage: 50,
            swimmer_air_damage: 6,
            crawler_clash_damage: 30,
            swimmer_clash_damage: 50,
            terrain_damage_interval: 0.2,
            untouchable_window: 0.6,
            death_grace: 0.6,
            body_cap: 100,
            swarm_cap: 10,
            window_margin: 200,
        }
    }
}

impl WorldConfig {
    /// World width in pixels.
    #[must_use]
    pub const fn pixel_width(&self) -> i64 {
        self.grid_width as i64 * self.tile_size as i64
    }

    /// World height in pixels.
    #[must_use]
    pub const fn pixel_height(&self) -> i64 {
        self.grid_height as i64 * self.tile_size as i64
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.tile_size == 0 {
            return Err(WorldError::InvalidConfig("tile_size must be non-zero"));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(WorldError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(WorldError::InvalidConfig(
                "window dimensions must be non-zero",
            ));
        }
        if i64::from(self.window_width) > self.pixel_width()
            || i64::from(self.window_height) > self.pixel_height()
        {
            return Err(WorldError::InvalidConfig(
                "window must fit inside the world",
            ));
        }
        if self.target_tile.0 >= self.grid_width || self.target_tile.1 >= self.grid_height {
            return Err(WorldError::InvalidConfig(
                "target tile must lie inside the grid",
            ));
        }
        if !self.meters_per_pixel.is_finite() || self.meters_per_pixel <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "meters_per_pixel must be positive",
            ));
        }
        if !self.max_step.is_finite() || self.max_step <= 0.0 {
            return Err(WorldError::InvalidConfig("max_step must be positive"));
        }
        if !self.gravity.is_finite() || self.gravity > 0.0 {
            return Err(WorldError::InvalidConfig(
                "gravity must be finite and non-positive",
            ));
        }
        if !self.terrain_damage_interval.is_finite() || self.terrain_damage_interval <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "terrain_damage_interval must be positive",
            ));
        }
        if !self.untouchable_window.is_finite() || self.untouchable_window < 0.0 {
            return Err(WorldError::InvalidConfig(
                "untouchable_window must be non-negative",
            ));
        }
        if !self.death_grace.is_finite() || self.death_grace < 0.0 {
            return Err(WorldError::InvalidConfig(
                "death_grace must be non-negative",
            ));
        }
        if self.body_cap == 0 {
            return Err(WorldError::InvalidConfig("body_cap must be non-zero"));
        }
        Ok(())
    }

    /// RNG seeded from the configuration, drawing from entropy when no seed
    /// is pinned.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        WorldConfig::default()
            .validate()
            .expect("default configuration must be coherent");
    }

    #[test]
    fn oversized_window_is_rejected() {
        let config = WorldConfig {
            window_width: 64 * 64 + 1,
            ..WorldConfig::default()
        };
        let err = config.validate().expect_err("window wider than the world");
        assert!(matches!(err, WorldError::InvalidConfig(_)));
    }

    #[test]
    fn target_tile_must_be_inside_the_grid() {
        let config = WorldConfig {
            target_tile: (64, 0),
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn positive_gravity_is_rejected() {
        let config = WorldConfig {
            gravity: 3.0,
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn pinned_seed_yields_reproducible_rng() {
        use rand::RngCore;
        let config = WorldConfig {
            rng_seed: Some(7),
            ..WorldConfig::default()
        };
        let mut a = config.seeded_rng();
        let mut b = config.seeded_rng();
        assert_eq!(a.next_u64(), b.next_u64());
    }
}
