//! Core simulation state for the Tidepool platform world.

use serde::{Deserialize, Serialize};

mod body;
mod config;
mod error;
mod species;
mod swarm;
mod terrain;
mod world;

pub use body::{Body, BodyArena, BodyId, BodyMap, BodySpec, Sprite};
pub use config::WorldConfig;
pub use error::WorldError;
pub use species::{Species, SpeciesTraits};
pub use swarm::{Swarm, SwarmId};
pub use terrain::{Feature, FeaturePresence, TerrainGrid};
pub use world::{Phase, TickEvents, World};

/// Monotonic simulation tick counter.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Tick zero, before any time has advanced.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The following tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Cardinal direction for steering commands and facing.
///
/// Only the horizontal pair drives movement; the vertical pair exists for
/// facing and is rejected by the move operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Sign of the horizontal component, zero for the vertical pair.
    #[must_use]
    pub const fn sign_x(self) -> f64 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
            Self::Up | Self::Down => 0.0,
        }
    }

    /// Whether the direction is `Left` or `Right`.
    #[must_use]
    pub const fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }
}
