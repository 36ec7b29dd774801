//! Species tags, per-species constants, and autonomous action scheduling.

use rand::{Rng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::Direction;

/// Closed set of body species.
///
/// `Player` and `Mimic` share one parameterized implementation of the player
/// policies and differ only in their trait table; the remaining species are
/// autonomous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    /// The driver-steered body, pinned at registry index 0.
    Player,
    /// Second steerable body with the player's policies and its own balance.
    Mimic,
    /// Enemy crawler; lives in a swarm and wanders in timed spells.
    Slime,
    /// Enemy swimmer; native to water, dives and occasionally jumps.
    Shark,
    /// Stationary friendly with a single hit point.
    Plant,
}

impl Species {
    /// All species in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Player,
        Self::Mimic,
        Self::Slime,
        Self::Shark,
        Self::Plant,
    ];

    /// Constant table for the species.
    #[must_use]
    pub const fn traits(self) -> &'static SpeciesTraits {
        match self {
            Self::Player => &PLAYER_TRAITS,
            Self::Mimic => &MIMIC_TRAITS,
            Self::Slime => &SLIME_TRAITS,
            Self::Shark => &SHARK_TRAITS,
            Self::Plant => &PLANT_TRAITS,
        }
    }

    /// True for the two steerable species sharing the player policies.
    #[must_use]
    pub const fn is_player_family(self) -> bool {
        matches!(self, Self::Player | Self::Mimic)
    }
}

/// Constants governing one species' kinematics, durability, and policy
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesTraits {
    /// Horizontal speed taken up the instant movement starts, in m/s.
    pub initial_speed: f64,
    /// Horizontal speed ceiling, in m/s.
    pub max_speed: f64,
    /// Horizontal speed ceiling while ducking, in m/s.
    pub duck_speed_cap: f64,
    /// Horizontal acceleration while moving, in m/s².
    pub horizontal_accel: f64,
    /// Initial vertical velocity of a jump, in m/s.
    pub jump_velocity: f64,
    /// Magnitude of the submerged vertical steering acceleration, in m/s².
    pub dive_accel: f64,
    /// Hit points a freshly built body starts with.
    pub starting_hit_points: u32,
    /// Hit-point ceiling.
    pub max_hit_points: u32,
    /// Whether the species can duck.
    pub can_duck: bool,
    /// Whether driver steering commands are accepted.
    pub steerable: bool,
    /// Whether the species lives in swarms.
    pub swarming: bool,
    /// Whether the species is native to water (no water damage, gravity
    /// suspended while submerged, air exposure damages instead).
    pub aquatic: bool,
    /// Whether gravity applies at all.
    pub gravity_bound: bool,
    /// Whether "airborne" is derived from position/velocity instead of the
    /// recomputed rest-on-ground flag.
    pub derived_airborne: bool,
    /// Whether water contact damages the species.
    pub water_susceptible: bool,
    /// Whether magma contact damages the species.
    pub magma_susceptible: bool,
}

const PLAYER_TRAITS: SpeciesTraits = SpeciesTraits {
    initial_speed: 1.0,
    max_speed: 3.0,
    duck_speed_cap: 1.0,
    horizontal_accel: 0.9,
    jump_velocity: 8.0,
    dive_accel: 0.0,
    starting_hit_points: 100,
    max_hit_points: 500,
    can_duck: true,
    steerable: true,
    swarming: false,
    aquatic: false,
    gravity_bound: true,
    derived_airborne: true,
    water_susceptible: true,
    magma_susceptible: true,
};

const MIMIC_TRAITS: SpeciesTraits = SpeciesTraits {
    starting_hit_points: 500,
    ..PLAYER_TRAITS
};

const SLIME_TRAITS: SpeciesTraits = SpeciesTraits {
    initial_speed: 0.0,
    max_speed: 2.5,
    duck_speed_cap: 2.5,
    horizontal_accel: 0.7,
    jump_velocity: 0.0,
    dive_accel: 0.0,
    starting_hit_points: 100,
    max_hit_points: 100,
    can_duck: false,
    steerable: false,
    swarming: true,
    aquatic: false,
    gravity_bound: true,
    derived_airborne: false,
    water_susceptible: true,
    magma_susceptible: true,
};

const SHARK_TRAITS: SpeciesTraits = SpeciesTraits {
    initial_speed: 0.0,
    max_speed: 4.0,
    duck_speed_cap: 4.0,
    horizontal_accel: 1.5,
    jump_velocity: 2.0,
    dive_accel: 0.2,
    starting_hit_points: 100,
    max_hit_points: 100,
    can_duck: false,
    steerable: false,
    swarming: false,
    aquatic: true,
    gravity_bound: true,
    derived_airborne: false,
    water_susceptible: false,
    magma_susceptible: true,
};

const PLANT_TRAITS: SpeciesTraits = SpeciesTraits {
    initial_speed: 0.0,
    max_speed: 0.0,
    duck_speed_cap: 0.0,
    horizontal_accel: 0.0,
    jump_velocity: 0.0,
    dive_accel: 0.0,
    starting_hit_points: 1,
    max_hit_points: 1,
    can_duck: false,
    steerable: false,
    swarming: false,
    aquatic: false,
    gravity_bound: false,
    derived_airborne: false,
    water_susceptible: true,
    magma_susceptible: true,
};

/// One autonomous movement spell drawn for a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Spell {
    /// Seconds until the next spell is drawn.
    pub duration: f64,
    /// Horizontal heading for the spell.
    pub direction: Direction,
    /// Vertical steering acceleration applied while submerged, in m/s².
    pub dive: f64,
    /// Whether the spell opens with a jump.
    pub jump: bool,
}

/// Draw the next movement spell for an autonomous species.
///
/// `spell_index` counts spells already taken by the body; sharks jump on
/// every third spell. Species without autonomous movement return `None`.
pub(crate) fn draw_spell(species: Species, spell_index: u32, rng: &mut SmallRng) -> Option<Spell> {
    match species {
        Species::Slime => Some(Spell {
            duration: rng.gen_range(2.0..6.0),
            direction: coin_direction(rng),
            dive: 0.0,
            jump: false,
        }),
        Species::Shark => {
            let traits = species.traits();
            Some(Spell {
                duration: rng.gen_range(1.0..4.0),
                direction: coin_direction(rng),
                dive: rng.gen_range(-traits.dive_accel..=traits.dive_accel),
                jump: spell_index % 3 == 2,
            })
        }
        Species::Player | Species::Mimic | Species::Plant => None,
    }
}

fn coin_direction(rng: &mut SmallRng) -> Direction {
    if rng.gen_bool(0.5) {
        Direction::Right
    } else {
        Direction::Left
    }
}
