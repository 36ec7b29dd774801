//! Body state, validated construction, and the ordered body registry.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use tidepool_geom::PixelRect;

use crate::{Direction, error::WorldError, species::Species};

new_key_type! {
    /// Stable handle for bodies backed by a generational slot map.
    pub struct BodyId;
}

/// Secondary storage keyed by body handles.
pub type BodyMap<T> = SecondaryMap<BodyId, T>;

/// Footprint extents of one animation frame, in pixels.
///
/// The pixel art itself lives outside the core; the simulation only needs
/// each frame's width and height. Frame 0 is the standing footprint; for
/// species that duck, frame 1 is the ducked footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sprite {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Sprite {
    /// Create a frame footprint.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Index of the standing footprint in a body's sprite array.
pub(crate) const STAND_SPRITE: usize = 0;
/// Index of the ducked footprint for species that duck.
pub(crate) const DUCK_SPRITE: usize = 1;

/// Validated recipe for one body.
///
/// `new` fills every bound from the species trait table; callers override
/// individual fields before [`BodySpec::build`], which rejects inconsistent
/// combinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodySpec {
    /// Species tag selecting the behavior policies.
    pub species: Species,
    /// Bottom-left pixel column of the starting position.
    pub left: i64,
    /// Bottom-left pixel row of the starting position.
    pub bottom: i64,
    /// Frame footprints; must not be empty.
    pub sprites: Vec<Sprite>,
    /// Lower bound of the moving-speed band, in m/s.
    pub initial_speed: f64,
    /// Upper bound of the moving-speed band, in m/s.
    pub max_speed: f64,
    /// Whether the body starts ducked.
    pub ducking: bool,
    /// Starting hit points.
    pub hit_points: u32,
    /// Hit-point ceiling.
    pub max_hit_points: u32,
}

impl BodySpec {
    /// Recipe with every bound taken from the species trait table.
    #[must_use]
    pub fn new(species: Species, left: i64, bottom: i64, sprites: Vec<Sprite>) -> Self {
        let traits = species.traits();
        Self {
            species,
            left,
            bottom,
            sprites,
            initial_speed: traits.initial_speed,
            max_speed: traits.max_speed,
            ducking: false,
            hit_points: traits.starting_hit_points,
            max_hit_points: traits.max_hit_points,
        }
    }

    /// Validate the recipe and produce an inert body.
    ///
    /// The body carries no world position authority yet; attachment checks
    /// its placement against terrain.
    pub fn build(self) -> Result<Body, WorldError> {
        let traits = self.species.traits();
        if self.sprites.is_empty() {
            return Err(WorldError::InvalidConfig("body needs at least one sprite"));
        }
        if self
            .sprites
            .iter()
            .any(|sprite| sprite.width < 3 || sprite.height < 3)
        {
            return Err(WorldError::InvalidConfig(
                "sprite footprints must be at least 3x3 pixels",
            ));
        }
        if traits.can_duck && self.sprites.len() < 2 {
            return Err(WorldError::InvalidConfig(
                "ducking species need a ducked footprint at sprite index 1",
            ));
        }
        if self.ducking && !traits.can_duck {
            return Err(WorldError::InvalidConfig("species cannot duck"));
        }
        if !self.max_speed.is_finite() || self.max_speed < 0.0 {
            return Err(WorldError::InvalidVelocity {
                speed: self.max_speed,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if !self.initial_speed.is_finite()
            || self.initial_speed < 0.0
            || self.initial_speed > self.max_speed
        {
            return Err(WorldError::InvalidVelocity {
                speed: self.initial_speed,
                min: 0.0,
                max: self.max_speed,
            });
        }
        if self.max_hit_points == 0 {
            return Err(WorldError::InvalidConfig(
                "max hit points must be non-zero",
            ));
        }
        if self.hit_points > self.max_hit_points {
            return Err(WorldError::InvalidConfig(
                "hit points exceed the configured ceiling",
            ));
        }
        let sprite_index = if self.ducking { DUCK_SPRITE } else { STAND_SPRITE };
        Ok(Body {
            species: self.species,
            x: self.left as f64,
            y: self.bottom as f64,
            vx: 0.0,
            vy: 0.0,
            ax: 0.0,
            ay: 0.0,
            facing: Direction::Right,
            active_move: None,
            ducking: self.ducking,
            wants_stand: false,
            grounded: false,
            hit_points: self.hit_points,
            max_hit_points: self.max_hit_points,
            initial_speed: self.initial_speed,
            max_speed: self.max_speed,
            immune_for: 0.0,
            water_timer: 0.0,
            magma_timer: 0.0,
            in_magma: false,
            air_timer: 0.0,
            since_action_start: 0.0,
            since_action_end: 0.0,
            death_timer: 0.0,
            sprites: self.sprites,
            sprite_index,
            dive_accel: 0.0,
            spell_timer: 0.0,
            spell_index: 0,
        })
    }
}

/// One kinematic entity in the world.
///
/// Position is continuous in pixels and truncated to whole pixels for every
/// geometric purpose; velocities and accelerations are in meters per second
/// and per second squared. Fields are crate-visible so the world's
/// integrator can drive them; external callers go through the world's
/// validated mutators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub(crate) species: Species,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) vx: f64,
    pub(crate) vy: f64,
    pub(crate) ax: f64,
    pub(crate) ay: f64,
    pub(crate) facing: Direction,
    pub(crate) active_move: Option<Direction>,
    pub(crate) ducking: bool,
    pub(crate) wants_stand: bool,
    pub(crate) grounded: bool,
    pub(crate) hit_points: u32,
    pub(crate) max_hit_points: u32,
    pub(crate) initial_speed: f64,
    pub(crate) max_speed: f64,
    pub(crate) immune_for: f64,
    pub(crate) water_timer: f64,
    pub(crate) magma_timer: f64,
    pub(crate) in_magma: bool,
    pub(crate) air_timer: f64,
    pub(crate) since_action_start: f64,
    pub(crate) since_action_end: f64,
    pub(crate) death_timer: f64,
    pub(crate) sprites: Vec<Sprite>,
    pub(crate) sprite_index: usize,
    pub(crate) dive_accel: f64,
    pub(crate) spell_timer: f64,
    pub(crate) spell_index: u32,
}

impl Body {
    /// Species tag of the body.
    #[must_use]
    pub const fn species(&self) -> Species {
        self.species
    }

    /// Truncated pixel position of the bottom-left corner.
    #[must_use]
    pub fn pixel_position(&self) -> (i64, i64) {
        (self.x.floor() as i64, self.y.floor() as i64)
    }

    /// Current velocity `(vx, vy)` in m/s.
    #[must_use]
    pub const fn velocity(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    /// Current acceleration `(ax, ay)` in m/s².
    #[must_use]
    pub const fn acceleration(&self) -> (f64, f64) {
        (self.ax, self.ay)
    }

    /// Facing direction.
    #[must_use]
    pub const fn facing(&self) -> Direction {
        self.facing
    }

    /// Whether the body is currently ducked.
    #[must_use]
    pub const fn is_ducking(&self) -> bool {
        self.ducking
    }

    /// Current hit points.
    #[must_use]
    pub const fn hit_points(&self) -> u32 {
        self.hit_points
    }

    /// Hit-point ceiling.
    #[must_use]
    pub const fn max_hit_points(&self) -> u32 {
        self.max_hit_points
    }

    /// True while the body cannot receive contact damage.
    #[must_use]
    pub fn is_invulnerable(&self) -> bool {
        self.immune_for > 0.0
    }

    /// True once hit points reach zero.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.hit_points == 0
    }

    /// Footprint `(width, height)` of the current frame, in pixels.
    #[must_use]
    pub fn footprint(&self) -> (u32, u32) {
        let sprite = self.current_sprite();
        (sprite.width, sprite.height)
    }

    /// Seconds since the last steering action began.
    #[must_use]
    pub const fn time_since_action_start(&self) -> f64 {
        self.since_action_start
    }

    /// Seconds since the last steering action ended.
    #[must_use]
    pub const fn time_since_action_end(&self) -> f64 {
        self.since_action_end
    }

    /// Pixel rectangle occupied by the current frame.
    #[must_use]
    pub fn rect(&self) -> PixelRect {
        let (px, py) = self.pixel_position();
        let sprite = self.current_sprite();
        PixelRect::new(px, py, sprite.width, sprite.height)
    }

    pub(crate) fn current_sprite(&self) -> Sprite {
        self.sprites[self.sprite_index.min(self.sprites.len() - 1)]
    }

    pub(crate) fn standing_sprite(&self) -> Sprite {
        self.sprites[STAND_SPRITE]
    }

    /// Plain hit-point loss, saturating at zero; does not touch immunity.
    pub(crate) fn lose_hit_points(&mut self, amount: u32) {
        self.hit_points = self.hit_points.saturating_sub(amount);
    }

    /// Hit-point gain capped at the ceiling.
    pub(crate) fn gain_hit_points(&mut self, amount: u32) {
        self.hit_points = (self.hit_points + amount).min(self.max_hit_points);
    }

    /// Contact-damage channel: ignored while the invulnerability window is
    /// open, otherwise applies the loss and restarts the window.
    ///
    /// Returns whether the loss was applied.
    pub(crate) fn receive_contact_damage(&mut self, amount: u32, window: f64) -> bool {
        if self.immune_for > 0.0 {
            return false;
        }
        self.lose_hit_points(amount);
        self.immune_for = window;
        true
    }

    /// Horizontal speed ceiling under the current duck state.
    pub(crate) fn speed_ceiling(&self) -> f64 {
        let traits = self.species.traits();
        if self.ducking {
            traits.duck_speed_cap.min(self.max_speed)
        } else {
            self.max_speed
        }
    }

    /// Begin a horizontal move; a repeat in the same direction is a no-op.
    pub(crate) fn start_move_now(&mut self, direction: Direction) {
        if self.active_move == Some(direction) {
            return;
        }
        let traits = self.species.traits();
        let sign = direction.sign_x();
        self.facing = direction;
        self.active_move = Some(direction);
        self.vx = sign * self.initial_speed.min(self.speed_ceiling());
        self.ax = if self.ducking {
            0.0
        } else {
            sign * traits.horizontal_accel
        };
        self.since_action_start = 0.0;
    }

    /// End a horizontal move if it matches the active direction.
    pub(crate) fn end_move_now(&mut self, direction: Direction) {
        if self.active_move != Some(direction) {
            return;
        }
        self.active_move = None;
        self.vx = 0.0;
        self.ax = 0.0;
        self.since_action_end = 0.0;
    }

    /// Open a jump from rest; airborne bodies ignore the request.
    pub(crate) fn start_jump_now(&mut self, airborne: bool) {
        if airborne {
            return;
        }
        self.vy = self.species.traits().jump_velocity;
        self.since_action_start = 0.0;
    }

    /// Cut a rising jump short.
    pub(crate) fn end_jump_now(&mut self) {
        if self.vy > 0.0 {
            self.vy = 0.0;
            self.since_action_end = 0.0;
        }
    }

    /// Duck immediately: shorter footprint, zero acceleration, capped speed.
    pub(crate) fn start_duck_now(&mut self) {
        if self.ducking {
            return;
        }
        self.ducking = true;
        self.wants_stand = false;
        self.sprite_index = DUCK_SPRITE;
        let cap = self.speed_ceiling();
        self.vx = self.vx.clamp(-cap, cap);
        self.ax = 0.0;
        self.since_action_start = 0.0;
    }

    /// Restore the standing footprint; the integrator verified clearance.
    pub(crate) fn stand_up_now(&mut self) {
        self.ducking = false;
        self.wants_stand = false;
        self.sprite_index = STAND_SPRITE;
        if let Some(direction) = self.active_move {
            self.ax = direction.sign_x() * self.species.traits().horizontal_accel;
        }
        self.since_action_end = 0.0;
    }
}

/// Ordered body registry with stable generational handles.
///
/// Iteration order is attachment order with the active player pinned at
/// index 0; removal preserves the order of the remaining bodies because scan
/// order is an observable guarantee of the simulation.
#[derive(Debug, Default)]
pub struct BodyArena {
    slots: SlotMap<BodyId, usize>,
    handles: Vec<BodyId>,
    rows: Vec<Body>,
}

impl BodyArena {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            handles: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Number of bodies in the registry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no bodies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True if `id` refers to a registered body.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        self.slots.contains_key(id)
    }

    /// Registry index of `id`, if present.
    #[must_use]
    pub fn index_of(&self, id: BodyId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Handles in registry order.
    #[must_use]
    pub fn handles(&self) -> &[BodyId] {
        &self.handles
    }

    /// Iterate over handles in registry order.
    pub fn iter_handles(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.handles.iter().copied()
    }

    /// Iterate over `(handle, body)` pairs in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &Body)> + '_ {
        self.handles.iter().copied().zip(self.rows.iter())
    }

    /// Borrow the body for `id`.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.index_of(id).map(|index| &self.rows[index])
    }

    /// Mutably borrow the body for `id`.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        let index = self.index_of(id)?;
        Some(&mut self.rows[index])
    }

    /// Mutably borrow two distinct bodies at once.
    pub fn pair_mut(&mut self, a: BodyId, b: BodyId) -> Option<(&mut Body, &mut Body)> {
        if a == b {
            return None;
        }
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        if ia < ib {
            let (low, high) = self.rows.split_at_mut(ib);
            Some((&mut low[ia], &mut high[0]))
        } else {
            let (low, high) = self.rows.split_at_mut(ia);
            Some((&mut high[0], &mut low[ib]))
        }
    }

    /// Append a body at the end of the registry.
    pub fn push(&mut self, body: Body) -> BodyId {
        let index = self.rows.len();
        self.rows.push(body);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Insert a body at registry index 0, shifting the rest.
    pub fn insert_front(&mut self, body: Body) -> BodyId {
        for index in self.slots.values_mut() {
            *index += 1;
        }
        self.rows.insert(0, body);
        let id = self.slots.insert(0);
        self.handles.insert(0, id);
        id
    }

    /// Remove `id`, preserving the order of the remaining bodies.
    pub fn remove(&mut self, id: BodyId) -> Option<Body> {
        let index = self.slots.remove(id)?;
        let body = self.rows.remove(index);
        let handle = self.handles.remove(index);
        debug_assert_eq!(handle, id);
        for slot in self.slots.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec(species: Species) -> BodySpec {
        let sprites = if species.traits().can_duck {
            vec![Sprite::new(60, 80), Sprite::new(60, 40)]
        } else {
            vec![Sprite::new(50, 30)]
        };
        BodySpec::new(species, 128, 64, sprites)
    }

    #[test]
    fn build_fills_bounds_from_the_trait_table() {
        let body = sample_spec(Species::Player)
            .build()
            .expect("default player spec is valid");
        assert_eq!(body.hit_points(), 100);
        assert_eq!(body.max_hit_points(), 500);
        assert_eq!(body.pixel_position(), (128, 64));
        assert_eq!(body.footprint(), (60, 80));
        assert!(!body.is_invulnerable());
    }

    #[test]
    fn initial_speed_above_max_is_rejected() {
        let mut spec = sample_spec(Species::Player);
        spec.initial_speed = 4.0;
        let err = spec.build().expect_err("band is inverted");
        assert!(matches!(err, WorldError::InvalidVelocity { .. }));
    }

    #[test]
    fn sprite_rules_are_enforced() {
        let mut spec = sample_spec(Species::Slime);
        spec.sprites.clear();
        assert!(spec.build().is_err());

        let mut spec = sample_spec(Species::Player);
        spec.sprites.truncate(1);
        assert!(matches!(
            spec.build(),
            Err(WorldError::InvalidConfig(message)) if message.contains("ducked")
        ));

        let mut spec = sample_spec(Species::Slime);
        spec.sprites = vec![Sprite::new(2, 10)];
        assert!(spec.build().is_err());
    }

    #[test]
    fn only_duck_capable_species_may_start_ducked() {
        let mut spec = sample_spec(Species::Shark);
        spec.ducking = true;
        assert!(spec.build().is_err());

        let mut spec = sample_spec(Species::Player);
        spec.ducking = true;
        let body = spec.build().expect("players duck");
        assert!(body.is_ducking());
        assert_eq!(body.footprint(), (60, 40));
    }

    #[test]
    fn hit_points_cannot_start_above_the_ceiling() {
        let mut spec = sample_spec(Species::Slime);
        spec.hit_points = 101;
        assert!(spec.build().is_err());
    }

    #[test]
    fn start_move_is_idempotent() {
        let mut body = sample_spec(Species::Player).build().expect("valid spec");
        body.start_move_now(Direction::Right);
        let velocity = body.velocity();
        let accel = body.acceleration();
        body.since_action_start = 0.25;
        body.start_move_now(Direction::Right);
        assert_eq!(body.velocity(), velocity);
        assert_eq!(body.acceleration(), accel);
        assert_eq!(body.time_since_action_start(), 0.25, "repeat is a no-op");
        body.start_move_now(Direction::Left);
        assert_eq!(body.velocity().0, -1.0, "direction switch applies fresh");
    }

    #[test]
    fn contact_damage_respects_the_open_window() {
        let mut body = sample_spec(Species::Slime).build().expect("valid spec");
        assert!(body.receive_contact_damage(30, 0.6));
        assert_eq!(body.hit_points(), 70);
        assert!(body.is_invulnerable());
        assert!(!body.receive_contact_damage(30, 0.6), "window blocks repeat");
        assert_eq!(body.hit_points(), 70);
        body.immune_for = 0.0;
        assert!(body.receive_contact_damage(100, 0.6));
        assert_eq!(body.hit_points(), 0, "loss saturates at zero");
    }

    #[test]
    fn gain_is_capped_at_the_ceiling() {
        let mut body = sample_spec(Species::Player).build().expect("valid spec");
        body.gain_hit_points(1000);
        assert_eq!(body.hit_points(), body.max_hit_points());
    }

    #[test]
    fn ducking_caps_speed_and_freezes_acceleration() {
        let mut body = sample_spec(Species::Player).build().expect("valid spec");
        body.start_move_now(Direction::Right);
        body.vx = 2.5;
        body.start_duck_now();
        assert_eq!(body.velocity().0, 1.0);
        assert_eq!(body.acceleration().0, 0.0);
        body.stand_up_now();
        assert!(body.acceleration().0 > 0.0, "stand restores acceleration");
    }

    #[test]
    fn arena_preserves_registry_order_across_removal() {
        let mut arena = BodyArena::new();
        let a = arena.push(sample_spec(Species::Slime).build().expect("valid"));
        let b = arena.push(sample_spec(Species::Shark).build().expect("valid"));
        let c = arena.push(sample_spec(Species::Plant).build().expect("valid"));
        let player = arena.insert_front(sample_spec(Species::Player).build().expect("valid"));

        assert_eq!(arena.handles(), &[player, a, b, c]);
        assert_eq!(arena.index_of(player), Some(0));
        assert_eq!(arena.index_of(c), Some(3));

        arena.remove(b).expect("b is registered");
        assert_eq!(arena.handles(), &[player, a, c]);
        assert_eq!(arena.index_of(c), Some(2));
        assert!(!arena.contains(b));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn pair_mut_returns_disjoint_borrows() {
        let mut arena = BodyArena::new();
        let a = arena.push(sample_spec(Species::Slime).build().expect("valid"));
        let b = arena.push(sample_spec(Species::Shark).build().expect("valid"));
        let (first, second) = arena.pair_mut(a, b).expect("both registered");
        first.lose_hit_points(10);
        second.lose_hit_points(20);
        assert_eq!(arena.get(a).expect("a lives").hit_points(), 90);
        assert_eq!(arena.get(b).expect("b lives").hit_points(), 80);
        assert!(arena.pair_mut(a, a).is_none(), "aliasing is refused");
    }
}
