//! World orchestration: the staged per-tick pipeline over the body registry.

use std::collections::HashSet;
use std::fmt;
use std::mem;

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tidepool_geom::PixelRect;

use crate::{
    Direction, Tick,
    body::{Body, BodyArena, BodyId},
    config::WorldConfig,
    error::WorldError,
    species::{Species, draw_spell},
    swarm::{SwarmId, SwarmLedger},
    terrain::{Feature, FeaturePresence, TerrainGrid},
};

/// Game state machine value.
///
/// `Setup` accepts attachment and tile edits; `start_game` moves to
/// `Running`; the end-of-tick check moves to `Won` or `Lost` and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Level construction: bodies attach, tiles may be edited.
    #[default]
    Setup,
    /// The simulation advances on `advance_time` calls.
    Running,
    /// The player reached the target tile.
    Won,
    /// The player died or escaped off-world.
    Lost,
}

impl Phase {
    /// True once the game can no longer advance.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

/// Summary emitted after one `advance_time` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick counter after the call.
    pub tick: Tick,
    /// Simulated seconds consumed by the call.
    pub elapsed: f64,
    /// Bodies removed from the registry this tick.
    pub terminated: Vec<BodyId>,
    /// Phase after the end-of-tick check.
    pub phase: Phase,
}

/// Result of one axis-specific position attempt.
///
/// Clamping reverts the axis to its previous coordinate and zeroes that
/// axis's velocity; `OffWorld` means the candidate crossed the world's outer
/// edge rather than solid terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoveOutcome {
    Accepted,
    ClampedLow,
    ClampedHigh,
    OffWorld,
}

enum SubstepFlow {
    Continue,
    Halt,
}

/// The simulation aggregate: terrain, the ordered body registry, swarms,
/// the camera window, and the phase machine.
pub struct World {
    config: WorldConfig,
    terrain: TerrainGrid,
    bodies: BodyArena,
    swarms: SwarmLedger,
    phase: Phase,
    tick: Tick,
    window_x: i64,
    window_y: i64,
    player: Option<BodyId>,
    player_escaped: bool,
    pending_removals: Vec<BodyId>,
    rng: SmallRng,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("phase", &self.phase)
            .field("tick", &self.tick)
            .field("bodies", &self.bodies.len())
            .field("swarms", &self.swarms.swarm_count())
            .field("window", &(self.window_x, self.window_y))
            .finish_non_exhaustive()
    }
}

impl World {
    /// Build a world from a validated configuration.
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let terrain = TerrainGrid::new(config.tile_size, config.grid_width, config.grid_height)?;
        let rng = config.seeded_rng();
        Ok(Self {
            terrain,
            bodies: BodyArena::new(),
            swarms: SwarmLedger::new(),
            phase: Phase::Setup,
            tick: Tick::zero(),
            window_x: 0,
            window_y: 0,
            player: None,
            player_escaped: false,
            pending_removals: Vec::new(),
            rng,
            config,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks advanced so far.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Handle of the active player body, if one is attached.
    #[must_use]
    pub const fn player_id(&self) -> Option<BodyId> {
        self.player
    }

    /// Read access to the terrain grid.
    #[must_use]
    pub fn terrain(&self) -> &TerrainGrid {
        &self.terrain
    }

    /// Borrow a body by handle.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    /// Number of attached bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Iterate over all bodies in registry order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> + '_ {
        self.bodies.iter()
    }

    /// Handles of living bodies of one species, in registry order.
    pub fn live_bodies(&self, species: Species) -> impl Iterator<Item = BodyId> + '_ {
        self.bodies
            .iter()
            .filter(move |(_, body)| body.species() == species && !body.is_dead())
            .map(|(id, _)| id)
    }

    /// Camera window rectangle in world pixels.
    #[must_use]
    pub fn window_rect(&self) -> PixelRect {
        PixelRect::new(
            self.window_x,
            self.window_y,
            self.config.window_width,
            self.config.window_height,
        )
    }

    /// Feature code of one tile.
    pub fn feature_at(&self, tx: i64, ty: i64) -> Result<Feature, WorldError> {
        self.terrain.feature_at(tx, ty)
    }

    /// Tile containing a pixel coordinate.
    pub fn tile_at_pixel(&self, px: i64, py: i64) -> Result<(u32, u32), WorldError> {
        self.terrain.tile_at_pixel(px, py)
    }

    /// Feature presence over a pixel rectangle.
    pub fn features_in_rect(&self, rect: &PixelRect) -> Result<FeaturePresence, WorldError> {
        self.terrain.features_in_rect(rect)
    }

    /// Edit one tile's feature code.
    ///
    /// Rejected once the game has started, and also when turning a tile
    /// solid would bury an attached body.
    pub fn set_feature(&mut self, tx: i64, ty: i64, feature: Feature) -> Result<(), WorldError> {
        if self.phase != Phase::Setup {
            return Err(WorldError::InvalidTransition(
                "terrain is frozen once the game starts",
            ));
        }
        if feature.is_solid() {
            let tile_size = self.terrain.tile_size();
            for (_, body) in self.bodies.iter() {
                let buried = body
                    .rect()
                    .inset(1)
                    .is_some_and(|inner| inner.tile_span(tile_size).contains(tx, ty));
                if buried {
                    let (px, py) = body.pixel_position();
                    return Err(WorldError::InvalidLocation { x: px, y: py });
                }
            }
        }
        self.terrain.set_feature(tx, ty, feature)
    }

    /// Attach a body, transferring ownership into the registry.
    ///
    /// The active player is pinned at registry index 0; everything else
    /// appends in arrival order.
    pub fn attach(&mut self, body: Body) -> Result<BodyId, WorldError> {
        if self.phase != Phase::Setup {
            return Err(WorldError::InvalidTransition(
                "bodies attach only during setup",
            ));
        }
        if self.bodies.len() >= self.config.body_cap {
            return Err(WorldError::CapacityExceeded("body registry is full"));
        }
        let rect = body.rect();
        if !self.terrain.contains_rect(&rect)
            || touches_feature(&self.terrain, &rect, Feature::Solid)
        {
            return Err(WorldError::InvalidLocation {
                x: rect.left(),
                y: rect.bottom(),
            });
        }
        let mut body = body;
        let traits = body.species().traits();
        if traits.gravity_bound && !traits.derived_airborne {
            body.grounded = supported(&self.terrain, &rect);
        }
        if body.species() == Species::Player {
            if self.player.is_some() {
                return Err(WorldError::InvalidTransition(
                    "a player body is already attached",
                ));
            }
            let id = self.bodies.insert_front(body);
            self.player = Some(id);
            Ok(id)
        } else {
            Ok(self.bodies.push(body))
        }
    }

    /// Detach a body during setup; the body is dropped, not returned.
    pub fn detach(&mut self, id: BodyId) -> Result<(), WorldError> {
        if self.phase != Phase::Setup {
            return Err(WorldError::InvalidTransition(
                "bodies detach only during setup",
            ));
        }
        if self.bodies.remove(id).is_none() {
            return Err(WorldError::InvalidTransition("body is not attached"));
        }
        self.swarms.expel(id);
        if self.player == Some(id) {
            self.player = None;
        }
        Ok(())
    }

    /// Register an empty swarm during setup.
    pub fn create_swarm(&mut self) -> Result<SwarmId, WorldError> {
        if self.phase != Phase::Setup {
            return Err(WorldError::InvalidTransition(
                "swarms are created only during setup",
            ));
        }
        if self.swarms.swarm_count() >= self.config.swarm_cap {
            return Err(WorldError::CapacityExceeded("swarm cap reached"));
        }
        Ok(self.swarms.create())
    }

    /// Enroll an attached crawler into a swarm during setup.
    pub fn add_to_swarm(&mut self, body: BodyId, swarm: SwarmId) -> Result<(), WorldError> {
        if self.phase != Phase::Setup {
            return Err(WorldError::InvalidTransition(
                "swarm membership is assigned only during setup",
            ));
        }
        let Some(row) = self.bodies.get(body) else {
            return Err(WorldError::InvalidTransition("body is not attached"));
        };
        if !row.species().traits().swarming {
            return Err(WorldError::InvalidTransition("species does not swarm"));
        }
        self.swarms.enroll(&mut self.bodies, body, swarm)
    }

    /// Swarm the body belongs to, if any.
    #[must_use]
    pub fn swarm_of(&self, body: BodyId) -> Option<SwarmId> {
        self.swarms.swarm_of(body)
    }

    /// Members of a swarm in enrollment order.
    #[must_use]
    pub fn swarm_members(&self, id: SwarmId) -> Option<&[BodyId]> {
        self.swarms.get(id).map(crate::swarm::Swarm::members)
    }

    /// Number of live swarms.
    #[must_use]
    pub fn swarm_count(&self) -> usize {
        self.swarms.swarm_count()
    }

    /// Freeze setup and begin the run.
    ///
    /// Requires an attached player and a swarm for every crawler.
    pub fn start_game(&mut self) -> Result<(), WorldError> {
        if self.phase != Phase::Setup {
            return Err(WorldError::InvalidTransition("game already started"));
        }
        if self.player.is_none() {
            return Err(WorldError::InvalidTransition("no player body attached"));
        }
        let unswarmed = self.bodies.iter().any(|(id, body)| {
            body.species().traits().swarming && self.swarms.swarm_of(id).is_none()
        });
        if unswarmed {
            return Err(WorldError::InvalidTransition(
                "every crawler needs a swarm before starting",
            ));
        }
        self.phase = Phase::Running;
        Ok(())
    }

    /// Begin a horizontal move for a steerable body.
    pub fn start_move(&mut self, id: BodyId, direction: Direction) -> Result<(), WorldError> {
        if !direction.is_horizontal() {
            return Err(WorldError::InvalidTransition(
                "move direction must be horizontal",
            ));
        }
        let body = self.steerable_mut(id)?;
        body.start_move_now(direction);
        Ok(())
    }

    /// End a horizontal move if it matches the active direction.
    pub fn end_move(&mut self, id: BodyId, direction: Direction) -> Result<(), WorldError> {
        let body = self.steerable_mut(id)?;
        body.end_move_now(direction);
        Ok(())
    }

    /// Open a jump; ignored while the body is airborne.
    pub fn start_jump(&mut self, id: BodyId) -> Result<(), WorldError> {
        let Self {
            bodies, terrain, ..
        } = self;
        let Some(body) = bodies.get_mut(id) else {
            return Err(WorldError::InvalidTransition("body is not attached"));
        };
        if !body.species().traits().steerable {
            return Err(WorldError::InvalidTransition("species ignores steering"));
        }
        let up = airborne(terrain, body);
        body.start_jump_now(up);
        Ok(())
    }

    /// Cut a rising jump short.
    pub fn end_jump(&mut self, id: BodyId) -> Result<(), WorldError> {
        let body = self.steerable_mut(id)?;
        body.end_jump_now();
        Ok(())
    }

    /// Duck immediately.
    pub fn start_duck(&mut self, id: BodyId) -> Result<(), WorldError> {
        let body = self.steerable_mut(id)?;
        if !body.species().traits().can_duck {
            return Err(WorldError::InvalidTransition("species cannot duck"));
        }
        body.start_duck_now();
        Ok(())
    }

    /// Stand up from a duck; deferred silently while blocked from above.
    pub fn end_duck(&mut self, id: BodyId) -> Result<(), WorldError> {
        let Self {
            bodies, terrain, ..
        } = self;
        let Some(body) = bodies.get_mut(id) else {
            return Err(WorldError::InvalidTransition("body is not attached"));
        };
        if !body.species().traits().steerable {
            return Err(WorldError::InvalidTransition("species ignores steering"));
        }
        if !body.species().traits().can_duck {
            return Err(WorldError::InvalidTransition("species cannot duck"));
        }
        if !body.is_ducking() {
            return Ok(());
        }
        if stand_fits(terrain, body) {
            body.stand_up_now();
        } else {
            body.wants_stand = true;
        }
        Ok(())
    }

    fn steerable_mut(&mut self, id: BodyId) -> Result<&mut Body, WorldError> {
        let Some(body) = self.bodies.get_mut(id) else {
            return Err(WorldError::InvalidTransition("body is not attached"));
        };
        if !body.species().traits().steerable {
            return Err(WorldError::InvalidTransition("species ignores steering"));
        }
        Ok(body)
    }

    /// Advance the whole world by `dt` seconds.
    ///
    /// Every live body integrates in registry order; dead bodies sit out
    /// their grace period and are then removed; the camera and the win/lose
    /// check run at the end of the tick.
    pub fn advance_time(&mut self, dt: f64) -> Result<TickEvents, WorldError> {
        if !dt.is_finite() || dt < 0.0 || dt >= self.config.max_step {
            return Err(WorldError::InvalidStep {
                dt,
                max: self.config.max_step,
            });
        }
        if self.phase != Phase::Running {
            return Err(WorldError::InvalidTransition("world is not running"));
        }
        let grace = self.config.death_grace;
        let handles: Vec<BodyId> = self.bodies.iter_handles().collect();
        for id in handles {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            if body.is_dead() {
                self.stage_death_watch(id, dt, grace);
            } else {
                self.advance_body(id, dt);
            }
        }
        let terminated = self.stage_removals();
        self.stage_window();
        self.stage_outcome();
        self.tick = self.tick.next();
        Ok(TickEvents {
            tick: self.tick,
            elapsed: dt,
            terminated,
            phase: self.phase,
        })
    }

    fn advance_body(&mut self, id: BodyId, dt: f64) {
        let mut remaining = dt;
        while remaining > 0.0 {
            self.apply_vertical_policy(id);
            let Some(body) = self.bodies.get(id) else {
                return;
            };
            let delta = substep_size(body, dt, remaining, self.config.meters_per_pixel);
            let flow = self.substep(id, delta);
            remaining -= delta;
            if matches!(flow, SubstepFlow::Halt) {
                // A body that died mid-tick holds still for the unconsumed
                // remainder; that time counts toward its grace period.
                if let Some(body) = self.bodies.get_mut(id) {
                    if body.is_dead() {
                        body.death_timer += remaining;
                    }
                }
                return;
            }
        }
    }

    fn substep(&mut self, id: BodyId, delta: f64) -> SubstepFlow {
        if self.integrate_motion(id, delta) {
            self.resolve_escape(id);
            return SubstepFlow::Halt;
        }
        self.resolve_body_contact(id);
        self.apply_periodic_effects(id, delta);
        match self.bodies.get(id) {
            Some(body) if !body.is_dead() => SubstepFlow::Continue,
            Some(_) => {
                if let Some(body) = self.bodies.get_mut(id) {
                    halt_motion(body);
                }
                SubstepFlow::Halt
            }
            None => SubstepFlow::Halt,
        }
    }

    /// Choose the vertical acceleration for the next sub-step.
    ///
    /// Stationary species stay pinned; submerged swimmers steer with their
    /// drawn dive acceleration instead of gravity; everything else carries
    /// gravity while airborne and rests at zero otherwise.
    fn apply_vertical_policy(&mut self, id: BodyId) {
        let Self {
            bodies,
            terrain,
            config,
            ..
        } = self;
        let Some(body) = bodies.get_mut(id) else {
            return;
        };
        let traits = body.species().traits();
        if !traits.gravity_bound {
            body.ay = 0.0;
            body.vy = 0.0;
            return;
        }
        let rect = body.rect();
        if traits.aquatic && touches_feature(terrain, &rect, Feature::Water) {
            body.ay = body.dive_accel;
            return;
        }
        body.ay = if airborne(terrain, body) {
            config.gravity
        } else {
            0.0
        };
    }

    /// Integrate one sub-step of motion; returns whether the body crossed
    /// the world's outer edge.
    fn integrate_motion(&mut self, id: BodyId, delta: f64) -> bool {
        let Self {
            bodies,
            terrain,
            config,
            ..
        } = self;
        let Some(body) = bodies.get_mut(id) else {
            return false;
        };

        let (vx0, vy0) = (body.vx, body.vy);
        body.vx += body.ax * delta;
        if body.vx != 0.0 {
            let ceiling = body.speed_ceiling();
            let floor = body.initial_speed.min(ceiling);
            body.vx = body.vx.signum() * body.vx.abs().clamp(floor, ceiling);
        }
        body.vy += body.ay * delta;

        // Displacement uses the sub-step's starting velocity so the pieces
        // telescope to the closed-form midpoint integral.
        let scale = delta / config.meters_per_pixel;
        let dx = (vx0 + 0.5 * body.ax * delta) * scale;
        let dy = (vy0 + 0.5 * body.ay * delta) * scale;

        let mut escaped = false;
        if dx != 0.0 {
            let new_x = body.x + dx;
            let current = body.rect();
            let target_left = new_x.floor() as i64;
            if target_left == current.left() {
                body.x = new_x;
            } else {
                let candidate = PixelRect::new(
                    target_left,
                    current.bottom(),
                    current.width(),
                    current.height(),
                );
                match resolve_move(terrain, &candidate, dx > 0.0) {
                    MoveOutcome::Accepted => body.x = new_x,
                    MoveOutcome::ClampedLow | MoveOutcome::ClampedHigh => body.vx = 0.0,
                    MoveOutcome::OffWorld => {
                        body.vx = 0.0;
                        escaped = true;
                    }
                }
            }
        }
        if dy != 0.0 && !escaped {
            let new_y = body.y + dy;
            let current = body.rect();
            let target_bottom = new_y.floor() as i64;
            if target_bottom == current.bottom() {
                body.y = new_y;
            } else {
                let candidate = PixelRect::new(
                    current.left(),
                    target_bottom,
                    current.width(),
                    current.height(),
                );
                match resolve_move(terrain, &candidate, dy > 0.0) {
                    MoveOutcome::Accepted => body.y = new_y,
                    MoveOutcome::ClampedLow | MoveOutcome::ClampedHigh => body.vy = 0.0,
                    MoveOutcome::OffWorld => {
                        body.vy = 0.0;
                        escaped = true;
                    }
                }
            }
        }
        escaped
    }

    fn resolve_escape(&mut self, id: BodyId) {
        if self.player == Some(id) {
            self.player_escaped = true;
        } else {
            self.pending_removals.push(id);
        }
        if let Some(body) = self.bodies.get_mut(id) {
            halt_motion(body);
        }
    }

    /// Scan for the first perimeter contact with another living body and
    /// hand it to the species policy.
    fn resolve_body_contact(&mut self, id: BodyId) {
        let tile_size = self.terrain.tile_size();
        let Some(body) = self.bodies.get(id) else {
            return;
        };
        if body.is_dead() {
            return;
        }
        let rect = body.rect();
        let span = rect.tile_span(tile_size);
        let mut hit = None;
        for (other_id, other) in self.bodies.iter() {
            if other_id == id || other.is_dead() {
                continue;
            }
            let other_rect = other.rect();
            if !span.intersects(&other_rect.tile_span(tile_size)) {
                continue;
            }
            if rect.horizontal_contact(&other_rect) {
                hit = Some((other_id, false, false));
                break;
            }
            if rect.vertical_contact(&other_rect) {
                hit = Some((
                    other_id,
                    rect.contact_bottom(&other_rect),
                    rect.contact_top(&other_rect),
                ));
                break;
            }
        }
        if let Some((other, on_bottom, on_top)) = hit {
            self.apply_contact_policy(id, other, on_bottom, on_top);
        }
    }

    /// Species collision-response matrix, applied from the initiating side.
    fn apply_contact_policy(&mut self, id: BodyId, other: BodyId, on_bottom: bool, on_top: bool) {
        let Some(species) = self.bodies.get(id).map(Body::species) else {
            return;
        };
        let Some(other_species) = self.bodies.get(other).map(Body::species) else {
            return;
        };
        let window = self.config.untouchable_window;

        if species.is_player_family() {
            match other_species {
                Species::Plant => {
                    let heal = self.config.plant_heal;
                    let Some((mine, plant)) = self.bodies.pair_mut(id, other) else {
                        return;
                    };
                    if mine.hit_points() < mine.max_hit_points() && plant.hit_points() > 0 {
                        let drained = plant.hit_points();
                        plant.lose_hit_points(drained);
                        mine.gain_hit_points(heal);
                    }
                }
                Species::Slime | Species::Shark => {
                    let damage = self.config.contact_damage;
                    let mut shared = false;
                    {
                        let Some((mine, enemy)) = self.bodies.pair_mut(id, other) else {
                            return;
                        };
                        if mine.is_invulnerable() {
                            return;
                        }
                        if enemy.receive_contact_damage(damage, window) {
                            shared = enemy.species().traits().swarming;
                        }
                        if on_bottom {
                            mine.receive_contact_damage(damage, window);
                        }
                    }
                    if shared {
                        self.swarms.share_loss(&mut self.bodies, other);
                    }
                }
                Species::Player | Species::Mimic => {
                    let damage = self.config.contact_damage;
                    let Some((mine, theirs)) = self.bodies.pair_mut(id, other) else {
                        return;
                    };
                    if mine.is_invulnerable() || theirs.is_invulnerable() {
                        return;
                    }
                    if on_bottom {
                        theirs.receive_contact_damage(damage, window);
                    }
                    if on_top {
                        mine.receive_contact_damage(damage, window);
                    }
                }
            }
            return;
        }

        match (species, other_species) {
            (Species::Slime, Species::Shark) => {
                let damage = self.config.crawler_clash_damage;
                let applied = self
                    .bodies
                    .get_mut(id)
                    .is_some_and(|body| body.receive_contact_damage(damage, window));
                if applied {
                    self.swarms.share_loss(&mut self.bodies, id);
                }
            }
            (Species::Slime, Species::Slime) => {
                self.swarms.merge_for_contact(&mut self.bodies, id, other);
            }
            (Species::Shark, Species::Slime) => {
                let damage = self.config.swimmer_clash_damage;
                if let Some(body) = self.bodies.get_mut(id) {
                    body.receive_contact_damage(damage, window);
                }
            }
            _ => {}
        }
    }

    /// Timers, terrain contact damage, autonomous spells, and the deferred
    /// stand-up retry.
    fn apply_periodic_effects(&mut self, id: BodyId, delta: f64) {
        let interval = self.config.terrain_damage_interval;
        let water_damage = self.config.water_damage;
        let magma_damage = self.config.magma_damage;
        let air_damage = self.config.swimmer_air_damage;
        let mut share_events = 0u32;
        {
            let Self {
                bodies,
                terrain,
                rng,
                ..
            } = self;
            let Some(body) = bodies.get_mut(id) else {
                return;
            };
            let traits = body.species().traits();

            if body.immune_for > 0.0 {
                body.immune_for = (body.immune_for - delta).max(0.0);
            }
            body.since_action_start += delta;
            body.since_action_end += delta;

            let rect = body.rect();
            let in_water = touches_feature(terrain, &rect, Feature::Water);
            let in_magma = touches_feature(terrain, &rect, Feature::Magma);

            if traits.water_susceptible {
                if in_water {
                    body.water_timer += delta;
                    if body.water_timer >= interval {
                        body.water_timer = 0.0;
                        body.lose_hit_points(water_damage);
                        if traits.swarming {
                            share_events += 1;
                        }
                    }
                } else {
                    body.water_timer = 0.0;
                }
            }

            if traits.magma_susceptible {
                if in_magma {
                    if body.in_magma {
                        body.magma_timer += delta;
                        if body.magma_timer >= interval {
                            body.magma_timer = 0.0;
                            body.lose_hit_points(magma_damage);
                            if traits.swarming {
                                share_events += 1;
                            }
                        }
                    } else {
                        // First contact burns immediately.
                        body.in_magma = true;
                        body.magma_timer = 0.0;
                        body.lose_hit_points(magma_damage);
                        if traits.swarming {
                            share_events += 1;
                        }
                    }
                } else {
                    body.in_magma = false;
                    body.magma_timer = 0.0;
                }
            }

            if traits.aquatic {
                if in_water {
                    body.air_timer = 0.0;
                } else {
                    body.air_timer += delta;
                    if body.air_timer >= interval {
                        body.air_timer = 0.0;
                        body.lose_hit_points(air_damage);
                    }
                }
            }

            if !traits.steerable && traits.max_speed > 0.0 && !body.is_dead() {
                body.spell_timer -= delta;
                if body.spell_timer <= 0.0 {
                    if let Some(spell) = draw_spell(body.species(), body.spell_index, rng) {
                        body.spell_index = body.spell_index.wrapping_add(1);
                        body.spell_timer = spell.duration;
                        body.start_move_now(spell.direction);
                        body.dive_accel = spell.dive;
                        if spell.jump && jump_launch_allowed(terrain, &rect) {
                            body.vy = traits.jump_velocity;
                        }
                    }
                }
            }

            if body.wants_stand && stand_fits(terrain, body) {
                body.stand_up_now();
            }

            if !traits.derived_airborne && traits.gravity_bound {
                body.grounded = supported(terrain, &body.rect());
            }
        }
        for _ in 0..share_events {
            self.swarms.share_loss(&mut self.bodies, id);
        }
    }

    fn stage_death_watch(&mut self, id: BodyId, dt: f64, grace: f64) {
        let Some(body) = self.bodies.get_mut(id) else {
            return;
        };
        halt_motion(body);
        body.death_timer += dt;
        if body.death_timer >= grace {
            self.pending_removals.push(id);
        }
    }

    fn stage_removals(&mut self) -> Vec<BodyId> {
        if self.pending_removals.is_empty() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        for id in mem::take(&mut self.pending_removals) {
            if seen.insert(id) && self.bodies.contains(id) {
                self.swarms.expel(id);
                self.bodies.remove(id);
                if self.player == Some(id) {
                    self.player = None;
                }
                removed.push(id);
            }
        }
        removed
    }

    /// Track the player with the camera window, keeping the configured
    /// margin from each window edge unless the world's own edge is closer.
    fn stage_window(&mut self) {
        let Some(player) = self.player else {
            return;
        };
        let Some(body) = self.bodies.get(player) else {
            return;
        };
        let rect = body.rect();
        let margin = i64::from(self.config.window_margin);
        self.window_x = window_axis(
            rect.left(),
            rect.right(),
            margin,
            i64::from(self.config.window_width),
            self.terrain.pixel_width(),
            self.window_x,
        );
        self.window_y = window_axis(
            rect.bottom(),
            rect.top(),
            margin,
            i64::from(self.config.window_height),
            self.terrain.pixel_height(),
            self.window_y,
        );
    }

    fn stage_outcome(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        let Some(player) = self.player else {
            self.phase = Phase::Lost;
            return;
        };
        if self.player_escaped {
            self.phase = Phase::Lost;
            return;
        }
        let Some(body) = self.bodies.get(player) else {
            self.phase = Phase::Lost;
            return;
        };
        if body.is_dead() {
            self.phase = Phase::Lost;
            return;
        }
        let span = body.rect().tile_span(self.terrain.tile_size());
        let (tx, ty) = self.config.target_tile;
        if span.contains(i64::from(tx), i64::from(ty)) {
            self.phase = Phase::Won;
        }
    }
}

/// Sub-step length keeping per-step displacement at or below one pixel.
fn substep_size(body: &Body, dt: f64, remaining: f64, meters_per_pixel: f64) -> f64 {
    let speed = body.vx.hypot(body.vy);
    let accel = body.ax.hypot(body.ay);
    let reach = speed + accel * dt;
    if reach <= f64::EPSILON {
        return remaining;
    }
    (meters_per_pixel / reach).min(remaining)
}

/// One-pixel-inset overlap test against a terrain feature.
fn touches_feature(terrain: &TerrainGrid, rect: &PixelRect, feature: Feature) -> bool {
    rect.inset(1)
        .is_some_and(|inner| terrain.span_has(&inner.tile_span(terrain.tile_size()), feature))
}

/// Axis-specific position attempt against terrain and the world edge.
fn resolve_move(terrain: &TerrainGrid, candidate: &PixelRect, advancing: bool) -> MoveOutcome {
    if !terrain.contains_rect(candidate) {
        return MoveOutcome::OffWorld;
    }
    if touches_feature(terrain, candidate, Feature::Solid) {
        if advancing {
            MoveOutcome::ClampedHigh
        } else {
            MoveOutcome::ClampedLow
        }
    } else {
        MoveOutcome::Accepted
    }
}

/// Solid support under the body's interior columns, tolerating rest exactly
/// on a tile boundary.
fn supported(terrain: &TerrainGrid, rect: &PixelRect) -> bool {
    if rect.width() <= 2 {
        return false;
    }
    let probe = PixelRect::new(rect.left() + 1, rect.bottom() - 1, rect.width() - 2, 2);
    terrain.span_has(&probe.tile_span(terrain.tile_size()), Feature::Solid)
}

fn airborne(terrain: &TerrainGrid, body: &Body) -> bool {
    let traits = body.species().traits();
    if !traits.gravity_bound {
        return false;
    }
    if traits.derived_airborne {
        body.velocity().1 != 0.0 || !supported(terrain, &body.rect())
    } else {
        !body.grounded
    }
}

/// Whether a drawn jump spell launches from this footprint: the body must be
/// submerged in water or resting on solid ground. Airborne dry bodies let
/// the spell fizzle.
fn jump_launch_allowed(terrain: &TerrainGrid, rect: &PixelRect) -> bool {
    touches_feature(terrain, rect, Feature::Water) || supported(terrain, rect)
}

/// Whether the standing footprint fits at the body's current position.
fn stand_fits(terrain: &TerrainGrid, body: &Body) -> bool {
    let sprite = body.standing_sprite();
    let rect = body.rect().resized(sprite.width, sprite.height);
    terrain.contains_rect(&rect) && !touches_feature(terrain, &rect, Feature::Solid)
}

fn halt_motion(body: &mut Body) {
    body.vx = 0.0;
    body.vy = 0.0;
    body.ax = 0.0;
    body.ay = 0.0;
    body.active_move = None;
}

/// Window origin along one axis.
///
/// The window slides only when the margin constraint forces it; when the
/// margins cannot both hold, it centers on the body; the world edge always
/// wins over the margin.
fn window_axis(
    lo_edge: i64,
    hi_edge: i64,
    margin: i64,
    span: i64,
    world_span: i64,
    current: i64,
) -> i64 {
    let lo = hi_edge + margin - span + 1;
    let hi = lo_edge - margin;
    let ideal = if lo > hi {
        (lo_edge + hi_edge + 1 - span) / 2
    } else {
        current.clamp(lo, hi)
    };
    ideal.clamp(0, (world_span - span).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodySpec, Sprite};

    fn seeded_config() -> WorldConfig {
        WorldConfig {
            rng_seed: Some(11),
            ..WorldConfig::default()
        }
    }

    fn world_with_floor() -> World {
        let mut world = World::new(seeded_config()).expect("default config is valid");
        let width = world.config().grid_width;
        for tx in 0..width {
            world
                .set_feature(i64::from(tx), 0, Feature::Solid)
                .expect("floor tile is in range");
        }
        world
    }

    fn player_spec(left: i64, bottom: i64) -> BodySpec {
        BodySpec::new(
            Species::Player,
            left,
            bottom,
            vec![Sprite::new(60, 80), Sprite::new(60, 40)],
        )
    }

    fn slime_spec(left: i64, bottom: i64) -> BodySpec {
        BodySpec::new(Species::Slime, left, bottom, vec![Sprite::new(40, 40)])
    }

    fn plant_spec(left: i64, bottom: i64) -> BodySpec {
        BodySpec::new(Species::Plant, left, bottom, vec![Sprite::new(30, 30)])
    }

    #[test]
    fn construction_rejects_inconsistent_config() {
        let config = WorldConfig {
            tile_size: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(
            World::new(config),
            Err(WorldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn player_is_pinned_at_registry_index_zero() {
        let mut world = world_with_floor();
        let slime = world
            .attach(slime_spec(200, 63).build().expect("valid slime"))
            .expect("slime attaches");
        let player = world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        let order: Vec<BodyId> = world.bodies().map(|(id, _)| id).collect();
        assert_eq!(order, vec![player, slime]);
        assert_eq!(world.player_id(), Some(player));
    }

    #[test]
    fn second_player_is_rejected() {
        let mut world = world_with_floor();
        world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("first player attaches");
        let err = world
            .attach(player_spec(400, 63).build().expect("valid player"))
            .expect_err("second player is refused");
        assert_eq!(
            err,
            WorldError::InvalidTransition("a player body is already attached")
        );
    }

    #[test]
    fn attachment_inside_solid_terrain_is_rejected() {
        let mut world = world_with_floor();
        let err = world
            .attach(player_spec(100, 10).build().expect("valid player"))
            .expect_err("buried placement is refused");
        assert!(matches!(err, WorldError::InvalidLocation { .. }));
    }

    #[test]
    fn registry_cap_is_enforced() {
        let config = WorldConfig {
            body_cap: 2,
            ..seeded_config()
        };
        let mut world = World::new(config).expect("config is valid");
        world
            .attach(slime_spec(100, 100).build().expect("valid"))
            .expect("first attaches");
        world
            .attach(slime_spec(200, 100).build().expect("valid"))
            .expect("second attaches");
        let err = world
            .attach(slime_spec(300, 100).build().expect("valid"))
            .expect_err("cap rejects the third");
        assert_eq!(err, WorldError::CapacityExceeded("body registry is full"));
    }

    #[test]
    fn swarm_cap_is_enforced() {
        let config = WorldConfig {
            swarm_cap: 1,
            ..seeded_config()
        };
        let mut world = World::new(config).expect("config is valid");
        world.create_swarm().expect("first swarm fits");
        let err = world.create_swarm().expect_err("cap rejects the second");
        assert_eq!(err, WorldError::CapacityExceeded("swarm cap reached"));
    }

    #[test]
    fn tile_round_trip_and_freeze() {
        let mut world = world_with_floor();
        world
            .set_feature(5, 3, Feature::Water)
            .expect("tile is in range");
        assert_eq!(world.feature_at(5, 3).expect("in range"), Feature::Water);

        world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        world.start_game().expect("setup is complete");
        let err = world
            .set_feature(5, 3, Feature::Air)
            .expect_err("terrain is frozen");
        assert_eq!(
            err,
            WorldError::InvalidTransition("terrain is frozen once the game starts")
        );
    }

    #[test]
    fn turning_a_tile_solid_under_a_body_is_rejected() {
        let mut world = world_with_floor();
        world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        // The player spans tile column 1 around tile row 1.
        let err = world
            .set_feature(1, 1, Feature::Solid)
            .expect_err("body would be buried");
        assert!(matches!(err, WorldError::InvalidLocation { .. }));
    }

    #[test]
    fn start_game_requires_player_and_swarmed_crawlers() {
        let mut world = world_with_floor();
        assert_eq!(
            world.start_game().expect_err("no player yet"),
            WorldError::InvalidTransition("no player body attached")
        );

        world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        let slime = world
            .attach(slime_spec(300, 63).build().expect("valid slime"))
            .expect("slime attaches");
        assert_eq!(
            world.start_game().expect_err("crawler lacks a swarm"),
            WorldError::InvalidTransition("every crawler needs a swarm before starting")
        );

        let swarm = world.create_swarm().expect("swarm fits");
        world.add_to_swarm(slime, swarm).expect("slime enrolls");
        world.start_game().expect("setup is complete");
        assert_eq!(world.phase(), Phase::Running);
        assert_eq!(
            world.start_game().expect_err("already running"),
            WorldError::InvalidTransition("game already started")
        );
    }

    #[test]
    fn advance_requires_running_phase() {
        let mut world = world_with_floor();
        assert_eq!(
            world.advance_time(0.01).expect_err("still in setup"),
            WorldError::InvalidTransition("world is not running")
        );
    }

    #[test]
    fn out_of_range_steps_are_rejected() {
        let mut world = world_with_floor();
        world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        world.start_game().expect("setup is complete");

        for dt in [0.2, 0.21, -0.01, f64::NAN] {
            let err = world.advance_time(dt).expect_err("step is out of range");
            assert!(matches!(err, WorldError::InvalidStep { .. }), "dt {dt}");
        }
        // The boundary itself is exclusive; just below it is accepted.
        world.advance_time(0.199).expect("step is in range");
    }

    #[test]
    fn steering_is_refused_for_autonomous_species() {
        let mut world = world_with_floor();
        let slime = world
            .attach(slime_spec(300, 63).build().expect("valid slime"))
            .expect("slime attaches");
        assert_eq!(
            world
                .start_move(slime, Direction::Right)
                .expect_err("slimes steer themselves"),
            WorldError::InvalidTransition("species ignores steering")
        );
    }

    #[test]
    fn vertical_move_directions_are_refused() {
        let mut world = world_with_floor();
        let player = world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        assert_eq!(
            world
                .start_move(player, Direction::Up)
                .expect_err("moves are horizontal"),
            WorldError::InvalidTransition("move direction must be horizontal")
        );
    }

    #[test]
    fn detach_is_setup_only_and_clears_membership() {
        let mut world = world_with_floor();
        let slime = world
            .attach(slime_spec(300, 63).build().expect("valid slime"))
            .expect("slime attaches");
        let swarm = world.create_swarm().expect("swarm fits");
        world.add_to_swarm(slime, swarm).expect("slime enrolls");

        world.detach(slime).expect("detach during setup");
        assert_eq!(world.swarm_of(slime), None);
        assert_eq!(world.swarm_count(), 0, "emptied swarm terminates");
        assert_eq!(world.body_count(), 0);

        let player = world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        world.start_game().expect("setup is complete");
        assert_eq!(
            world.detach(player).expect_err("detach is frozen"),
            WorldError::InvalidTransition("bodies detach only during setup")
        );
    }

    #[test]
    fn zero_step_is_accepted_and_changes_nothing() {
        let mut world = world_with_floor();
        let player = world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        world.start_game().expect("setup is complete");
        let events = world.advance_time(0.0).expect("zero step is in range");
        assert_eq!(events.tick, Tick(1));
        assert!(events.terminated.is_empty());
        let body = world.body(player).expect("player is attached");
        assert_eq!(body.pixel_position(), (100, 63));
        assert_eq!(body.velocity(), (0.0, 0.0));
    }

    #[test]
    fn plant_heal_is_gated_on_missing_hit_points() {
        let mut world = world_with_floor();
        let player = world
            .attach(player_spec(100, 63).build().expect("valid player"))
            .expect("player attaches");
        // Plant sharing the player's right perimeter column.
        let plant = world
            .attach(plant_spec(159, 63).build().expect("valid plant"))
            .expect("plant attaches");
        world.start_game().expect("setup is complete");
        world.advance_time(0.01).expect("step is in range");

        let player_hp = world.body(player).expect("player lives").hit_points();
        let plant_hp = world.body(plant).expect("plant in grace").hit_points();
        assert_eq!(player_hp, 150, "player heals by the plant amount");
        assert_eq!(plant_hp, 0, "plant is drained");
    }

    #[test]
    fn jump_spells_launch_when_submerged_or_grounded() {
        let mut world = world_with_floor();
        for tx in 8..=12 {
            for ty in 1..=6 {
                world
                    .set_feature(tx, ty, Feature::Water)
                    .expect("pool tile is in range");
            }
        }
        let terrain = world.terrain();
        // Floating mid-pool with nothing solid underneath.
        let floating = PixelRect::new(600, 200, 50, 30);
        assert!(!supported(terrain, &floating));
        assert!(jump_launch_allowed(terrain, &floating));
        // Dry and standing on the floor.
        let grounded = PixelRect::new(1600, 63, 50, 30);
        assert!(jump_launch_allowed(terrain, &grounded));
        // Dry and mid-air: the spell fizzles.
        let airborne = PixelRect::new(1600, 400, 50, 30);
        assert!(!jump_launch_allowed(terrain, &airborne));
    }

    #[test]
    fn window_stays_inside_the_world() {
        let mut world = world_with_floor();
        world
            .attach(player_spec(40, 63).build().expect("valid player"))
            .expect("player attaches");
        world.start_game().expect("setup is complete");
        world.advance_time(0.01).expect("step is in range");
        let window = world.window_rect();
        assert_eq!(window.left(), 0, "left edge beats the margin");
        assert_eq!(window.bottom(), 0);
        assert_eq!(window.width(), world.config().window_width);
    }

    #[test]
    fn move_outcome_reports_the_blocking_side() {
        let world = world_with_floor();
        let tile = world.config().tile_size as i64;
        // Candidate sunk into the floor.
        let buried = PixelRect::new(100, 10, 40, 40);
        assert_eq!(
            resolve_move(world.terrain(), &buried, false),
            MoveOutcome::ClampedLow
        );
        assert_eq!(
            resolve_move(world.terrain(), &buried, true),
            MoveOutcome::ClampedHigh
        );
        // Candidate resting exactly on the floor's top row is legal.
        let resting = PixelRect::new(100, tile - 1, 40, 40);
        assert_eq!(
            resolve_move(world.terrain(), &resting, false),
            MoveOutcome::Accepted
        );
        // Candidate poking past the world edge.
        let outside = PixelRect::new(-5, tile, 40, 40);
        assert_eq!(
            resolve_move(world.terrain(), &outside, false),
            MoveOutcome::OffWorld
        );
    }

    #[test]
    fn supported_ignores_walls_beside_the_body() {
        let mut world = world_with_floor();
        // A wall column to the right of open air.
        for ty in 0..4 {
            world
                .set_feature(6, ty, Feature::Solid)
                .expect("wall tile is in range");
        }
        let tile = world.config().tile_size as i64;
        // Hugging the wall in mid-air: right column overlaps the wall by one
        // pixel, nothing below.
        let hugging = PixelRect::new(6 * tile - 39, tile + 50, 40, 40);
        assert!(!supported(world.terrain(), &hugging));
        // Standing on the floor.
        let standing = PixelRect::new(100, tile - 1, 40, 40);
        assert!(supported(world.terrain(), &standing));
        // Resting exactly on the boundary row above the floor.
        let boundary = PixelRect::new(100, tile, 40, 40);
        assert!(supported(world.terrain(), &boundary));
    }

    #[test]
    fn window_axis_prefers_margin_then_center_then_world_edge() {
        // Origin inside the margin band stays put.
        assert_eq!(window_axis(500, 559, 200, 1024, 4096, 0), 0);
        // Origin outside the band slides to the nearest band edge.
        assert_eq!(window_axis(500, 559, 200, 1024, 4096, 400), 300);
        // Window too small for both margins: center on the body.
        assert_eq!(window_axis(500, 559, 300, 512, 4096, 0), 500 + 30 - 256);
        // World edge overrides the margin.
        assert_eq!(window_axis(40, 99, 200, 1024, 4096, 50), 0);
    }
}
