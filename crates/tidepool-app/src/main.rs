use anyhow::Result;
use tidepool_core::{
    BodyId, BodySpec, Direction, Feature, Phase, Species, Sprite, World, WorldConfig,
};
use tracing::{info, warn};

const TICK_SECONDS: f64 = 1.0 / 60.0;
const TICK_BUDGET: u64 = 3_600;

fn main() -> Result<()> {
    init_tracing();
    let (mut world, player) = bootstrap_world()?;
    info!("Starting tidepool simulation shell");
    run_to_outcome(&mut world, player)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Assemble the demo level: a floor walk from the left edge to the target
/// tile, through a slime patch, a flooded dip, and a snack plant.
fn bootstrap_world() -> Result<(World, BodyId)> {
    let config = WorldConfig {
        rng_seed: Some(0x71DE_0001),
        ..WorldConfig::default()
    };
    let mut world = World::new(config)?;

    let width = world.config().grid_width;
    for tx in 0..width {
        world.set_feature(i64::from(tx), 0, Feature::Solid)?;
    }
    // Flooded dip along the route.
    for tx in 20..=26 {
        for ty in 1..=3 {
            world.set_feature(tx, ty, Feature::Water)?;
        }
    }
    // Decorative magma pocket behind a shelf, off the walking line.
    for tx in 33..=35 {
        world.set_feature(tx, 4, Feature::Magma)?;
    }
    for tx in 32..=36 {
        world.set_feature(tx, 3, Feature::Solid)?;
    }

    let player = world.attach(
        BodySpec::new(
            Species::Player,
            200,
            63,
            vec![Sprite::new(60, 80), Sprite::new(60, 40)],
        )
        .build()?,
    )?;

    let swarm = world.create_swarm()?;
    for left in [640, 760, 880] {
        let slime = world.attach(
            BodySpec::new(Species::Slime, left, 63, vec![Sprite::new(40, 40)]).build()?,
        )?;
        world.add_to_swarm(slime, swarm)?;
    }
    for left in [1350, 1550] {
        world.attach(
            BodySpec::new(Species::Shark, left, 120, vec![Sprite::new(50, 30)]).build()?,
        )?;
    }
    world.attach(BodySpec::new(Species::Plant, 1950, 63, vec![Sprite::new(30, 30)]).build()?)?;

    world.start_game()?;
    info!(
        bodies = world.body_count(),
        swarms = world.swarm_count(),
        target = ?world.config().target_tile,
        "Level assembled",
    );
    Ok((world, player))
}

/// Walk the player toward the target at a fixed cadence until the phase
/// machine settles, logging once per simulated second.
fn run_to_outcome(world: &mut World, player: BodyId) -> Result<()> {
    world.start_move(player, Direction::Right)?;

    for _ in 0..TICK_BUDGET {
        let events = world.advance_time(TICK_SECONDS)?;
        if !events.terminated.is_empty() {
            info!(
                tick = events.tick.0,
                removed = events.terminated.len(),
                "Bodies swept from the registry",
            );
        }
        if events.tick.0 % 60 == 0 {
            if let Some(body) = world.body(player) {
                let (x, y) = body.pixel_position();
                info!(
                    tick = events.tick.0,
                    x,
                    y,
                    hit_points = body.hit_points(),
                    "Player progress",
                );
            }
        }
        if events.phase.is_terminal() {
            break;
        }
    }

    match world.phase() {
        Phase::Won => info!(tick = world.tick().0, "Player reached the target tile"),
        Phase::Lost => warn!(tick = world.tick().0, "Run lost"),
        phase => warn!(?phase, tick = world.tick().0, "Tick budget exhausted"),
    }
    Ok(())
}
