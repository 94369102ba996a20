//! broad2d - 2D broadphase demo
//!
//! Drops a crowd of bodies into an arena and reports the pair events the
//! broadphase produces while they bounce around.

use broad2d::config::AppConfig;
use broad2d::scene::SceneBuilder;
use broad2d::systems::SimulationSystem;
use broad2d_math::Vec2;
use broad2d_physics::{Aabb, DebugOverlay, DrawCommandBuffer, MapId};

fn main() {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.debug.log_level.as_str()),
    )
    .init();

    let demo = &config.demo;
    let map = MapId::default();
    let half_extent = demo.arena_half_extent;

    let mut world = SceneBuilder::new(config.physics.clone())
        .add_arena(map, half_extent)
        .add_sensor(map, Vec2::ZERO, Vec2::splat(half_extent / 8.0))
        .add_random_bodies(map, demo.body_count, half_extent, demo.max_speed, demo.seed)
        .build();

    log::info!(
        "Scene ready: {} bodies, {} fixtures, {} proxies",
        world.body_count(),
        world.fixture_count(),
        world.broadphase().proxy_count()
    );

    let mut sim = SimulationSystem::new(demo.dt, half_extent)
        .with_event_logging(config.debug.log_pair_events);

    let start = std::time::Instant::now();
    for tick in 0..demo.ticks {
        let result = sim.update(&mut world);
        if result.begins + result.ends > 0 {
            log::trace!("tick {}: {} begin, {} end", tick, result.begins, result.ends);
        }
    }
    let elapsed = start.elapsed();

    let stats = sim.stats();
    log::info!(
        "Ran {} ticks in {:.2?}: {} begin, {} end, peak {} pairs, {} bounces",
        stats.ticks,
        elapsed,
        stats.begins,
        stats.ends,
        stats.peak_pairs,
        stats.bounces
    );

    if let Some(broadphase) = world.broadphase().map(map) {
        log::info!(
            "Map {:?}: {} proxies, {} pairs, tree height {}",
            map,
            broadphase.proxy_count(),
            broadphase.pair_count(),
            broadphase.tree().height()
        );
    }

    if config.debug.draw_final_frame {
        let mut overlay = DebugOverlay::new(config.debug.overlay);
        let mut buffer = DrawCommandBuffer::new();
        let viewport = Aabb::from_center_half_extents(Vec2::ZERO, Vec2::splat(half_extent + 1.0));
        let hovered = overlay.draw_world(&world, map, viewport, Some(Vec2::ZERO), &mut buffer).len();
        log::info!(
            "Final frame: {} draw commands, {} bodies under the origin",
            buffer.len(),
            hovered
        );
        for line in overlay.hover_lines(&world) {
            log::debug!("{}", line);
        }
    }
}
