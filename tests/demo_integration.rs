//! Integration tests for the demo scene and simulation loop

use broad2d::config::AppConfig;
use broad2d::scene::SceneBuilder;
use broad2d::systems::SimulationSystem;
use broad2d_math::Vec2;
use broad2d_physics::{Aabb, MapId, PhysicsConfig, Shape};

// ==================== Event Bookkeeping ====================

/// Every live pair must be explained by a begin event that has not yet ended
#[test]
fn test_pair_count_matches_event_balance() {
    let config = AppConfig::default();
    let map = MapId::default();
    let mut world = SceneBuilder::new(PhysicsConfig::new(Vec2::ZERO))
        .add_arena(map, 15.0)
        .add_random_bodies(map, 60, 15.0, 8.0, 42)
        .build();

    let mut sim = SimulationSystem::new(config.demo.dt, 15.0);
    for _ in 0..240 {
        sim.update(&mut world);
        let stats = sim.stats();
        assert_eq!(
            world.broadphase().pair_count() as u64,
            stats.begins - stats.ends,
            "pair set out of step with events at tick {}",
            stats.ticks
        );
    }

    let broadphase = world.broadphase().map(map).unwrap();
    broadphase.validate().unwrap();
    assert!(sim.stats().begins > 0);
}

// ==================== Containment ====================

/// Bodies bounce off the arena bounds and never drift far outside it
#[test]
fn test_bodies_stay_near_arena() {
    let map = MapId::default();
    let mut world = SceneBuilder::new(PhysicsConfig::new(Vec2::ZERO))
        .add_random_bodies(map, 30, 10.0, 10.0, 5)
        .build();

    let dt = 1.0 / 60.0;
    let mut sim = SimulationSystem::new(dt, 10.0);
    for _ in 0..600 {
        sim.update(&mut world);
    }

    // A body can overshoot by at most one step of travel past the bound
    let slack = 10.0 * dt + 1.0;
    for (_, body) in world.bodies() {
        let p = body.position();
        assert!(p.x.abs() <= 10.0 + slack && p.y.abs() <= 10.0 + slack, "escaped to {:?}", p);
    }
    assert!(sim.stats().bounces > 0);
}

// ==================== Sensors ====================

/// A sensor in the middle of the arena reports the bodies inside it
#[test]
fn test_sensor_sees_bodies_passing_through() {
    let map = MapId::default();
    let mut world = SceneBuilder::new(PhysicsConfig::new(Vec2::ZERO))
        .add_sensor(map, Vec2::ZERO, Vec2::splat(1.0))
        .add_body(map, Vec2::new(-5.0, 0.0), Vec2::new(10.0, 0.0), Shape::circle(0.5))
        .build();

    let mut sim = SimulationSystem::new(1.0 / 60.0, 100.0);
    let mut began = false;
    for _ in 0..30 {
        let result = sim.update(&mut world);
        began |= result.begins > 0;
    }

    assert!(began);
    assert_eq!(world.broadphase().pair_count(), 1);

    let region = Aabb::from_center_half_extents(Vec2::new(0.0, 0.9), Vec2::splat(0.05));
    assert_eq!(world.query_region(map, region).count(), 1);
}
