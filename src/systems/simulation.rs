//! Fixed-step simulation system
//!
//! Runs the demo loop:
//! - Bounce dynamic bodies off the arena bounds
//! - Step world physics
//! - Tally pair begin/end events

use broad2d_physics::{BodyKey, BodyType, MapPairEvent, PairEventKind, PhysicsWorld};

/// Result of a single tick
#[derive(Debug, Default)]
pub struct TickResult {
    /// Pair events produced this tick, in order
    pub events: Vec<MapPairEvent>,
    /// Number of begin events
    pub begins: usize,
    /// Number of end events
    pub ends: usize,
}

/// Totals accumulated over the run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub ticks: u64,
    pub begins: u64,
    pub ends: u64,
    pub peak_pairs: usize,
    /// Velocity reflections at the arena bounds
    pub bounces: u64,
}

/// Drives a physics world with a fixed timestep inside a square arena
pub struct SimulationSystem {
    dt: f32,
    arena_half_extent: f32,
    log_pair_events: bool,
    stats: SimulationStats,
}

impl SimulationSystem {
    /// Create a new simulation system
    pub fn new(dt: f32, arena_half_extent: f32) -> Self {
        Self {
            dt,
            arena_half_extent,
            log_pair_events: false,
            stats: SimulationStats::default(),
        }
    }

    /// Log every pair event at debug level
    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_pair_events = enabled;
        self
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    /// Run one fixed step
    pub fn update(&mut self, world: &mut PhysicsWorld) -> TickResult {
        self.stats.bounces += self.reflect_at_bounds(world) as u64;

        let events = world.step(self.dt);
        let begins = events
            .iter()
            .filter(|e| e.event.kind == PairEventKind::Begin)
            .count();
        let ends = events.len() - begins;

        if self.log_pair_events {
            for e in &events {
                log::debug!(
                    "tick {} map {:?}: {:?} {:?} <-> {:?}",
                    self.stats.ticks,
                    e.map,
                    e.event.kind,
                    e.event.fixture_a,
                    e.event.fixture_b
                );
            }
        }

        self.stats.ticks += 1;
        self.stats.begins += begins as u64;
        self.stats.ends += ends as u64;
        self.stats.peak_pairs = self.stats.peak_pairs.max(world.broadphase().pair_count());

        TickResult { events, begins, ends }
    }

    /// Flip the velocity component of any dynamic body heading out of the arena
    fn reflect_at_bounds(&self, world: &mut PhysicsWorld) -> usize {
        let limit = self.arena_half_extent;
        let leaving: Vec<(BodyKey, broad2d_math::Vec2)> = world
            .bodies()
            .filter(|(_, body)| body.body_type == BodyType::Dynamic && body.awake)
            .filter_map(|(key, body)| {
                let aabb = world.body_aabb(key)?;
                let mut velocity = body.linear_velocity;
                if (aabb.lower.x < -limit && velocity.x < 0.0) || (aabb.upper.x > limit && velocity.x > 0.0) {
                    velocity.x = -velocity.x;
                }
                if (aabb.lower.y < -limit && velocity.y < 0.0) || (aabb.upper.y > limit && velocity.y > 0.0) {
                    velocity.y = -velocity.y;
                }
                (velocity != body.linear_velocity).then_some((key, velocity))
            })
            .collect();

        for (key, velocity) in &leaving {
            world.set_velocity(*key, *velocity);
        }
        leaving.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broad2d_math::Vec2;
    use broad2d_physics::{Body, CollisionFilter, Fixture, PhysicsConfig, Shape};

    fn world_without_gravity() -> PhysicsWorld {
        PhysicsWorld::with_config(PhysicsConfig::new(Vec2::ZERO))
    }

    #[test]
    fn test_body_bounces_off_bounds() {
        let mut world = world_without_gravity();
        let body = world.add_body(Body::new(Vec2::new(9.5, 0.0)).with_velocity(Vec2::new(5.0, 0.0)));
        world.attach_fixture(Fixture::new(body, Shape::circle(1.0)));

        let mut sim = SimulationSystem::new(1.0 / 60.0, 10.0);
        sim.update(&mut world);

        assert_eq!(sim.stats().bounces, 1);
        assert!(world.body(body).unwrap().linear_velocity.x < 0.0);
    }

    #[test]
    fn test_body_heading_inward_keeps_velocity() {
        let mut world = world_without_gravity();
        let body = world.add_body(Body::new(Vec2::new(9.5, 0.0)).with_velocity(Vec2::new(-5.0, 0.0)));
        world.attach_fixture(Fixture::new(body, Shape::circle(1.0)));

        let mut sim = SimulationSystem::new(1.0 / 60.0, 10.0);
        sim.update(&mut world);

        assert_eq!(sim.stats().bounces, 0);
        assert_eq!(world.body(body).unwrap().linear_velocity, Vec2::new(-5.0, 0.0));
    }

    #[test]
    fn test_stats_count_begin_and_end() {
        let mut world = world_without_gravity();
        let wall = world.add_body(Body::new_static(Vec2::ZERO));
        world.attach_fixture(
            Fixture::new(wall, Shape::rectangle(Vec2::new(0.5, 2.0)))
                .with_filter(CollisionFilter::static_world()),
        );
        let ball = world.add_body(
            Body::new(Vec2::new(-3.0, 0.0))
                .with_velocity(Vec2::new(6.0, 0.0))
                .with_sleeping_allowed(false),
        );
        world.attach_fixture(Fixture::new(ball, Shape::circle(0.5)));

        let mut sim = SimulationSystem::new(1.0 / 60.0, 100.0);
        for _ in 0..120 {
            sim.update(&mut world);
        }

        let stats = sim.stats();
        assert_eq!(stats.ticks, 120);
        assert_eq!(stats.begins, 1);
        assert_eq!(stats.ends, 1);
        assert_eq!(stats.peak_pairs, 1);
        assert_eq!(world.broadphase().pair_count(), 0);
    }
}
