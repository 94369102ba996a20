//! SceneBuilder - Declarative scene construction
//!
//! Provides a fluent API for populating a physics world with an arena,
//! sensors and randomly placed bodies.

use broad2d_math::Vec2;
use broad2d_physics::{
    Body, BodyKey, BodyType, CollisionFilter, CollisionLayer, Fixture, MapId, PhysicsConfig,
    PhysicsWorld, Shape,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Thickness of the arena walls
const WALL_THICKNESS: f32 = 1.0;

/// Builder for constructing 2D scenes
///
/// # Example
/// ```ignore
/// let world = SceneBuilder::new(PhysicsConfig::default())
///     .add_arena(MapId::default(), 40.0)
///     .add_sensor(MapId::default(), Vec2::ZERO, Vec2::new(5.0, 5.0))
///     .add_random_bodies(MapId::default(), 200, 40.0, 12.0, 7)
///     .build();
/// ```
pub struct SceneBuilder {
    world: PhysicsWorld,
    walls: Vec<BodyKey>,
    sensors: Vec<BodyKey>,
    dynamic: Vec<BodyKey>,
}

impl SceneBuilder {
    /// Create a new scene builder
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            world: PhysicsWorld::with_config(config),
            walls: Vec::new(),
            sensors: Vec::new(),
            dynamic: Vec::new(),
        }
    }

    /// Add four static walls enclosing the square `[-half_extent, half_extent]`
    pub fn add_arena(mut self, map: MapId, half_extent: f32) -> Self {
        let half_wall = WALL_THICKNESS / 2.0;
        let offset = half_extent + half_wall;
        let span = half_extent + WALL_THICKNESS;

        let walls = [
            (Vec2::new(0.0, -offset), Vec2::new(span, half_wall)),
            (Vec2::new(0.0, offset), Vec2::new(span, half_wall)),
            (Vec2::new(-offset, 0.0), Vec2::new(half_wall, span)),
            (Vec2::new(offset, 0.0), Vec2::new(half_wall, span)),
        ];

        for (position, half_extents) in walls {
            let body = self.world.add_body(Body::new_static(position).with_map(map));
            let fixture = Fixture::new(body, Shape::rectangle(half_extents))
                .with_filter(CollisionFilter::static_world());
            if self.world.attach_fixture(fixture).is_some() {
                self.walls.push(body);
            }
        }

        self
    }

    /// Add a static sensor box that detects dynamic bodies
    pub fn add_sensor(mut self, map: MapId, position: Vec2, half_extents: Vec2) -> Self {
        let body = self.world.add_body(Body::new_static(position).with_map(map));
        let fixture = Fixture::new(body, Shape::rectangle(half_extents))
            .with_filter(CollisionFilter::sensor(CollisionLayer::DYNAMIC))
            .with_hard(false);
        if self.world.attach_fixture(fixture).is_some() {
            self.sensors.push(body);
        }
        self
    }

    /// Add a single dynamic body with one shape
    pub fn add_body(mut self, map: MapId, position: Vec2, velocity: Vec2, shape: Shape) -> Self {
        self.spawn(map, position, velocity, shape);
        self
    }

    /// Scatter `count` circles and boxes inside the arena with random velocities
    ///
    /// The same seed always produces the same scene.
    pub fn add_random_bodies(
        mut self,
        map: MapId,
        count: usize,
        half_extent: f32,
        max_speed: f32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let inner = (half_extent - 1.0).max(0.0);

        for _ in 0..count {
            let position = Vec2::new(rng.gen_range(-inner..=inner), rng.gen_range(-inner..=inner));
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let speed = rng.gen_range(0.0..=max_speed);
            let velocity = Vec2::new(angle.cos(), angle.sin()) * speed;

            let shape = if rng.gen_bool(0.5) {
                Shape::circle(rng.gen_range(0.2..0.8))
            } else {
                Shape::rectangle(Vec2::new(rng.gen_range(0.2..0.8), rng.gen_range(0.2..0.8)))
            };

            self.spawn(map, position, velocity, shape);
        }

        log::debug!("Spawned {} random bodies (seed {})", count, seed);
        self
    }

    fn spawn(&mut self, map: MapId, position: Vec2, velocity: Vec2, shape: Shape) {
        let body = Body::new(position)
            .with_type(BodyType::Dynamic)
            .with_velocity(velocity)
            .with_gravity(false)
            .with_map(map);
        let key = self.world.add_body(body);
        let fixture = Fixture::new(key, shape).with_filter(CollisionFilter::dynamic());
        if self.world.attach_fixture(fixture).is_some() {
            self.dynamic.push(key);
        } else {
            log::warn!("Body at {:?} has no usable fixture, removing it", position);
            self.world.remove_body(key);
        }
    }

    /// Keys of the arena walls added so far
    pub fn walls(&self) -> &[BodyKey] {
        &self.walls
    }

    /// Keys of the sensors added so far
    pub fn sensors(&self) -> &[BodyKey] {
        &self.sensors
    }

    /// Keys of the dynamic bodies added so far
    pub fn dynamic_bodies(&self) -> &[BodyKey] {
        &self.dynamic
    }

    /// Build and return the world
    pub fn build(self) -> PhysicsWorld {
        self.world
    }
}
