//! Physics world and simulation
//!
//! Owns bodies and fixtures, integrates motion and keeps the broadphase in
//! step with it. There is no narrow phase or solver: a step ends with the pair
//! events the broadphase produced.

use broad2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

use crate::aabb::Aabb;
use crate::body::{Body, BodyKey, BodyType, Fixture, FixtureKey};
use crate::broadphase::{BroadphaseConfig, FixtureRayQuery};
use crate::collision::CollisionFilter;
use crate::system::{BroadphaseSystem, MapId, MapPairEvent};

/// Configuration for the physics simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration [x, y]
    pub gravity: [f32; 2],
    /// Seconds a body must stay below the sleep tolerances before it sleeps
    pub time_to_sleep: f32,
    /// Linear speed under which a body counts as resting
    pub linear_sleep_tolerance: f32,
    /// Angular speed under which a body counts as resting
    pub angular_sleep_tolerance: f32,
    pub broadphase: BroadphaseConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -20.0],
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0_f32.to_radians(),
            broadphase: BroadphaseConfig::default(),
        }
    }
}

impl PhysicsConfig {
    /// Create a physics config with the given gravity vector
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity: gravity.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn gravity(&self) -> Vec2 {
        Vec2::from(self.gravity)
    }
}

/// The physics world containing all bodies and fixtures
pub struct PhysicsWorld {
    bodies: SlotMap<BodyKey, Body>,
    fixtures: SlotMap<FixtureKey, Fixture>,
    body_fixtures: SecondaryMap<BodyKey, Vec<FixtureKey>>,
    broadphase: BroadphaseSystem,
    config: PhysicsConfig,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// Create a new physics world with default configuration
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Create a new physics world with custom configuration
    pub fn with_config(config: PhysicsConfig) -> Self {
        Self {
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            body_fixtures: SecondaryMap::new(),
            broadphase: BroadphaseSystem::new(config.broadphase),
            config,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Set gravity; broadphase settings are fixed at construction
    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity.into();
    }

    pub fn broadphase(&self) -> &BroadphaseSystem {
        &self.broadphase
    }

    //
    // Bodies
    //

    /// Add a body to the world and return its key
    pub fn add_body(&mut self, body: Body) -> BodyKey {
        let key = self.bodies.insert(body);
        self.body_fixtures.insert(key, Vec::new());
        key
    }

    /// Remove a body and all of its fixtures
    pub fn remove_body(&mut self, key: BodyKey) -> Option<Body> {
        let fixtures = self.body_fixtures.remove(key).unwrap_or_default();
        for fixture in fixtures {
            self.broadphase.unregister_fixture(fixture);
            self.fixtures.remove(fixture);
        }
        self.bodies.remove(key)
    }

    pub fn body(&self, key: BodyKey) -> Option<&Body> {
        self.bodies.get(key)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &Body)> + '_ {
        self.bodies.iter()
    }

    /// Teleport a body and synchronize its fixtures immediately
    pub fn set_transform(&mut self, key: BodyKey, transform: Transform2D) -> bool {
        let Some(body) = self.bodies.get_mut(key) else {
            return false;
        };
        body.transform = transform;
        body.wake();
        self.sync_body(key);
        true
    }

    pub fn set_velocity(&mut self, key: BodyKey, velocity: Vec2) -> bool {
        let Some(body) = self.bodies.get_mut(key) else {
            return false;
        };
        body.linear_velocity = velocity;
        body.wake();
        true
    }

    /// Change a body's type; its fixtures are registered again so pairs are re-filtered
    pub fn set_body_type(&mut self, key: BodyKey, body_type: BodyType) -> bool {
        let Some(body) = self.bodies.get_mut(key) else {
            return false;
        };
        body.body_type = body_type;
        if body_type != BodyType::Dynamic {
            body.affected_by_gravity = false;
        }
        self.reregister_body(key);
        true
    }

    /// Move a body's fixtures into another map's broadphase
    pub fn set_body_map(&mut self, key: BodyKey, map: MapId) -> bool {
        let Some(body) = self.bodies.get_mut(key) else {
            return false;
        };
        if body.map == map {
            return true;
        }
        body.map = map;
        let body = &self.bodies[key];
        for &fixture_key in self.body_fixtures.get(key).into_iter().flatten() {
            self.broadphase
                .move_fixture_to_map(fixture_key, map, &self.fixtures[fixture_key], body);
        }
        true
    }

    pub fn wake_body(&mut self, key: BodyKey) {
        if let Some(body) = self.bodies.get_mut(key) {
            body.wake();
        }
    }

    //
    // Fixtures
    //

    /// Attach a fixture to its body and register it with the body's map
    ///
    /// Returns `None` if the owning body does not exist. A fixture whose shapes
    /// cannot be bounded is still attached, but disabled in the broadphase.
    pub fn attach_fixture(&mut self, fixture: Fixture) -> Option<FixtureKey> {
        let body = self.bodies.get(fixture.body)?;
        let map = body.map;
        let body_key = fixture.body;
        let key = self.fixtures.insert(fixture);
        self.broadphase
            .register_fixture(map, key, &self.fixtures[key], &self.bodies[body_key]);
        if let Some(list) = self.body_fixtures.get_mut(body_key) {
            list.push(key);
        }
        Some(key)
    }

    /// Detach a fixture and drop its proxies
    pub fn remove_fixture(&mut self, key: FixtureKey) -> Option<Fixture> {
        let fixture = self.fixtures.remove(key)?;
        self.broadphase.unregister_fixture(key);
        if let Some(list) = self.body_fixtures.get_mut(fixture.body) {
            list.retain(|k| *k != key);
        }
        Some(fixture)
    }

    pub fn fixture(&self, key: FixtureKey) -> Option<&Fixture> {
        self.fixtures.get(key)
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn fixtures_of(&self, body: BodyKey) -> &[FixtureKey] {
        self.body_fixtures.get(body).map_or(&[], Vec::as_slice)
    }

    /// Replace a fixture's collision filter; pairs are re-evaluated next step
    pub fn set_fixture_filter(&mut self, key: FixtureKey, filter: CollisionFilter) -> bool {
        let Some(fixture) = self.fixtures.get_mut(key) else {
            return false;
        };
        fixture.filter = filter;
        self.broadphase.refilter_fixture(key, filter);
        true
    }

    /// World-space union of a body's fixture bounds
    pub fn body_aabb(&self, key: BodyKey) -> Option<Aabb> {
        let body = self.bodies.get(key)?;
        self.fixtures_of(key)
            .iter()
            .filter_map(|f| self.fixtures.get(*f))
            .flat_map(|f| f.shapes.iter())
            .filter_map(|shape| shape.compute_aabb(&body.transform).ok())
            .reduce(|a, b| a.union(&b))
    }

    //
    // Queries
    //

    pub fn query_region(&self, map: MapId, region: Aabb) -> impl Iterator<Item = FixtureKey> + '_ {
        self.broadphase.query_region(map, region)
    }

    pub fn query_point(&self, map: MapId, point: Vec2) -> impl Iterator<Item = FixtureKey> + '_ {
        self.broadphase.query_point(map, point)
    }

    pub fn ray_query(
        &self,
        map: MapId,
        origin: Vec2,
        direction: Vec2,
        max_fraction: f32,
    ) -> Option<FixtureRayQuery<'_>> {
        self.broadphase.ray_query(map, origin, direction, max_fraction)
    }

    //
    // Simulation
    //

    /// Step the simulation forward by dt seconds
    ///
    /// 1. Integrate gravity and velocity for awake non-static bodies
    /// 2. Advance sleep timers, putting resting bodies to sleep
    /// 3. Synchronize the fixtures of every body that moved
    /// 4. Refresh the pairs of every map
    pub fn step(&mut self, dt: f32) -> Vec<MapPairEvent> {
        let gravity = self.config.gravity();
        let linear_tolerance_sq = self.config.linear_sleep_tolerance * self.config.linear_sleep_tolerance;
        let mut moved = Vec::new();

        for (key, body) in self.bodies.iter_mut() {
            if body.body_type == BodyType::Static || !body.awake {
                continue;
            }

            if body.body_type == BodyType::Dynamic && body.affected_by_gravity {
                body.linear_velocity += gravity * dt;
            }

            let displacement = body.linear_velocity * dt;
            let rotation = body.angular_velocity * dt;
            if displacement != Vec2::ZERO || rotation != 0.0 {
                body.transform.translate(displacement);
                body.transform.rotate(rotation);
                moved.push(key);
            }

            let resting = body.linear_velocity.length_squared() <= linear_tolerance_sq
                && body.angular_velocity.abs() <= self.config.angular_sleep_tolerance;
            if body.sleeping_allowed && resting {
                body.sleep_time += dt;
                if body.sleep_time >= self.config.time_to_sleep {
                    body.sleep();
                }
            } else {
                body.sleep_time = 0.0;
            }
        }

        for key in moved {
            self.sync_body(key);
        }

        self.broadphase.update_all_pairs()
    }

    fn sync_body(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get(key) else {
            return;
        };
        for &fixture_key in self.body_fixtures.get(key).into_iter().flatten() {
            if let Some(fixture) = self.fixtures.get(fixture_key) {
                self.broadphase.synchronize_fixture(fixture_key, fixture, body);
            }
        }
    }

    fn reregister_body(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get(key) else {
            return;
        };
        for &fixture_key in self.body_fixtures.get(key).into_iter().flatten() {
            if let Some(fixture) = self.fixtures.get(fixture_key) {
                self.broadphase.register_fixture(body.map, fixture_key, fixture, body);
            }
        }
    }
}
