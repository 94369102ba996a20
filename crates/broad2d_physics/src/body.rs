//! Bodies and fixtures
//!
//! These are the collaborators the broadphase reads from: a body owns a world
//! transform and motion state, a fixture owns shape geometry and a collision
//! filter. Neither is owned by the broadphase; it only keeps their keys.

use broad2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::collision::CollisionFilter;
use crate::shapes::Shape;
use crate::system::MapId;

new_key_type! {
    /// Key to a body in the physics world
    ///
    /// Generational, so a key to a removed body never resolves to whatever
    /// body later reuses its slot.
    pub struct BodyKey;
}

new_key_type! {
    /// Key to a fixture in the physics world
    pub struct FixtureKey;
}

/// How a body participates in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves
    Static,
    /// Moves by its velocity only, unaffected by gravity
    Kinematic,
    /// Fully simulated
    #[default]
    Dynamic,
}

/// A 2D rigid body
#[derive(Clone, Debug)]
pub struct Body {
    pub body_type: BodyType,
    /// World transform applied to every fixture shape
    pub transform: Transform2D,
    /// Units per second
    pub linear_velocity: Vec2,
    /// Radians per second
    pub angular_velocity: f32,
    pub affected_by_gravity: bool,
    /// Sleeping bodies are not integrated
    pub awake: bool,
    /// Whether the body may fall asleep at all
    pub sleeping_allowed: bool,
    /// Seconds spent below the sleep tolerance
    pub sleep_time: f32,
    /// Partition whose broadphase holds this body's fixtures
    pub map: MapId,
}

impl Body {
    /// Create a dynamic body at a position
    pub fn new(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            transform: Transform2D::from_position(position),
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            affected_by_gravity: true,
            awake: true,
            sleeping_allowed: true,
            sleep_time: 0.0,
            map: MapId::default(),
        }
    }

    /// Create a static body at a position
    pub fn new_static(position: Vec2) -> Self {
        Self::new(position).with_type(BodyType::Static)
    }

    /// Set the body type; static and kinematic bodies ignore gravity
    pub fn with_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        if body_type != BodyType::Dynamic {
            self.affected_by_gravity = false;
        }
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: f32) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.transform = Transform2D::from_position_angle(self.transform.position, angle);
        self
    }

    pub fn with_gravity(mut self, affected: bool) -> Self {
        self.affected_by_gravity = affected;
        self
    }

    pub fn with_map(mut self, map: MapId) -> Self {
        self.map = map;
        self
    }

    pub fn with_sleeping_allowed(mut self, allowed: bool) -> Self {
        self.sleeping_allowed = allowed;
        self
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Reset the sleep timer and wake the body
    pub fn wake(&mut self) {
        self.awake = true;
        self.sleep_time = 0.0;
    }

    /// Put the body to sleep, zeroing its motion
    pub fn sleep(&mut self) {
        self.awake = false;
        self.linear_velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
    }
}

/// A collidable part of a body
///
/// Holds one shape, or several for a compound fixture. The broadphase
/// creates one proxy per shape.
#[derive(Clone, Debug)]
pub struct Fixture {
    pub body: BodyKey,
    pub shapes: Vec<Shape>,
    pub filter: CollisionFilter,
    /// Solid fixtures produce contacts; non-hard ones only report overlap
    pub hard: bool,
}

impl Fixture {
    /// Create a fixture with a single shape and the default filter
    pub fn new(body: BodyKey, shape: Shape) -> Self {
        Self::compound(body, vec![shape])
    }

    /// Create a fixture made of several shapes
    pub fn compound(body: BodyKey, shapes: Vec<Shape>) -> Self {
        Self {
            body,
            shapes,
            filter: CollisionFilter::default(),
            hard: true,
        }
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_hard(mut self, hard: bool) -> Self {
        self.hard = hard;
        self
    }
}
