//! 2D broadphase collision detection for broad2d
//!
//! This crate provides:
//! - A dynamic AABB tree with fat margins, generational proxy handles and lazy queries
//! - Fixture proxies and a per-map broadphase that maintains the overlapping pair set
//! - A multi-map broadphase system producing pair begin/end events
//! - Collision layers and filters, shapes, bodies and fixtures
//! - A physics world that integrates motion and drives the broadphase
//! - Debug drawing of the world through a draw handle

pub mod aabb;
pub mod body;
pub mod broadphase;
pub mod collision;
pub mod debug;
pub mod error;
pub mod proxy;
pub mod shapes;
pub mod system;
pub mod tree;
pub mod world;

// Re-export commonly used types
pub use aabb::Aabb;
pub use body::{Body, BodyKey, BodyType, Fixture, FixtureKey};
pub use broadphase::{BroadphaseConfig, FixtureRayHit, FixtureRayQuery, MapBroadphase};
pub use collision::{CollisionFilter, CollisionLayer, FilterRule};
pub use debug::{DebugDrawHandle, DebugOverlay, DrawCommand, DrawCommandBuffer, OverlaySettings};
pub use error::BroadphaseError;
pub use proxy::{FixtureProxy, FixtureProxyKey, PairEvent, PairEventKind};
pub use shapes::{Circle, Edge, Polygon, Shape};
pub use system::{BroadphaseSystem, MapId, MapPairEvent};
pub use tree::{AabbQuery, DynamicTree, FatMargins, Proxy, RayCandidate, RayQuery};
pub use world::{PhysicsConfig, PhysicsWorld};
