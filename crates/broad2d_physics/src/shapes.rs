//! Collision shapes for 2D fixtures
//!
//! The shape set is closed: circles, convex polygons and edges. Geometry is
//! stored in body-local coordinates; bounds are computed through the body's
//! world transform.

use broad2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use crate::aabb::Aabb;
use crate::error::BroadphaseError;

/// A circle in body-local coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    /// World-space bounds: transformed center ± radius
    pub fn compute_aabb(&self, transform: &Transform2D) -> Result<Aabb, BroadphaseError> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(BroadphaseError::DegenerateShape("circle radius is negative or not finite"));
        }
        if !self.center.is_finite() {
            return Err(BroadphaseError::DegenerateShape("circle center is not finite"));
        }
        let center = transform.transform_point(self.center);
        Aabb::try_new(center - Vec2::splat(self.radius), center + Vec2::splat(self.radius))
    }
}

/// A convex polygon, vertices in body-local coordinates
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Vec2>,
}

impl Polygon {
    pub fn new(vertices: Vec<Vec2>) -> Self {
        Self { vertices }
    }

    /// Axis-aligned box centered on the body origin
    pub fn rectangle(half_extents: Vec2) -> Self {
        let h = half_extents;
        Self::new(vec![
            Vec2::new(-h.x, -h.y),
            Vec2::new(h.x, -h.y),
            Vec2::new(h.x, h.y),
            Vec2::new(-h.x, h.y),
        ])
    }

    /// World-space bounds: extrema of the transformed vertices
    pub fn compute_aabb(&self, transform: &Transform2D) -> Result<Aabb, BroadphaseError> {
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(BroadphaseError::DegenerateShape("polygon vertex is not finite"));
        }
        let bounds = Aabb::from_points(self.vertices.iter().map(|v| transform.transform_point(*v)))
            .ok_or(BroadphaseError::DegenerateShape("polygon has no vertices"))?;
        bounds.validate()?;
        Ok(bounds)
    }
}

/// A line segment in body-local coordinates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub a: Vec2,
    pub b: Vec2,
}

impl Edge {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b }
    }

    pub fn compute_aabb(&self, transform: &Transform2D) -> Result<Aabb, BroadphaseError> {
        if !self.a.is_finite() || !self.b.is_finite() {
            return Err(BroadphaseError::DegenerateShape("edge endpoint is not finite"));
        }
        let a = transform.transform_point(self.a);
        let b = transform.transform_point(self.b);
        Aabb::try_new(a.min_components(b), a.max_components(b))
    }
}

/// Closed set of shapes a fixture may be built from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
    Edge(Edge),
}

impl Shape {
    /// Circle at the body origin
    pub fn circle(radius: f32) -> Self {
        Shape::Circle(Circle::new(Vec2::ZERO, radius))
    }

    /// Axis-aligned box at the body origin
    pub fn rectangle(half_extents: Vec2) -> Self {
        Shape::Polygon(Polygon::rectangle(half_extents))
    }

    pub fn edge(a: Vec2, b: Vec2) -> Self {
        Shape::Edge(Edge::new(a, b))
    }

    /// Tight world-space bounds of the shape under `transform`
    ///
    /// Fails with `DegenerateShape` if the geometry cannot be bounded and with
    /// `InvalidBounds` if the transform produces a non-finite box.
    pub fn compute_aabb(&self, transform: &Transform2D) -> Result<Aabb, BroadphaseError> {
        match self {
            Shape::Circle(c) => c.compute_aabb(transform),
            Shape::Polygon(p) => p.compute_aabb(transform),
            Shape::Edge(e) => e.compute_aabb(transform),
        }
    }

    /// Short name of the variant, for the debug panel
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Circle(_) => "circle",
            Shape::Polygon(_) => "polygon",
            Shape::Edge(_) => "edge",
        }
    }
}
