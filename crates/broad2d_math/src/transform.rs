//! 2D rigid transform (position, rotation)
//!
//! A Transform2D is the world matrix of a body: fixture shapes are stored in
//! body-local coordinates and mapped into world space through it.

use serde::{Serialize, Deserialize};
use crate::{Rot2, Vec2};

/// A 2D transform with position and rotation (no scale)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    /// Position in world space
    pub position: Vec2,
    /// Rotation about the position
    pub rotation: Rot2,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    /// Create an identity transform
    pub fn identity() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: Rot2::IDENTITY,
        }
    }

    /// Create a transform with just a position
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            rotation: Rot2::IDENTITY,
        }
    }

    /// Create a transform with position and rotation angle in radians
    pub fn from_position_angle(position: Vec2, angle: f32) -> Self {
        Self {
            position,
            rotation: Rot2::from_angle(angle),
        }
    }

    /// Transform a point from local space to world space
    #[inline]
    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        self.rotation.rotate(p) + self.position
    }

    /// Transform a direction from local space to world space
    #[inline]
    pub fn transform_direction(&self, d: Vec2) -> Vec2 {
        self.rotation.rotate(d)
    }

    /// Transform a point from world space back into local space
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec2) -> Vec2 {
        self.rotation.inverse_rotate(p - self.position)
    }

    /// Compute the inverse transform
    pub fn inverse(&self) -> Self {
        let inv_rotation = self.rotation.inverse();
        Self {
            position: inv_rotation.rotate(-self.position),
            rotation: inv_rotation,
        }
    }

    /// Compose two transforms: result = self * other
    ///
    /// The composed transform applies `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(other.position),
            rotation: self.rotation.compose(&other.rotation),
        }
    }

    /// Translate the transform by an offset
    pub fn translate(&mut self, offset: Vec2) {
        self.position += offset;
    }

    /// Rotate the transform in place by an angle in radians
    pub fn rotate(&mut self, radians: f32) {
        self.rotation = Rot2::from_angle(radians).compose(&self.rotation).normalize();
    }

    /// Whether position and rotation are all finite
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.c.is_finite() && self.rotation.s.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < EPSILON
    }

    #[test]
    fn test_transform_point() {
        let t = Transform2D::from_position_angle(Vec2::new(10.0, 0.0), FRAC_PI_2);
        assert!(approx_eq(t.transform_point(Vec2::X), Vec2::new(10.0, 1.0)));
        assert!(approx_eq(t.transform_direction(Vec2::X), Vec2::Y));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Transform2D::from_position_angle(Vec2::new(3.0, -2.0), 0.6);
        let p = Vec2::new(1.5, 7.0);
        assert!(approx_eq(t.inverse().transform_point(t.transform_point(p)), p));
        assert!(approx_eq(t.inverse_transform_point(t.transform_point(p)), p));
    }

    #[test]
    fn test_compose() {
        let a = Transform2D::from_position_angle(Vec2::new(1.0, 0.0), FRAC_PI_2);
        let b = Transform2D::from_position(Vec2::new(2.0, 0.0));
        let p = Vec2::new(0.5, 0.5);
        assert!(approx_eq(a.compose(&b).transform_point(p), a.transform_point(b.transform_point(p))));
    }

    #[test]
    fn test_translate_and_rotate() {
        let mut t = Transform2D::identity();
        t.translate(Vec2::new(1.0, 2.0));
        t.rotate(FRAC_PI_2);
        assert_eq!(t.position, Vec2::new(1.0, 2.0));
        assert!(approx_eq(t.transform_direction(Vec2::X), Vec2::Y));
    }

    #[test]
    fn test_is_finite() {
        assert!(Transform2D::identity().is_finite());
        let bad = Transform2D::from_position(Vec2::new(f32::NAN, 0.0));
        assert!(!bad.is_finite());
    }
}
