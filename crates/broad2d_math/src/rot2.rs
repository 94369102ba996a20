//! 2D rotation
//!
//! Stored as the cosine/sine pair of the angle so rotating a vector is
//! a couple of multiplies instead of a trig call.

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};
use crate::Vec2;

/// A rotation in the plane
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Rot2 {
    /// Cosine of the rotation angle
    pub c: f32,
    /// Sine of the rotation angle
    pub s: f32,
}

impl Default for Rot2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot2 {
    pub const IDENTITY: Self = Self { c: 1.0, s: 0.0 };

    /// Create a rotation from an angle in radians (counter-clockwise)
    #[inline]
    pub fn from_angle(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self { c, s }
    }

    /// The rotation angle in radians, in `(-PI, PI]`
    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Rotate a vector
    #[inline]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Rotate a vector by the inverse of this rotation
    #[inline]
    pub fn inverse_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// The inverse rotation
    #[inline]
    pub fn inverse(&self) -> Self {
        Self { c: self.c, s: -self.s }
    }

    /// Compose two rotations: the result applies `other` first, then `self`
    #[inline]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            c: self.c * other.c - self.s * other.s,
            s: self.s * other.c + self.c * other.s,
        }
    }

    /// Re-normalize after accumulated floating point drift
    #[inline]
    pub fn normalize(&self) -> Self {
        let len = (self.c * self.c + self.s * self.s).sqrt();
        if len > 0.0 {
            Self { c: self.c / len, s: self.s / len }
        } else {
            Self::IDENTITY
        }
    }

    /// Local X axis in world space
    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Local Y axis in world space
    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }
}
