//! Axis-aligned bounding boxes
//!
//! The only geometry the dynamic tree knows about. Boxes coming in from the
//! outside are validated with [`Aabb::try_new`] / [`Aabb::validate`] so that a
//! NaN never reaches the tree.

use broad2d_math::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::BroadphaseError;

/// A 2D axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub lower: Vec2,
    /// Maximum corner
    pub upper: Vec2,
}

impl Aabb {
    /// Create a new AABB from lower and upper corners without validation
    #[inline]
    pub const fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Create a new AABB, rejecting non-finite or inverted bounds
    pub fn try_new(lower: Vec2, upper: Vec2) -> Result<Self, BroadphaseError> {
        let aabb = Self { lower, upper };
        aabb.validate()?;
        Ok(aabb)
    }

    /// Create an AABB centered at a position with given half-extents
    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            lower: center - half_extents,
            upper: center + half_extents,
        }
    }

    /// Smallest AABB containing every point, or `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |acc, p| Self {
            lower: acc.lower.min_components(p),
            upper: acc.upper.max_components(p),
        }))
    }

    /// Check that all components are finite and `lower <= upper` on both axes
    pub fn validate(&self) -> Result<(), BroadphaseError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(BroadphaseError::InvalidBounds {
                lower: self.lower,
                upper: self.upper,
            })
        }
    }

    /// Whether the box is finite and not inverted
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.lower.is_finite()
            && self.upper.is_finite()
            && self.lower.x <= self.upper.x
            && self.lower.y <= self.upper.y
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    /// Get the half-extents (half the size in each dimension)
    #[inline]
    pub fn half_extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    /// Get the full size in each dimension
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.upper - self.lower
    }

    /// Perimeter, the 2D stand-in for surface area in insertion cost
    #[inline]
    pub fn perimeter(&self) -> f32 {
        let size = self.size();
        2.0 * (size.x + size.y)
    }

    /// Smallest AABB containing both boxes
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lower: self.lower.min_components(other.lower),
            upper: self.upper.max_components(other.upper),
        }
    }

    /// Whether `other` lies entirely inside this box (touching edges count)
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// Check if a point is inside or on the AABB
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.lower.x
            && point.x <= self.upper.x
            && point.y >= self.lower.y
            && point.y <= self.upper.y
    }

    /// Whether the two boxes overlap (touching edges count)
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lower.x <= other.upper.x
            && other.lower.x <= self.upper.x
            && self.lower.y <= other.upper.y
            && other.lower.y <= self.upper.y
    }

    /// Grow the box by `margin` on every side
    #[inline]
    pub fn fattened(&self, margin: f32) -> Self {
        let m = Vec2::splat(margin);
        Self {
            lower: self.lower - m,
            upper: self.upper + m,
        }
    }

    /// Stretch the box in the direction of `displacement` only
    #[inline]
    pub fn extended(&self, displacement: Vec2) -> Self {
        let mut out = *self;
        if displacement.x < 0.0 {
            out.lower.x += displacement.x;
        } else {
            out.upper.x += displacement.x;
        }
        if displacement.y < 0.0 {
            out.lower.y += displacement.y;
        } else {
            out.upper.y += displacement.y;
        }
        out
    }

    /// Translate the AABB by a delta
    #[inline]
    pub fn translated(&self, delta: Vec2) -> Self {
        Self {
            lower: self.lower + delta,
            upper: self.upper + delta,
        }
    }

    /// Slab test of the ray `origin + t * direction` for `t` in `[0, max_fraction]`
    ///
    /// Returns the entry fraction (0 if the origin is already inside).
    pub fn ray_intersection(&self, origin: Vec2, direction: Vec2, max_fraction: f32) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = max_fraction;

        for (o, d, lo, hi) in [
            (origin.x, direction.x, self.lower.x, self.upper.x),
            (origin.y, direction.y, self.lower.y, self.upper.y),
        ] {
            if d.abs() < f32::EPSILON {
                // parallel to this slab
                if o < lo || o > hi {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d;
                let mut t1 = (lo - o) * inv_d;
                let mut t2 = (hi - o) * inv_d;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        Some(t_min)
    }
}
