//! Collision filtering via layer masks
//!
//! Every fixture carries a layer (what it is) and a mask (what it wants to
//! touch). The broadphase only forms a pair when the filters of both sides pass
//! under the configured [`FilterRule`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Collision layers for filtering which fixtures can pair up
    ///
    /// Each layer is a bit in a 32-bit mask. A fixture can belong to several
    /// layers. Bits without a name are kept as-is, so raw masks from data files
    /// round-trip unchanged.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CollisionLayer: u32 {
        /// Default layer for most fixtures
        const DEFAULT = 1 << 0;
        /// Static world geometry (floors, walls)
        const STATIC = 1 << 1;
        /// Simulated bodies
        const DYNAMIC = 1 << 2;
        /// Sensors detect overlap but are not solid
        const SENSOR = 1 << 3;
        /// Small props that only collide with the world
        const DEBRIS = 1 << 4;
        /// All layers
        const ALL = 0xFFFFFFFF;
    }
}

/// How two filters are combined when deciding whether a pair may form
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterRule {
    /// Both sides must accept each other: `A.layer & B.mask` and `B.layer & A.mask`
    #[default]
    Mutual,
    /// One side accepting the other is enough: `A.layer & B.mask || B.layer & A.mask`
    ///
    /// A pair is only rejected when both directions fail. Use this when porting
    /// masks written for the permissive layer/mask test.
    Either,
}

/// Collision filter determining what a fixture pairs with
///
/// - `layer`: which layer(s) this fixture belongs to
/// - `mask`: which layer(s) this fixture wants to pair with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layer: CollisionLayer,
    pub mask: CollisionLayer,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: CollisionLayer::DEFAULT,
            mask: CollisionLayer::ALL,
        }
    }
}

impl CollisionFilter {
    pub fn new(layer: CollisionLayer, mask: CollisionLayer) -> Self {
        Self { layer, mask }
    }

    /// Build a filter from raw bits, keeping bits that have no named layer
    pub fn from_bits(layer: u32, mask: u32) -> Self {
        Self {
            layer: CollisionLayer::from_bits_retain(layer),
            mask: CollisionLayer::from_bits_retain(mask),
        }
    }

    /// Whether this fixture accepts `other` (its layer is in our mask)
    #[inline]
    pub fn accepts(&self, other: &Self) -> bool {
        self.mask.intersects(other.layer)
    }

    /// Check whether a pair between the two filters may form under `rule`
    pub fn passes(&self, other: &Self, rule: FilterRule) -> bool {
        match rule {
            FilterRule::Mutual => self.accepts(other) && other.accepts(self),
            FilterRule::Either => self.accepts(other) || other.accepts(self),
        }
    }

    /// Filter for static world geometry, detected by everything
    pub fn static_world() -> Self {
        Self {
            layer: CollisionLayer::STATIC,
            mask: CollisionLayer::ALL,
        }
    }

    /// Filter for ordinary simulated bodies
    pub fn dynamic() -> Self {
        Self {
            layer: CollisionLayer::DYNAMIC,
            mask: CollisionLayer::ALL,
        }
    }

    /// Filter for a sensor that detects the given layers
    pub fn sensor(detects: CollisionLayer) -> Self {
        Self {
            layer: CollisionLayer::SENSOR,
            mask: detects,
        }
    }

    /// Debris only collides with static geometry
    pub fn debris() -> Self {
        Self {
            layer: CollisionLayer::DEBRIS,
            mask: CollisionLayer::STATIC,
        }
    }
}
