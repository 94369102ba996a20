//! Fixture proxies and broadphase pairs

use slotmap::new_key_type;

use crate::aabb::Aabb;
use crate::body::{BodyKey, BodyType, FixtureKey};
use crate::collision::CollisionFilter;
use crate::tree::Proxy;

new_key_type! {
    /// Key to one fixture proxy (one shape of one fixture) within a map
    pub struct FixtureProxyKey;
}

/// The broadphase's record for one shape of a registered fixture
///
/// Caches everything pair filtering needs so that `update_pairs` never has to
/// reach back into the world.
#[derive(Clone, Debug)]
pub struct FixtureProxy {
    /// Fat AABB as currently stored in the tree
    pub aabb: Aabb,
    pub fixture: FixtureKey,
    pub body: BodyKey,
    /// Index into the fixture's shape list
    pub shape_index: usize,
    /// Leaf handle in the map's tree
    pub proxy: Proxy,
    pub body_type: BodyType,
    pub filter: CollisionFilter,
    pub(crate) dirty: bool,
}

impl FixtureProxy {
    /// Whether this proxy is waiting to be re-paired on the next update
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Unordered pair of proxies, stored with the smaller key first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyPair(FixtureProxyKey, FixtureProxyKey);

impl ProxyPair {
    pub fn new(a: FixtureProxyKey, b: FixtureProxyKey) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    #[inline]
    pub fn first(&self) -> FixtureProxyKey {
        self.0
    }

    #[inline]
    pub fn second(&self) -> FixtureProxyKey {
        self.1
    }

    #[inline]
    pub fn involves(&self, key: FixtureProxyKey) -> bool {
        self.0 == key || self.1 == key
    }
}

/// Whether a pair started or stopped overlapping
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PairEventKind {
    Begin,
    End,
}

/// A pair transition reported by `update_pairs`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PairEvent {
    pub kind: PairEventKind,
    pub fixture_a: FixtureKey,
    pub fixture_b: FixtureKey,
    pub proxy_a: FixtureProxyKey,
    pub proxy_b: FixtureProxyKey,
}

impl PairEvent {
    pub(crate) fn new(kind: PairEventKind, a: &FixtureProxy, b: &FixtureProxy, pair: ProxyPair) -> Self {
        Self {
            kind,
            fixture_a: a.fixture,
            fixture_b: b.fixture,
            proxy_a: pair.first(),
            proxy_b: pair.second(),
        }
    }

    /// Whether the event concerns the given fixture, on either side
    pub fn involves(&self, fixture: FixtureKey) -> bool {
        self.fixture_a == fixture || self.fixture_b == fixture
    }

    /// The fixtures as an order-independent pair
    pub fn fixtures(&self) -> (FixtureKey, FixtureKey) {
        if self.fixture_a <= self.fixture_b {
            (self.fixture_a, self.fixture_b)
        } else {
            (self.fixture_b, self.fixture_a)
        }
    }
}
