//! Per-map broadphase
//!
//! [`MapBroadphase`] bridges fixtures to one [`DynamicTree`]: it owns a proxy
//! record per fixture shape, buffers proxies that moved since the last pair
//! update, and maintains the set of overlapping pairs between ticks.
//!
//! Data errors (a degenerate shape, bounds that are not finite) never stop the
//! tick. The offending fixture is disabled and logged once; it stays out of
//! queries and pairs until it is registered again. A tree that rejects one of
//! our own proxy handles means the two have diverged, which is fatal.

use std::collections::{BTreeSet, HashMap, HashSet};

use broad2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::aabb::Aabb;
use crate::body::{Body, BodyType, Fixture, FixtureKey};
use crate::collision::{CollisionFilter, FilterRule};
use crate::error::BroadphaseError;
use crate::proxy::{FixtureProxy, FixtureProxyKey, PairEvent, PairEventKind, ProxyPair};
use crate::shapes::Shape;
use crate::tree::{
    DynamicTree, FatMargins, RayQuery, DEFAULT_AABB_MARGIN, DEFAULT_DISPLACEMENT_MULTIPLIER,
    DEFAULT_MAX_EXTENSION,
};

const TREE_DESYNC: &str = "broadphase proxy table and tree are out of sync";

/// Tuning and filtering options for the broadphase
///
/// The margins trade query precision for tree stability: a larger margin or
/// displacement stretch means fewer reinsertions under motion but more false
/// positive candidates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadphaseConfig {
    /// Fixed margin added on every side of a tight AABB
    pub aabb_margin: f32,
    /// Scale applied to the predicted displacement
    pub displacement_multiplier: f32,
    /// Cap on the length of the displacement stretch
    pub max_displacement_extension: f32,
    /// Seconds of linear velocity used as the predicted displacement
    pub velocity_lookahead: f32,
    /// Allow pairs between different fixtures of the same body
    pub self_collision: bool,
    /// How the layer/mask test combines both sides
    pub filter_rule: FilterRule,
}

impl Default for BroadphaseConfig {
    fn default() -> Self {
        Self {
            aabb_margin: DEFAULT_AABB_MARGIN,
            displacement_multiplier: DEFAULT_DISPLACEMENT_MULTIPLIER,
            max_displacement_extension: DEFAULT_MAX_EXTENSION,
            velocity_lookahead: 1.0 / 60.0,
            self_collision: false,
            filter_rule: FilterRule::Mutual,
        }
    }
}

impl BroadphaseConfig {
    pub fn fat_margins(&self) -> FatMargins {
        FatMargins {
            margin: self.aabb_margin,
            displacement_multiplier: self.displacement_multiplier,
            max_extension: self.max_displacement_extension,
        }
    }

    /// Displacement the tree should stretch a box along for a body moving at `velocity`
    pub fn predicted_displacement(&self, velocity: Vec2) -> Vec2 {
        velocity * self.velocity_lookahead
    }

    /// Full pair filter: self pairs, static/static pairs, then layers and masks
    pub fn should_pair(&self, a: &FixtureProxy, b: &FixtureProxy) -> bool {
        if a.fixture == b.fixture {
            return false;
        }
        if !self.self_collision && a.body == b.body {
            return false;
        }
        if a.body_type != BodyType::Dynamic && b.body_type != BodyType::Dynamic {
            return false;
        }
        a.filter.passes(&b.filter, self.filter_rule)
    }
}

/// The broadphase for a single map
#[derive(Debug)]
pub struct MapBroadphase {
    config: BroadphaseConfig,
    tree: DynamicTree<FixtureProxyKey>,
    proxies: SlotMap<FixtureProxyKey, FixtureProxy>,
    fixture_proxies: HashMap<FixtureKey, Vec<FixtureProxyKey>>,
    /// Proxies to re-pair on the next update, each at most once
    move_buffer: Vec<FixtureProxyKey>,
    pairs: BTreeSet<ProxyPair>,
    disabled: HashSet<FixtureKey>,
    /// End events produced outside `update_pairs` (by unregistering)
    pending_events: Vec<PairEvent>,
}

impl Default for MapBroadphase {
    fn default() -> Self {
        Self::new(BroadphaseConfig::default())
    }
}

impl MapBroadphase {
    pub fn new(config: BroadphaseConfig) -> Self {
        Self {
            config,
            tree: DynamicTree::with_margins(config.fat_margins()),
            proxies: SlotMap::with_key(),
            fixture_proxies: HashMap::new(),
            move_buffer: Vec::new(),
            pairs: BTreeSet::new(),
            disabled: HashSet::new(),
            pending_events: Vec::new(),
        }
    }

    pub fn config(&self) -> &BroadphaseConfig {
        &self.config
    }

    /// Read access to the underlying tree, for statistics and debug drawing
    pub fn tree(&self) -> &DynamicTree<FixtureProxyKey> {
        &self.tree
    }

    //
    // Proxy lifecycle
    //

    /// Create one proxy per shape of `fixture` and insert them into the tree
    ///
    /// Registering a fixture that is already present with the same number of
    /// shapes refreshes its proxies in place, so pairs that still pass the
    /// filter survive without events. A different shape count replaces them.
    /// If any shape cannot be bounded, the fixture is disabled instead and
    /// an empty list is returned. New proxies are paired on the next update.
    pub fn register_fixture(
        &mut self,
        key: FixtureKey,
        fixture: &Fixture,
        body: &Body,
    ) -> Vec<FixtureProxyKey> {
        if let Some(existing) = self.fixture_proxies.get(&key).cloned() {
            if existing.len() == fixture.shapes.len() {
                return self.refresh_proxies(key, existing, fixture, body);
            }
        }
        self.remove_proxies(key);

        let bounds: Result<Vec<Aabb>, BroadphaseError> = fixture
            .shapes
            .iter()
            .map(|shape| shape.compute_aabb(&body.transform))
            .collect();
        let bounds = match bounds {
            Ok(bounds) => bounds,
            Err(err) => {
                self.disable(key, &err);
                return Vec::new();
            }
        };

        let displacement = self.config.predicted_displacement(body.linear_velocity);
        let mut created = Vec::with_capacity(bounds.len());
        for (shape_index, aabb) in bounds.into_iter().enumerate() {
            let tree = &mut self.tree;
            let inserted = self.proxies.try_insert_with_key(|proxy_key| {
                let proxy = tree.insert_predicted(aabb, displacement, proxy_key)?;
                Ok::<_, BroadphaseError>(FixtureProxy {
                    aabb: tree.fat_aabb(proxy)?,
                    fixture: key,
                    body: fixture.body,
                    shape_index,
                    proxy,
                    body_type: body.body_type,
                    filter: fixture.filter,
                    dirty: false,
                })
            });
            match inserted {
                Ok(proxy_key) => created.push(proxy_key),
                Err(err) => {
                    // undo the shapes that did make it in
                    self.fixture_proxies.insert(key, created);
                    self.remove_proxies(key);
                    self.disable(key, &err);
                    return Vec::new();
                }
            }
        }

        self.disabled.remove(&key);
        for &proxy_key in &created {
            self.mark_dirty(proxy_key);
        }
        log::trace!("registered fixture {:?} with {} proxies", key, created.len());
        self.fixture_proxies.insert(key, created.clone());
        created
    }

    /// Remove every proxy of a fixture, ending all of its pairs
    ///
    /// Also forgets that the fixture was disabled. Returns the number of proxies removed.
    pub fn unregister_fixture(&mut self, key: FixtureKey) -> usize {
        self.disabled.remove(&key);
        let removed = self.remove_proxies(key);
        if removed > 0 {
            log::trace!("unregistered fixture {:?} ({} proxies)", key, removed);
        }
        removed
    }

    /// Move one proxy to the bounds of `shape` under a new transform
    ///
    /// Returns `Ok(true)` if the proxy still fit in its fat AABB and `Ok(false)`
    /// if it was reinserted (and marked dirty). Data errors are returned for the
    /// caller to handle; [`synchronize_fixture`][Self::synchronize_fixture]
    /// disables the fixture on them.
    pub fn synchronize_proxy(
        &mut self,
        proxy_key: FixtureProxyKey,
        shape: &Shape,
        transform: &Transform2D,
        velocity: Vec2,
    ) -> Result<bool, BroadphaseError> {
        let proxy = self
            .proxies
            .get(proxy_key)
            .ok_or(BroadphaseError::UnknownProxy)?
            .proxy;
        let tight = shape.compute_aabb(transform)?;
        let displacement = self.config.predicted_displacement(velocity);

        let in_place = match self.tree.move_proxy(proxy, tight, displacement) {
            Err(BroadphaseError::UnknownProxy) => panic!("{}", TREE_DESYNC),
            other => other?,
        };
        if !in_place {
            let fat = self.tree.fat_aabb(proxy).expect(TREE_DESYNC);
            if let Some(record) = self.proxies.get_mut(proxy_key) {
                record.aabb = fat;
            }
            self.mark_dirty(proxy_key);
        }
        Ok(in_place)
    }

    /// Synchronize every proxy of a fixture with its body's current transform
    ///
    /// Returns how many proxies were reinserted. A disabled fixture is
    /// registered again, so it comes back once its body has usable bounds.
    /// A fixture whose shape list changed length is registered again.
    pub fn synchronize_fixture(&mut self, key: FixtureKey, fixture: &Fixture, body: &Body) -> usize {
        if self.disabled.contains(&key) {
            return self.register_fixture(key, fixture, body).len();
        }
        let Some(proxy_keys) = self.fixture_proxies.get(&key).cloned() else {
            return 0;
        };
        if proxy_keys.len() != fixture.shapes.len() {
            return self.register_fixture(key, fixture, body).len();
        }

        let mut reinserted = 0;
        for proxy_key in proxy_keys {
            let Some(shape_index) = self.proxies.get(proxy_key).map(|p| p.shape_index) else {
                continue;
            };
            let shape = &fixture.shapes[shape_index];
            match self.synchronize_proxy(proxy_key, shape, &body.transform, body.linear_velocity) {
                Ok(true) => {}
                Ok(false) => reinserted += 1,
                Err(err) if err.is_data_error() => {
                    self.remove_proxies(key);
                    self.disable(key, &err);
                    return reinserted;
                }
                Err(err) => panic!("{}: {}", TREE_DESYNC, err),
            }
        }
        reinserted
    }

    /// Replace the cached filter of a fixture and re-evaluate its pairs next update
    pub fn refilter_fixture(&mut self, key: FixtureKey, filter: CollisionFilter) {
        let Some(proxy_keys) = self.fixture_proxies.get(&key).cloned() else {
            return;
        };
        for proxy_key in proxy_keys {
            if let Some(record) = self.proxies.get_mut(proxy_key) {
                record.filter = filter;
            }
            self.mark_dirty(proxy_key);
        }
    }

    /// Mark every proxy of a fixture dirty without moving it
    pub fn touch_fixture(&mut self, key: FixtureKey) {
        let Some(proxy_keys) = self.fixture_proxies.get(&key).cloned() else {
            return;
        };
        for proxy_key in proxy_keys {
            self.mark_dirty(proxy_key);
        }
    }

    //
    // Pairs
    //

    /// Refresh the pair set around every dirty proxy and report the transitions
    ///
    /// End events queued by unregistering come first, then pairs that stopped
    /// overlapping or stopped passing the filter, then new pairs. Calling this
    /// again with nothing dirty returns no events.
    pub fn update_pairs(&mut self) -> Vec<PairEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        if self.move_buffer.is_empty() {
            return events;
        }
        let moved = std::mem::take(&mut self.move_buffer);

        let config = self.config;
        let proxies = &self.proxies;
        self.pairs.retain(|pair| {
            let (Some(a), Some(b)) = (proxies.get(pair.first()), proxies.get(pair.second())) else {
                return false;
            };
            if !a.dirty && !b.dirty {
                return true;
            }
            let keep = a.aabb.overlaps(&b.aabb) && config.should_pair(a, b);
            if !keep {
                events.push(PairEvent::new(PairEventKind::End, a, b, *pair));
            }
            keep
        });

        for &key in &moved {
            let Some(record) = self.proxies.get(key) else {
                continue;
            };
            for (_, &other_key) in self.tree.query_with_payload(record.aabb) {
                if other_key == key {
                    continue;
                }
                let Some(other) = self.proxies.get(other_key) else {
                    continue;
                };
                if !config.should_pair(record, other) {
                    continue;
                }
                let pair = ProxyPair::new(key, other_key);
                if self.pairs.insert(pair) {
                    let (a, b) = if pair.first() == key { (record, other) } else { (other, record) };
                    events.push(PairEvent::new(PairEventKind::Begin, a, b, pair));
                }
            }
        }

        for key in moved {
            if let Some(record) = self.proxies.get_mut(key) {
                record.dirty = false;
            }
        }
        events
    }

    /// Current pairs, smaller proxy key first
    pub fn pairs(&self) -> impl Iterator<Item = (FixtureProxyKey, FixtureProxyKey)> + '_ {
        self.pairs.iter().map(|pair| (pair.first(), pair.second()))
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Whether two fixtures currently have at least one pair between their shapes
    pub fn has_pair(&self, a: FixtureKey, b: FixtureKey) -> bool {
        self.pairs.iter().any(|pair| {
            match (self.proxies.get(pair.first()), self.proxies.get(pair.second())) {
                (Some(x), Some(y)) => {
                    (x.fixture == a && y.fixture == b) || (x.fixture == b && y.fixture == a)
                }
                _ => false,
            }
        })
    }

    /// Drain End events queued by unregistering, for a map that is being torn down
    pub fn take_pending_events(&mut self) -> Vec<PairEvent> {
        std::mem::take(&mut self.pending_events)
    }

    //
    // Queries
    //

    /// Lazily yield each fixture with a proxy overlapping `region`, once
    pub fn query_region(&self, region: Aabb) -> impl Iterator<Item = FixtureKey> + '_ {
        let mut seen = HashSet::new();
        self.tree
            .query_with_payload(region)
            .filter_map(move |(_, key)| {
                let fixture = self.proxies.get(*key)?.fixture;
                seen.insert(fixture).then_some(fixture)
            })
    }

    /// Lazily yield each fixture with a proxy containing `point`, once
    pub fn query_point(&self, point: Vec2) -> impl Iterator<Item = FixtureKey> + '_ {
        self.query_region(Aabb::new(point, point))
    }

    /// Lazily yield proxies hit by the ray `origin + t * direction`, `t` in `[0, max_fraction]`
    pub fn ray_query(&self, origin: Vec2, direction: Vec2, max_fraction: f32) -> FixtureRayQuery<'_> {
        FixtureRayQuery {
            inner: self.tree.ray_query(origin, direction, max_fraction),
            tree: &self.tree,
            proxies: &self.proxies,
        }
    }

    //
    // Inspection
    //

    pub fn proxies_of(&self, key: FixtureKey) -> &[FixtureProxyKey] {
        self.fixture_proxies.get(&key).map_or(&[], Vec::as_slice)
    }

    pub fn fixture_proxy(&self, key: FixtureProxyKey) -> Option<&FixtureProxy> {
        self.proxies.get(key)
    }

    pub fn fixture_proxies(&self) -> impl Iterator<Item = (FixtureProxyKey, &FixtureProxy)> + '_ {
        self.proxies.iter()
    }

    pub fn is_registered(&self, key: FixtureKey) -> bool {
        self.fixture_proxies.contains_key(&key)
    }

    pub fn is_disabled(&self, key: FixtureKey) -> bool {
        self.disabled.contains(&key)
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixture_proxies.len()
    }

    /// Number of proxies waiting for the next pair update
    pub fn dirty_count(&self) -> usize {
        self.move_buffer.len()
    }

    /// No fixtures registered and none disabled
    pub fn is_empty(&self) -> bool {
        self.fixture_proxies.is_empty() && self.disabled.is_empty()
    }

    /// Check the tree and that every proxy record matches its leaf
    pub fn validate(&self) -> Result<(), BroadphaseError> {
        self.tree.validate()?;
        if self.tree.len() != self.proxies.len() {
            return Err(BroadphaseError::CorruptTree(format!(
                "{} leaves for {} proxies",
                self.tree.len(),
                self.proxies.len()
            )));
        }
        for (key, record) in &self.proxies {
            if self.tree.payload(record.proxy)? != &key || self.tree.fat_aabb(record.proxy)? != record.aabb {
                return Err(BroadphaseError::CorruptTree(
                    "proxy record disagrees with its leaf".into(),
                ));
            }
        }
        Ok(())
    }

    /// Translate the whole map so that `new_origin` becomes the origin
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
        for (_, record) in self.proxies.iter_mut() {
            record.aabb = record.aabb.translated(-new_origin);
        }
    }

    //
    // Internals
    //

    fn mark_dirty(&mut self, key: FixtureProxyKey) {
        if let Some(record) = self.proxies.get_mut(key) {
            if !record.dirty {
                record.dirty = true;
                self.move_buffer.push(key);
            }
        }
    }

    /// Update cached body data on existing proxies and move them to the body's bounds
    fn refresh_proxies(
        &mut self,
        key: FixtureKey,
        proxy_keys: Vec<FixtureProxyKey>,
        fixture: &Fixture,
        body: &Body,
    ) -> Vec<FixtureProxyKey> {
        for &proxy_key in &proxy_keys {
            let Some(record) = self.proxies.get_mut(proxy_key) else {
                continue;
            };
            record.body = fixture.body;
            record.body_type = body.body_type;
            record.filter = fixture.filter;
            let shape = &fixture.shapes[record.shape_index];

            match self.synchronize_proxy(proxy_key, shape, &body.transform, body.linear_velocity) {
                Ok(_) => self.mark_dirty(proxy_key),
                Err(err) if err.is_data_error() => {
                    self.remove_proxies(key);
                    self.disable(key, &err);
                    return Vec::new();
                }
                Err(err) => panic!("{}: {}", TREE_DESYNC, err),
            }
        }
        log::trace!("refreshed fixture {:?} ({} proxies)", key, proxy_keys.len());
        proxy_keys
    }

    /// Drop a fixture's proxies from the tree, queueing End events for their pairs
    fn remove_proxies(&mut self, key: FixtureKey) -> usize {
        let Some(proxy_keys) = self.fixture_proxies.remove(&key) else {
            return 0;
        };

        let proxies = &self.proxies;
        let pending = &mut self.pending_events;
        self.pairs.retain(|pair| {
            if !proxy_keys.iter().any(|k| pair.involves(*k)) {
                return true;
            }
            if let (Some(a), Some(b)) = (proxies.get(pair.first()), proxies.get(pair.second())) {
                pending.push(PairEvent::new(PairEventKind::End, a, b, *pair));
            }
            false
        });

        for &proxy_key in &proxy_keys {
            if let Some(record) = self.proxies.remove(proxy_key) {
                self.tree.remove(record.proxy).expect(TREE_DESYNC);
            }
        }
        self.move_buffer.retain(|k| !proxy_keys.contains(k));
        proxy_keys.len()
    }

    fn disable(&mut self, key: FixtureKey, err: &BroadphaseError) {
        if self.disabled.insert(key) {
            log::warn!("fixture {:?} disabled: {}", key, err);
        }
    }
}

/// Ray query resolved to fixture proxies, see [`MapBroadphase::ray_query`]
#[derive(Debug)]
pub struct FixtureRayQuery<'a> {
    inner: RayQuery<'a, FixtureProxyKey>,
    tree: &'a DynamicTree<FixtureProxyKey>,
    proxies: &'a SlotMap<FixtureProxyKey, FixtureProxy>,
}

/// A fixture shape whose fat AABB the ray enters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixtureRayHit {
    pub fixture: FixtureKey,
    pub proxy: FixtureProxyKey,
    pub shape_index: usize,
    /// Fraction along the ray at which it enters the fat AABB
    pub fraction: f32,
}

impl<'a> FixtureRayQuery<'a> {
    /// Shrink the search, typically to the fraction of the closest confirmed hit
    pub fn set_max_fraction(&mut self, max_fraction: f32) {
        self.inner.set_max_fraction(max_fraction);
    }
}

impl<'a> Iterator for FixtureRayQuery<'a> {
    type Item = FixtureRayHit;

    fn next(&mut self) -> Option<Self::Item> {
        for candidate in self.inner.by_ref() {
            let Ok(&proxy_key) = self.tree.payload(candidate.proxy) else {
                continue;
            };
            if let Some(record) = self.proxies.get(proxy_key) {
                return Some(FixtureRayHit {
                    fixture: record.fixture,
                    proxy: proxy_key,
                    shape_index: record.shape_index,
                    fraction: candidate.fraction,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyKey;
    use slotmap::SlotMap;

    struct Scene {
        bodies: SlotMap<BodyKey, Body>,
        fixtures: SlotMap<FixtureKey, Fixture>,
        map: MapBroadphase,
    }

    impl Scene {
        fn new(config: BroadphaseConfig) -> Self {
            Self {
                bodies: SlotMap::with_key(),
                fixtures: SlotMap::with_key(),
                map: MapBroadphase::new(config),
            }
        }

        fn add(&mut self, body: Body, shape: Shape, filter: CollisionFilter) -> FixtureKey {
            let body_key = self.bodies.insert(body);
            let fixture = Fixture::new(body_key, shape).with_filter(filter);
            let key = self.fixtures.insert(fixture);
            self.map
                .register_fixture(key, &self.fixtures[key], &self.bodies[body_key]);
            key
        }

        fn move_to(&mut self, key: FixtureKey, position: Vec2) {
            let body_key = self.fixtures[key].body;
            self.bodies[body_key].transform.position = position;
            self.map
                .synchronize_fixture(key, &self.fixtures[key], &self.bodies[body_key]);
        }
    }

    fn square(half: f32) -> Shape {
        Shape::rectangle(Vec2::new(half, half))
    }

    // ===== Registration =====

    #[test]
    fn test_register_creates_dirty_proxy_per_shape() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let body = scene.bodies.insert(Body::new(Vec2::ZERO));
        let fixture = Fixture::compound(body, vec![Shape::circle(0.5), square(0.5), Shape::edge(Vec2::ZERO, Vec2::X)]);
        let key = scene.fixtures.insert(fixture);

        let created = scene
            .map
            .register_fixture(key, &scene.fixtures[key], &scene.bodies[body]);
        assert_eq!(created.len(), 3);
        assert_eq!(scene.map.proxies_of(key), created.as_slice());
        assert_eq!(scene.map.proxy_count(), 3);
        assert_eq!(scene.map.dirty_count(), 3);
        for (i, proxy_key) in created.iter().enumerate() {
            let record = scene.map.fixture_proxy(*proxy_key).unwrap();
            assert!(record.is_dirty());
            assert_eq!(record.shape_index, i);
            assert_eq!(record.fixture, key);
        }
        scene.map.validate().unwrap();
    }

    #[test]
    fn test_register_twice_keeps_proxies() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let key = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let before = scene.map.proxies_of(key).to_vec();
        let body = scene.fixtures[key].body;
        let again = scene
            .map
            .register_fixture(key, &scene.fixtures[key], &scene.bodies[body]);
        assert_eq!(again, before);
        assert_eq!(scene.map.proxy_count(), 1);
        assert_eq!(scene.map.tree().len(), 1);
        scene.map.validate().unwrap();
    }

    #[test]
    fn test_register_with_new_shape_count_replaces_proxies() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let key = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let before = scene.map.proxies_of(key).to_vec();

        scene.fixtures[key].shapes.push(Shape::circle(0.25));
        let body = scene.fixtures[key].body;
        let created = scene
            .map
            .register_fixture(key, &scene.fixtures[key], &scene.bodies[body]);
        assert_eq!(created.len(), 2);
        assert!(!created.contains(&before[0]));
        assert_eq!(scene.map.tree().len(), 2);
        scene.map.validate().unwrap();
    }

    #[test]
    fn test_reregister_keeps_overlapping_pair_silent() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        assert_eq!(scene.map.update_pairs().len(), 1);

        let body = scene.fixtures[b].body;
        scene.bodies[body].body_type = BodyType::Kinematic;
        scene
            .map
            .register_fixture(b, &scene.fixtures[b], &scene.bodies[body]);

        assert!(scene.map.update_pairs().is_empty());
        assert_eq!(scene.map.pair_count(), 1);
        let record = scene.map.fixture_proxy(scene.map.proxies_of(b)[0]).unwrap();
        assert_eq!(record.body_type, BodyType::Kinematic);
    }

    #[test]
    fn test_reregister_ends_pair_that_no_longer_passes() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(
            Body::new(Vec2::ZERO).with_type(BodyType::Kinematic),
            square(0.5),
            CollisionFilter::default(),
        );
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        assert_eq!(scene.map.update_pairs().len(), 1);

        // kinematic against kinematic never pairs
        let body = scene.fixtures[b].body;
        scene.bodies[body].body_type = BodyType::Kinematic;
        scene
            .map
            .register_fixture(b, &scene.fixtures[b], &scene.bodies[body]);

        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::End);
        assert!(events[0].involves(a) && events[0].involves(b));
    }

    #[test]
    fn test_degenerate_shape_disables_fixture() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let good = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let bad = scene.add(
            Body::new(Vec2::ZERO),
            Shape::Polygon(crate::shapes::Polygon::new(Vec::new())),
            CollisionFilter::default(),
        );

        assert!(scene.map.is_disabled(bad));
        assert!(!scene.map.is_registered(bad));
        assert!(scene.map.proxies_of(bad).is_empty());

        // the good fixture is unaffected and the bad one never pairs or shows up
        assert!(scene.map.update_pairs().is_empty());
        let found: Vec<_> = scene
            .map
            .query_region(Aabb::new(Vec2::splat(-5.0), Vec2::splat(5.0)))
            .collect();
        assert_eq!(found, vec![good]);

        // syncing retries the registration, which still fails on the same shape
        scene.move_to(bad, Vec2::new(1.0, 0.0));
        assert!(scene.map.is_disabled(bad));
        assert!(scene.map.proxies_of(bad).is_empty());
    }

    #[test]
    fn test_nan_transform_disables_on_sync() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        assert_eq!(scene.map.update_pairs().len(), 1);

        scene.move_to(a, Vec2::new(f32::NAN, 0.0));
        assert!(scene.map.is_disabled(a));
        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::End);
        assert!(events[0].involves(b));

        // correcting the body and registering again re-enables it
        let body = scene.fixtures[a].body;
        scene.bodies[body].transform.position = Vec2::ZERO;
        scene
            .map
            .register_fixture(a, &scene.fixtures[a], &scene.bodies[body]);
        assert!(!scene.map.is_disabled(a));
        assert_eq!(scene.map.update_pairs().len(), 1);
    }

    #[test]
    fn test_sync_reenables_corrected_fixture() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        scene.map.update_pairs();

        scene.move_to(a, Vec2::new(f32::NAN, 0.0));
        assert!(scene.map.is_disabled(a));
        scene.map.update_pairs();

        scene.move_to(a, Vec2::new(0.2, 0.0));
        assert!(!scene.map.is_disabled(a));
        assert_eq!(scene.map.proxies_of(a).len(), 1);

        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::Begin);
        assert!(events[0].involves(b));
        scene.map.validate().unwrap();
    }

    // ===== Pair Generation =====

    #[test]
    fn test_overlapping_fixtures_pair_once() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.75, 0.0)), square(0.5), CollisionFilter::default());
        scene.add(Body::new(Vec2::new(10.0, 0.0)), square(0.5), CollisionFilter::default());

        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::Begin);
        assert!(events[0].involves(a) && events[0].involves(b));
        assert!(scene.map.has_pair(a, b));
        assert_eq!(scene.map.pair_count(), 1);
        assert_eq!(scene.map.dirty_count(), 0);

        // second update without movement is silent
        assert!(scene.map.update_pairs().is_empty());
    }

    #[test]
    fn test_pair_ends_when_apart() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.75, 0.0)), square(0.5), CollisionFilter::default());
        scene.map.update_pairs();

        scene.move_to(b, Vec2::new(20.0, 0.0));
        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::End);
        assert!(events[0].involves(a) && events[0].involves(b));
        assert_eq!(scene.map.pair_count(), 0);
    }

    #[test]
    fn test_small_motion_keeps_pair_without_events() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.75, 0.0)), square(0.5), CollisionFilter::default());
        scene.map.update_pairs();

        scene.move_to(b, Vec2::new(0.76, 0.0));
        assert_eq!(scene.map.dirty_count(), 0);
        assert!(scene.map.update_pairs().is_empty());
        assert_eq!(scene.map.pair_count(), 1);
    }

    #[test]
    fn test_mask_scenario() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::from_bits(0b01, 0b10));
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::from_bits(0b10, 0b01));
        let c = scene.add(Body::new(Vec2::new(-0.5, 0.0)), square(0.5), CollisionFilter::from_bits(0b01, 0b01));

        scene.map.update_pairs();
        assert!(scene.map.has_pair(a, b));
        assert!(!scene.map.has_pair(a, c));
        // b accepts c, but c does not accept b
        assert!(!scene.map.has_pair(b, c));
    }

    #[test]
    fn test_either_rule_is_permissive() {
        let config = BroadphaseConfig {
            filter_rule: FilterRule::Either,
            ..BroadphaseConfig::default()
        };
        let mut scene = Scene::new(config);
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::from_bits(0b01, 0b10));
        let c = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::from_bits(0b01, 0b01));
        scene.map.update_pairs();
        assert!(scene.map.has_pair(a, c));
    }

    #[test]
    fn test_static_pairs_never_form() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new_static(Vec2::ZERO), square(1.0), CollisionFilter::default());
        let b = scene.add(Body::new_static(Vec2::new(0.5, 0.0)), square(1.0), CollisionFilter::default());
        let k = scene.add(
            Body::new(Vec2::new(-0.5, 0.0)).with_type(BodyType::Kinematic),
            square(1.0),
            CollisionFilter::default(),
        );
        assert!(scene.map.update_pairs().is_empty());
        assert!(!scene.map.has_pair(a, b));
        assert!(!scene.map.has_pair(a, k));

        let d = scene.add(Body::new(Vec2::ZERO), square(1.0), CollisionFilter::default());
        scene.map.update_pairs();
        assert!(scene.map.has_pair(a, d));
        assert!(scene.map.has_pair(k, d));
    }

    #[test]
    fn test_same_body_fixtures_skip_unless_self_collision() {
        for self_collision in [false, true] {
            let config = BroadphaseConfig { self_collision, ..BroadphaseConfig::default() };
            let mut map = MapBroadphase::new(config);
            let mut bodies: SlotMap<BodyKey, Body> = SlotMap::with_key();
            let mut fixtures: SlotMap<FixtureKey, Fixture> = SlotMap::with_key();
            let body = bodies.insert(Body::new(Vec2::ZERO));
            let f1 = fixtures.insert(Fixture::new(body, square(0.5)));
            let f2 = fixtures.insert(Fixture::compound(body, vec![square(0.5), square(0.4)]));
            map.register_fixture(f1, &fixtures[f1], &bodies[body]);
            map.register_fixture(f2, &fixtures[f2], &bodies[body]);
            map.update_pairs();

            // shapes of one fixture never pair with each other
            let expected = if self_collision { 2 } else { 0 };
            assert_eq!(map.pair_count(), expected);
        }
    }

    #[test]
    fn test_unregister_ends_pairs() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        let c = scene.add(Body::new(Vec2::new(-0.5, 0.0)), square(0.5), CollisionFilter::default());
        assert_eq!(scene.map.update_pairs().len(), 3);

        assert_eq!(scene.map.unregister_fixture(a), 1);
        assert_eq!(scene.map.unregister_fixture(a), 0);
        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == PairEventKind::End && e.involves(a)));
        assert!(scene.map.has_pair(b, c));
        assert_eq!(scene.map.query_region(Aabb::new(Vec2::splat(-5.0), Vec2::splat(5.0))).count(), 2);
        scene.map.validate().unwrap();
    }

    #[test]
    fn test_refilter_ends_and_restores_pair() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        let b = scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        scene.map.update_pairs();

        scene.map.refilter_fixture(a, CollisionFilter::from_bits(0b1000, 0b1000));
        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::End);
        assert!(!scene.map.has_pair(a, b));

        scene.map.refilter_fixture(a, CollisionFilter::default());
        let events = scene.map.update_pairs();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PairEventKind::Begin);
    }

    #[test]
    fn test_touch_is_idempotent() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let a = scene.add(Body::new(Vec2::ZERO), square(0.5), CollisionFilter::default());
        scene.add(Body::new(Vec2::new(0.5, 0.0)), square(0.5), CollisionFilter::default());
        scene.map.update_pairs();

        scene.map.touch_fixture(a);
        scene.map.touch_fixture(a);
        assert_eq!(scene.map.dirty_count(), 1);
        assert!(scene.map.update_pairs().is_empty());
        assert_eq!(scene.map.pair_count(), 1);
    }

    // ===== Queries =====

    #[test]
    fn test_query_region_dedups_compound_fixture() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let body = scene.bodies.insert(Body::new(Vec2::ZERO));
        let key = scene.fixtures.insert(Fixture::compound(
            body,
            vec![
                Shape::Circle(crate::shapes::Circle::new(Vec2::new(-0.5, 0.0), 0.4)),
                Shape::Circle(crate::shapes::Circle::new(Vec2::new(0.5, 0.0), 0.4)),
            ],
        ));
        scene
            .map
            .register_fixture(key, &scene.fixtures[key], &scene.bodies[body]);

        let found: Vec<_> = scene
            .map
            .query_region(Aabb::new(Vec2::splat(-2.0), Vec2::splat(2.0)))
            .collect();
        assert_eq!(found, vec![key]);
        assert_eq!(scene.map.query_point(Vec2::new(0.5, 0.0)).count(), 1);
        assert_eq!(scene.map.query_point(Vec2::new(0.0, 1.5)).count(), 0);
    }

    #[test]
    fn test_ray_query_resolves_fixtures() {
        let mut scene = Scene::new(BroadphaseConfig::default());
        let near = scene.add(Body::new(Vec2::new(3.0, 0.0)), square(0.5), CollisionFilter::default());
        let far = scene.add(Body::new(Vec2::new(8.0, 0.0)), square(0.5), CollisionFilter::default());
        scene.add(Body::new(Vec2::new(3.0, 5.0)), square(0.5), CollisionFilter::default());

        let mut hits: Vec<FixtureRayHit> = scene.map.ray_query(Vec2::ZERO, Vec2::X, 20.0).collect();
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        let fixtures: Vec<_> = hits.iter().map(|h| h.fixture).collect();
        assert_eq!(fixtures, vec![near, far]);
        assert_eq!(hits[0].shape_index, 0);
        assert!((hits[0].fraction - 2.4).abs() < 1e-4);
    }
}
