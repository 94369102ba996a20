//! Broadphase system over every map
//!
//! Each map (spatial partition) gets its own [`MapBroadphase`], created when
//! the first fixture registers into it and dropped when its last fixture
//! leaves. Maps share nothing, so their pair updates can run in parallel.

use std::collections::{BTreeMap, HashMap};

use broad2d_math::Vec2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aabb::Aabb;
use crate::body::{Body, Fixture, FixtureKey};
use crate::broadphase::{BroadphaseConfig, FixtureRayQuery, MapBroadphase};
use crate::collision::CollisionFilter;
use crate::proxy::{FixtureProxyKey, PairEvent};

/// Identifier of a map, the unit of spatial partitioning
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MapId(pub u32);

/// A pair event tagged with the map it happened in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapPairEvent {
    pub map: MapId,
    pub event: PairEvent,
}

/// Owns one broadphase per map and routes fixtures to them
#[derive(Debug, Default)]
pub struct BroadphaseSystem {
    config: BroadphaseConfig,
    maps: BTreeMap<MapId, MapBroadphase>,
    fixture_maps: HashMap<FixtureKey, MapId>,
    /// Events left behind by maps that were torn down
    pending: Vec<MapPairEvent>,
}

impl BroadphaseSystem {
    pub fn new(config: BroadphaseConfig) -> Self {
        Self {
            config,
            maps: BTreeMap::new(),
            fixture_maps: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn config(&self) -> &BroadphaseConfig {
        &self.config
    }

    /// Register a fixture into `map`, creating the map's broadphase if needed
    ///
    /// A fixture already registered in a different map is moved out of it first.
    pub fn register_fixture(
        &mut self,
        map: MapId,
        key: FixtureKey,
        fixture: &Fixture,
        body: &Body,
    ) -> Vec<FixtureProxyKey> {
        if self.fixture_maps.get(&key).is_some_and(|current| *current != map) {
            self.unregister_fixture(key);
        }

        let config = self.config;
        let broadphase = self.maps.entry(map).or_insert_with(|| {
            log::debug!("creating broadphase for map {:?}", map);
            MapBroadphase::new(config)
        });
        let created = broadphase.register_fixture(key, fixture, body);
        self.fixture_maps.insert(key, map);
        created
    }

    /// Remove a fixture from whichever map holds it
    ///
    /// Returns `false` if the fixture was not registered anywhere.
    pub fn unregister_fixture(&mut self, key: FixtureKey) -> bool {
        let Some(map) = self.fixture_maps.remove(&key) else {
            return false;
        };
        let Some(broadphase) = self.maps.get_mut(&map) else {
            return true;
        };
        broadphase.unregister_fixture(key);

        if broadphase.is_empty() {
            self.pending.extend(
                broadphase
                    .take_pending_events()
                    .into_iter()
                    .map(|event| MapPairEvent { map, event }),
            );
            self.maps.remove(&map);
            log::debug!("map {:?} is empty, dropping its broadphase", map);
        }
        true
    }

    /// Move a fixture to another map, as when its body changes map
    pub fn move_fixture_to_map(
        &mut self,
        key: FixtureKey,
        to: MapId,
        fixture: &Fixture,
        body: &Body,
    ) -> Vec<FixtureProxyKey> {
        self.unregister_fixture(key);
        self.register_fixture(to, key, fixture, body)
    }

    /// Synchronize a fixture's proxies with its body, returning how many were reinserted
    pub fn synchronize_fixture(&mut self, key: FixtureKey, fixture: &Fixture, body: &Body) -> usize {
        match self.map_broadphase_mut(key) {
            Some(broadphase) => broadphase.synchronize_fixture(key, fixture, body),
            None => 0,
        }
    }

    pub fn refilter_fixture(&mut self, key: FixtureKey, filter: CollisionFilter) {
        if let Some(broadphase) = self.map_broadphase_mut(key) {
            broadphase.refilter_fixture(key, filter);
        }
    }

    pub fn touch_fixture(&mut self, key: FixtureKey) {
        if let Some(broadphase) = self.map_broadphase_mut(key) {
            broadphase.touch_fixture(key);
        }
    }

    /// Run the pair update of every map, in map order
    pub fn update_all_pairs(&mut self) -> Vec<MapPairEvent> {
        let mut events = std::mem::take(&mut self.pending);

        #[cfg(feature = "parallel")]
        let per_map: Vec<(MapId, Vec<PairEvent>)> = self
            .maps
            .par_iter_mut()
            .map(|(id, broadphase)| (*id, broadphase.update_pairs()))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let per_map: Vec<(MapId, Vec<PairEvent>)> = self
            .maps
            .iter_mut()
            .map(|(id, broadphase)| (*id, broadphase.update_pairs()))
            .collect();

        for (map, map_events) in per_map {
            events.extend(map_events.into_iter().map(|event| MapPairEvent { map, event }));
        }
        events
    }

    //
    // Queries
    //

    /// Fixtures in `map` overlapping `region`; empty if the map has no broadphase
    pub fn query_region(&self, map: MapId, region: Aabb) -> impl Iterator<Item = FixtureKey> + '_ {
        self.maps
            .get(&map)
            .into_iter()
            .flat_map(move |broadphase| broadphase.query_region(region))
    }

    pub fn query_point(&self, map: MapId, point: Vec2) -> impl Iterator<Item = FixtureKey> + '_ {
        self.maps
            .get(&map)
            .into_iter()
            .flat_map(move |broadphase| broadphase.query_point(point))
    }

    pub fn ray_query(
        &self,
        map: MapId,
        origin: Vec2,
        direction: Vec2,
        max_fraction: f32,
    ) -> Option<FixtureRayQuery<'_>> {
        self.maps
            .get(&map)
            .map(|broadphase| broadphase.ray_query(origin, direction, max_fraction))
    }

    //
    // Inspection
    //

    pub fn map(&self, map: MapId) -> Option<&MapBroadphase> {
        self.maps.get(&map)
    }

    pub fn maps(&self) -> impl Iterator<Item = (MapId, &MapBroadphase)> + '_ {
        self.maps.iter().map(|(id, broadphase)| (*id, broadphase))
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// The map a fixture is registered in
    pub fn map_of(&self, key: FixtureKey) -> Option<MapId> {
        self.fixture_maps.get(&key).copied()
    }

    pub fn is_disabled(&self, key: FixtureKey) -> bool {
        self.map_of(key)
            .and_then(|map| self.maps.get(&map))
            .is_some_and(|broadphase| broadphase.is_disabled(key))
    }

    pub fn proxy_count(&self) -> usize {
        self.maps.values().map(MapBroadphase::proxy_count).sum()
    }

    pub fn pair_count(&self) -> usize {
        self.maps.values().map(MapBroadphase::pair_count).sum()
    }

    fn map_broadphase_mut(&mut self, key: FixtureKey) -> Option<&mut MapBroadphase> {
        let map = self.fixture_maps.get(&key)?;
        self.maps.get_mut(map)
    }
}
