//! Tolerant memoization of ray cast results
//!
//! An entry answers a new query when it is young enough, was cast from
//! nearly the same origin in nearly the same direction, and covered every
//! trackable kind the new query asks for.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use bevy::math::Vec3;

use super::{Ray, RayHit, TrackableKinds};
use crate::constants::{CACHE_CAPACITY, CACHE_DIRECTION_COSINE, CACHE_MAX_AGE, CACHE_VALID_DISTANCE};

/// Cache tolerances and bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_age: f64,
    pub valid_distance: f32,
    pub min_direction_cosine: f32,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age: CACHE_MAX_AGE,
            valid_distance: CACHE_VALID_DISTANCE,
            min_direction_cosine: CACHE_DIRECTION_COSINE,
            capacity: CACHE_CAPACITY,
        }
    }
}

/// One memoized cast. `hit == None` caches a confirmed miss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRayResult {
    pub origin: Vec3,
    pub direction: Vec3,
    pub hit: Option<RayHit>,
    pub kinds: TrackableKinds,
    pub created_at: f64,
}

/// Lifecycle of an entry relative to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    /// Too old, too far, or pointing elsewhere
    Stale,
}

#[derive(Debug, Default)]
pub struct RayCastCache {
    settings: CacheSettings,
    /// Least recently used at the front
    entries: VecDeque<CachedRayResult>,
    hits: u64,
    misses: u64,
}

impl RayCastCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            entries: VecDeque::with_capacity(settings.capacity + 1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Swap tolerances in place; entries beyond a smaller capacity are dropped
    pub fn set_settings(&mut self, settings: CacheSettings) {
        self.settings = settings;
        while self.entries.len() > self.settings.capacity {
            self.entries.pop_front();
        }
    }

    fn is_young(&self, entry: &CachedRayResult, now: f64) -> bool {
        now - entry.created_at < self.settings.max_age
    }

    fn is_near(&self, entry: &CachedRayResult, ray: &Ray) -> bool {
        entry.origin.distance(ray.origin) < self.settings.valid_distance
            && entry.direction.dot(ray.direction) > self.settings.min_direction_cosine
    }

    pub fn entry_state(&self, entry: &CachedRayResult, ray: &Ray, now: f64) -> EntryState {
        if self.is_young(entry, now) && self.is_near(entry, ray) {
            EntryState::Fresh
        } else {
            EntryState::Stale
        }
    }

    /// Cached result for `ray`, if a fresh entry covers `required`.
    pub fn lookup(&mut self, ray: &Ray, required: TrackableKinds, now: f64) -> Option<CachedRayResult> {
        let found = self.entries.iter().rposition(|e| {
            e.kinds.contains(required) && self.entry_state(e, ray, now) == EntryState::Fresh
        });

        match found {
            Some(idx) => {
                self.hits += 1;
                let entry = self.entries.remove(idx)?;
                self.entries.push_back(entry);
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Remember a cast. Supersedes any entry within tolerance that the new
    /// one fully covers, then evicts least recently used past capacity.
    pub fn store(&mut self, ray: &Ray, hit: Option<RayHit>, kinds: TrackableKinds, now: f64) {
        if self.settings.capacity == 0 {
            return;
        }
        let settings = self.settings;
        self.entries.retain(|e| {
            let near = e.origin.distance(ray.origin) < settings.valid_distance
                && e.direction.dot(ray.direction) > settings.min_direction_cosine;
            !(near && kinds.contains(e.kinds))
        });

        self.entries.push_back(CachedRayResult {
            origin: ray.origin,
            direction: ray.direction,
            hit,
            kinds,
            created_at: now,
        });
        while self.entries.len() > self.settings.capacity {
            self.entries.pop_front();
        }
    }

    /// Drop every entry older than the max age. Returns how many went.
    pub fn evict_stale(&mut self, now: f64) -> usize {
        let before = self.entries.len();
        let max_age = self.settings.max_age;
        self.entries.retain(|e| now - e.created_at < max_age);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit_at(p: Vec3) -> Option<RayHit> {
        Some(RayHit::new(p, TrackableKinds::PLANES))
    }

    #[test]
    fn test_nearby_origin_hits() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        let ray = Ray::down(Vec3::new(0.0, 1.0, 0.0));
        cache.store(&ray, hit_at(Vec3::ZERO), TrackableKinds::PLANES, 0.0);

        let close = Ray::down(Vec3::new(0.01, 1.0, 0.0));
        let cached = cache.lookup(&close, TrackableKinds::PLANES, 5.0);
        assert_eq!(cached.and_then(|c| c.hit).map(|h| h.position), Some(Vec3::ZERO));

        let far = Ray::down(Vec3::new(0.1, 1.0, 0.0));
        assert!(cache.lookup(&far, TrackableKinds::PLANES, 5.0).is_none());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_expired_entry_always_misses() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        let ray = Ray::down(Vec3::ONE);
        cache.store(&ray, hit_at(Vec3::ZERO), TrackableKinds::PLANES, 0.0);
        assert!(cache.lookup(&ray, TrackableKinds::PLANES, 60.0).is_none());
        assert!(cache.lookup(&ray, TrackableKinds::PLANES, 59.9).is_some());
    }

    #[test]
    fn test_direction_outside_cone_misses() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        let ray = Ray::down(Vec3::ZERO);
        cache.store(&ray, None, TrackableKinds::PLANES, 0.0);

        // ~15° off vertical
        let tilted = Ray::new(Vec3::ZERO, Vec3::new(0.27, -1.0, 0.0));
        assert!(cache.lookup(&tilted, TrackableKinds::PLANES, 1.0).is_none());
        // ~5° off vertical
        let slight = Ray::new(Vec3::ZERO, Vec3::new(0.087, -1.0, 0.0));
        let cached = cache.lookup(&slight, TrackableKinds::PLANES, 1.0);
        assert!(cached.is_some());
        assert!(cached.unwrap().hit.is_none(), "cached miss stays a miss");
    }

    #[test]
    fn test_required_kinds_must_be_covered() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        let ray = Ray::down(Vec3::ZERO);
        cache.store(&ray, hit_at(Vec3::ZERO), TrackableKinds::PLANES, 0.0);

        let wanted = TrackableKinds::PLANES | TrackableKinds::FEATURE_POINTS;
        assert!(cache.lookup(&ray, wanted, 1.0).is_none());
        assert!(cache.lookup(&ray, TrackableKinds::PLANES, 1.0).is_some());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        for k in 0..6 {
            let ray = Ray::down(Vec3::new(k as f32, 1.0, 0.0));
            cache.store(&ray, hit_at(Vec3::ZERO), TrackableKinds::PLANES, 0.0);
        }
        // Touch the oldest so it becomes most recent
        let first = Ray::down(Vec3::new(0.0, 1.0, 0.0));
        assert!(cache.lookup(&first, TrackableKinds::PLANES, 1.0).is_some());

        let extra = Ray::down(Vec3::new(10.0, 1.0, 0.0));
        cache.store(&extra, hit_at(Vec3::ZERO), TrackableKinds::PLANES, 1.0);
        assert_eq!(cache.len(), 6);
        assert!(cache.lookup(&first, TrackableKinds::PLANES, 1.0).is_some());
        let second = Ray::down(Vec3::new(1.0, 1.0, 0.0));
        assert!(cache.lookup(&second, TrackableKinds::PLANES, 1.0).is_none());
    }

    #[test]
    fn test_store_supersedes_nearby_entry() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        let ray = Ray::down(Vec3::ZERO);
        cache.store(&ray, hit_at(Vec3::ZERO), TrackableKinds::PLANES, 0.0);
        cache.store(&ray, hit_at(Vec3::Y), TrackableKinds::PLANES, 2.0);
        assert_eq!(cache.len(), 1);
        let cached = cache.lookup(&ray, TrackableKinds::PLANES, 3.0).unwrap();
        assert_eq!(cached.created_at, 2.0);
    }

    #[test]
    fn test_evict_stale() {
        let mut cache = RayCastCache::new(CacheSettings::default());
        cache.store(&Ray::down(Vec3::ZERO), None, TrackableKinds::PLANES, 0.0);
        cache.store(&Ray::down(Vec3::X), None, TrackableKinds::PLANES, 30.0);
        assert_eq!(cache.evict_stale(70.0), 1);
        assert_eq!(cache.len(), 1);
    }
}
