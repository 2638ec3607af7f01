//! Raycast context: the one owner of cache, gaze predictor and quality scaler
//!
//! Constructed by whoever runs the analysis and passed explicitly into every
//! operation that casts rays. Persists across analysis passes.

use bevy::log::debug;
use bevy::math::Vec3;
use bevy::prelude::Resource;

use super::{CacheSettings, GazePredictor, GazeSettings, Ray, RayCastCache, RayCaster, RayHit, TrackableKinds};
use crate::constants::GAZE_PREDICTION_WEIGHT;
use crate::quality::{AdaptiveQualityScaler, QualitySettings};

/// Whether a cast may be answered from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Use,
    Bypass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextSettings {
    pub cache: CacheSettings,
    pub gaze: GazeSettings,
    pub quality: QualitySettings,
    pub prediction_weight: f32,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            gaze: GazeSettings::default(),
            quality: QualitySettings::default(),
            prediction_weight: GAZE_PREDICTION_WEIGHT,
        }
    }
}

#[derive(Resource, Debug)]
pub struct RaycastContext {
    pub cache: RayCastCache,
    pub gaze: GazePredictor,
    pub quality: AdaptiveQualityScaler,
    pub prediction_weight: f32,
    /// Casts that reached the platform
    casts: u64,
}

impl Default for RaycastContext {
    fn default() -> Self {
        Self::new(ContextSettings::default())
    }
}

impl RaycastContext {
    pub fn new(settings: ContextSettings) -> Self {
        Self {
            cache: RayCastCache::new(settings.cache),
            gaze: GazePredictor::new(settings.gaze),
            quality: AdaptiveQualityScaler::new(settings.quality),
            prediction_weight: settings.prediction_weight,
            casts: 0,
        }
    }

    /// Push new tolerances into the live components, keeping their state
    pub fn apply_settings(&mut self, settings: ContextSettings) {
        self.cache.set_settings(settings.cache);
        self.gaze.set_settings(settings.gaze);
        self.quality.set_settings(settings.quality);
        self.prediction_weight = settings.prediction_weight;
    }

    pub fn record_frame(&mut self, frame_ms: f32, dt: f32) {
        self.quality.record_frame(frame_ms, dt);
    }

    pub fn evict_stale(&mut self, now: f64) -> usize {
        let evicted = self.cache.evict_stale(now);
        if evicted > 0 {
            debug!(
                "Evicted {} stale ray cache entries (hit rate {:.2})",
                evicted,
                self.cache.hit_rate()
            );
        }
        evicted
    }

    /// Per-frame upkeep: frame timing and stale cache eviction.
    pub fn tick(&mut self, frame_ms: f32, dt: f32, now: f64) {
        self.record_frame(frame_ms, dt);
        self.evict_stale(now);
    }

    pub fn platform_casts(&self) -> u64 {
        self.casts
    }

    /// Cast `ray`, answering from the cache when allowed and possible.
    pub fn cast(
        &mut self,
        caster: &mut dyn RayCaster,
        ray: &Ray,
        wanted: TrackableKinds,
        policy: CachePolicy,
        now: f64,
    ) -> Option<RayHit> {
        let kinds = self.quality.effective_kinds(wanted);
        if policy == CachePolicy::Use
            && let Some(cached) = self.cache.lookup(ray, kinds, now)
        {
            return cached.hit;
        }

        self.casts += 1;
        let hit = caster.cast(ray, kinds);
        if policy == CachePolicy::Use {
            self.cache.store(ray, hit, kinds, now);
        }
        hit
    }

    /// Cast along the user's gaze: records the direction, then casts the
    /// prediction-blended ray.
    pub fn cast_gaze(
        &mut self,
        caster: &mut dyn RayCaster,
        ray: &Ray,
        wanted: TrackableKinds,
        now: f64,
    ) -> Option<RayHit> {
        self.gaze.record(ray.direction, now);
        let blended = self.gaze.blended_ray(ray, self.prediction_weight);
        self.cast(caster, &blended, wanted, CachePolicy::Use, now)
    }

    /// Surface height under (x, z): downcasts from `base_y + offset` for each
    /// offset in turn until one hits. Higher starts route around things
    /// standing over the surface.
    #[allow(clippy::too_many_arguments)]
    pub fn downcast(
        &mut self,
        caster: &mut dyn RayCaster,
        x: f32,
        z: f32,
        base_y: f32,
        offsets: &[f32],
        wanted: TrackableKinds,
        policy: CachePolicy,
        now: f64,
    ) -> Option<Vec3> {
        for offset in offsets {
            let ray = Ray::down(Vec3::new(x, base_y + offset, z));
            if let Some(hit) = self.cast(caster, &ray, wanted, policy, now) {
                return Some(hit.position);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat floor at y = 0 that counts its casts
    struct Floor {
        casts: usize,
    }

    impl RayCaster for Floor {
        fn cast(&mut self, ray: &Ray, wanted: TrackableKinds) -> Option<RayHit> {
            self.casts += 1;
            if ray.direction.y >= 0.0 || !wanted.intersects(TrackableKinds::PLANES) {
                return None;
            }
            let t = ray.origin.y / -ray.direction.y;
            Some(RayHit::new(ray.origin + ray.direction * t, TrackableKinds::PLANES))
        }
    }

    #[test]
    fn test_cache_saves_platform_casts() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut floor = Floor { casts: 0 };
        let ray = Ray::down(Vec3::new(0.0, 1.0, 0.0));

        let first = ctx.cast(&mut floor, &ray, TrackableKinds::PLANES, CachePolicy::Use, 0.0);
        let second = ctx.cast(&mut floor, &ray, TrackableKinds::PLANES, CachePolicy::Use, 1.0);
        assert_eq!(first, second);
        assert_eq!(floor.casts, 1);
        assert_eq!(ctx.platform_casts(), 1);

        ctx.cast(&mut floor, &ray, TrackableKinds::PLANES, CachePolicy::Bypass, 2.0);
        assert_eq!(floor.casts, 2);
    }

    #[test]
    fn test_downcast_falls_through_offsets() {
        struct Occluded;
        impl RayCaster for Occluded {
            fn cast(&mut self, ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
                // Only starts above 1.0 see the surface
                (ray.origin.y > 1.0).then(|| {
                    RayHit::new(Vec3::new(ray.origin.x, 0.2, ray.origin.z), TrackableKinds::PLANES)
                })
            }
        }

        let mut ctx = RaycastContext::new(ContextSettings::default());
        let hit = ctx.downcast(
            &mut Occluded,
            1.0,
            2.0,
            0.5,
            &[0.0, 0.4, 0.8],
            TrackableKinds::PLANES,
            CachePolicy::Bypass,
            0.0,
        );
        assert_eq!(hit, Some(Vec3::new(1.0, 0.2, 2.0)));

        let none = ctx.downcast(
            &mut Occluded,
            1.0,
            2.0,
            0.0,
            &[0.0, 0.4],
            TrackableKinds::PLANES,
            CachePolicy::Bypass,
            0.0,
        );
        assert!(none.is_none());
    }

    #[test]
    fn test_tick_evicts_and_tracks_frames() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut floor = Floor { casts: 0 };
        ctx.cast(&mut floor, &Ray::down(Vec3::Y), TrackableKinds::PLANES, CachePolicy::Use, 0.0);
        assert_eq!(ctx.cache.len(), 1);

        ctx.tick(40.0, 1.0, 61.0);
        assert!(ctx.cache.is_empty());
        assert!(ctx.quality.quality_scale() < 1.0);
    }

    #[test]
    fn test_gaze_cast_records_history() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut floor = Floor { casts: 0 };
        let ray = Ray::new(Vec3::new(0.0, 1.5, 0.0), Vec3::new(0.0, -1.0, -1.0));
        let hit = ctx.cast_gaze(&mut floor, &ray, TrackableKinds::PLANES, 0.0);
        assert!(hit.is_some());
        assert_eq!(ctx.gaze.len(), 1);
    }
}
