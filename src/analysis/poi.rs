//! Point-of-interest placement (hole, ball marker)
//!
//! One tap is a poor measurement on a textured green. Cast a small ring of
//! jittered rays around the tapped ray, drop hits that land far from the
//! consensus, and average the rest.

use std::f32::consts::TAU;

use bevy::math::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{OUTLIER_K, POI_RING_RADIUS, POI_RING_RAYS};
use crate::raycast::{CachePolicy, Ray, RayCaster, RaycastContext, TrackableKinds};
use crate::stats::{median, median_absolute_deviation};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiSettings {
    pub ring_rays: usize,
    pub ring_radius: f32,
    pub outlier_k: f32,
}

impl Default for PoiSettings {
    fn default() -> Self {
        Self {
            ring_rays: POI_RING_RAYS,
            ring_radius: POI_RING_RADIUS,
            outlier_k: OUTLIER_K,
        }
    }
}

/// Origins of the ring rays, perpendicular to the ray, each angle jittered
/// by up to a quarter of the spacing.
fn ring_origins(ray: &Ray, settings: &PoiSettings, rng: &mut impl Rng) -> Vec<Vec3> {
    let n = settings.ring_rays;
    if n == 0 {
        return Vec::new();
    }
    let (u, v) = ray.direction.any_orthonormal_pair();
    let spacing = TAU / n as f32;
    (0..n)
        .map(|k| {
            let angle = k as f32 * spacing + rng.gen_range(-0.25..0.25) * spacing;
            ray.origin + (u * angle.cos() + v * angle.sin()) * settings.ring_radius
        })
        .collect()
}

/// Hits whose distance from the component-wise median lies within
/// median + k·MAD of those distances. Closer than typical is never an outlier.
pub fn consensus_hits(hits: &[Vec3], k: f32) -> Vec<Vec3> {
    let (Ok(mx), Ok(my), Ok(mz)) = (
        median(&hits.iter().map(|p| p.x).collect::<Vec<_>>()),
        median(&hits.iter().map(|p| p.y).collect::<Vec<_>>()),
        median(&hits.iter().map(|p| p.z).collect::<Vec<_>>()),
    ) else {
        return Vec::new();
    };
    let center = Vec3::new(mx, my, mz);
    let distances: Vec<f32> = hits.iter().map(|p| p.distance(center)).collect();
    let (Ok(typical), Ok(mad)) = (median(&distances), median_absolute_deviation(&distances)) else {
        return Vec::new();
    };
    let limit = typical + k * mad;
    hits.iter()
        .zip(&distances)
        .filter(|(_, d)| **d <= limit)
        .map(|(p, _)| *p)
        .collect()
}

/// Best estimate of where `ray` meets the surface, or None when nothing hit.
pub fn sample_point_of_interest(
    ctx: &mut RaycastContext,
    caster: &mut dyn RayCaster,
    ray: &Ray,
    settings: &PoiSettings,
    rng: &mut impl Rng,
    now: f64,
) -> Option<Vec3> {
    let mut hits = Vec::with_capacity(settings.ring_rays + 1);
    let centre = ctx.cast(caster, ray, TrackableKinds::ALL, CachePolicy::Bypass, now);
    hits.extend(centre.map(|h| h.position));
    for origin in ring_origins(ray, settings, rng) {
        let ring_ray = Ray {
            origin,
            direction: ray.direction,
        };
        if let Some(hit) = ctx.cast(caster, &ring_ray, TrackableKinds::ALL, CachePolicy::Bypass, now) {
            hits.push(hit.position);
        }
    }

    let kept = consensus_hits(&hits, settings.outlier_k);
    if kept.is_empty() {
        return None;
    }
    Some(kept.iter().copied().sum::<Vec3>() / kept.len() as f32)
}
