//! Slope right around one point, from a robust plane fit over nearby samples

use std::f32::consts::TAU;

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DOWNCAST_CLEARANCE, DOWNCAST_OFFSETS, LOCAL_SLOPE_RING_RAYS, LOCAL_SLOPE_RING_SPACING,
    LOCAL_SLOPE_RINGS,
};
use crate::error::AnalysisError;
use crate::raycast::{RayCaster, RaycastContext, TrackableKinds};
use crate::stats::fit_plane_robust;
use crate::terrain::grid_cache_policy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSlopeSettings {
    pub rings: usize,
    pub rays_per_ring: usize,
    pub ring_spacing: f32,
    pub clearance: f32,
    pub downcast_offsets: Vec<f32>,
}

impl Default for LocalSlopeSettings {
    fn default() -> Self {
        Self {
            rings: LOCAL_SLOPE_RINGS,
            rays_per_ring: LOCAL_SLOPE_RING_RAYS,
            ring_spacing: LOCAL_SLOPE_RING_SPACING,
            clearance: DOWNCAST_CLEARANCE,
            downcast_offsets: DOWNCAST_OFFSETS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalSlope {
    pub slope_percent: f32,
    pub downhill: Vec2,
    pub normal: Vec3,
    pub rms_residual: f32,
    pub sample_count: usize,
}

/// Sample layout: the centre, then each ring. Odd rings are rotated half a
/// step so spokes do not line up.
pub fn ring_layout(center: Vec2, settings: &LocalSlopeSettings) -> Vec<Vec2> {
    let mut points = vec![center];
    let n = settings.rays_per_ring;
    if n == 0 {
        return points;
    }
    let spacing = TAU / n as f32;
    for ring in 1..=settings.rings {
        let radius = ring as f32 * settings.ring_spacing;
        let twist = if ring % 2 == 1 { 0.0 } else { 0.5 * spacing };
        for k in 0..n {
            let angle = k as f32 * spacing + twist;
            points.push(center + Vec2::new(angle.cos(), angle.sin()) * radius);
        }
    }
    points
}

/// Slope estimate around `center`, a point on or near the surface.
pub fn estimate_local_slope(
    ctx: &mut RaycastContext,
    caster: &mut dyn RayCaster,
    center: Vec3,
    settings: &LocalSlopeSettings,
    now: f64,
) -> Result<LocalSlope, AnalysisError> {
    let base_y = center.y + settings.clearance;
    let policy = grid_cache_policy(settings.ring_spacing, ctx.cache.settings());
    let hits: Vec<Vec3> = ring_layout(Vec2::new(center.x, center.z), settings)
        .into_iter()
        .filter_map(|p| {
            ctx.downcast(
                caster,
                p.x,
                p.y,
                base_y,
                &settings.downcast_offsets,
                TrackableKinds::ALL,
                policy,
                now,
            )
        })
        .collect();

    let fit = fit_plane_robust(&hits)?;
    Ok(LocalSlope {
        slope_percent: fit.slope_percent(),
        downhill: fit.downhill(),
        normal: fit.normal(),
        rms_residual: fit.rms_residual,
        sample_count: hits.len(),
    })
}
