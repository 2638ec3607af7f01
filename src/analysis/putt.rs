//! Putt line reading
//!
//! Samples a corridor between ball and hole, fits one plane to it and reads
//! the plane relative to the line: grade along it, cross slope across it and
//! which way the ball will break.

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DOWNCAST_CLEARANCE, DOWNCAST_OFFSETS, MIN_PUTT_LENGTH, PUTT_BREAK_DEAD_BAND, PUTT_LANE_OFFSET,
    PUTT_LANES, PUTT_STATIONS,
};
use crate::error::AnalysisError;
use crate::geometry::horizontal;
use crate::raycast::{RayCaster, RaycastContext, TrackableKinds};
use crate::stats::fit_plane_robust;
use crate::terrain::grid_cache_policy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuttSettings {
    pub stations: usize,
    pub lanes: usize,
    pub lane_offset: f32,
    /// Cross slope (%) below which the putt reads straight
    pub dead_band_percent: f32,
    pub clearance: f32,
    pub downcast_offsets: Vec<f32>,
}

impl Default for PuttSettings {
    fn default() -> Self {
        Self {
            stations: PUTT_STATIONS,
            lanes: PUTT_LANES,
            lane_offset: PUTT_LANE_OFFSET,
            dead_band_percent: PUTT_BREAK_DEAD_BAND,
            clearance: DOWNCAST_CLEARANCE,
            downcast_offsets: DOWNCAST_OFFSETS.to_vec(),
        }
    }
}

/// Side the ball falls toward, seen from the ball looking at the hole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakSide {
    Left,
    Right,
    Straight,
}

impl std::fmt::Display for BreakSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakSide::Left => write!(f, "left"),
            BreakSide::Right => write!(f, "right"),
            BreakSide::Straight => write!(f, "straight"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PuttAnalysis {
    /// Horizontal ball to hole distance (m)
    pub distance: f32,
    /// Fitted height at the hole minus at the ball (m)
    pub elevation_change: f32,
    /// Positive is uphill toward the hole
    pub grade_percent: f32,
    /// Positive falls to the left of the line
    pub cross_slope_percent: f32,
    pub break_side: BreakSide,
    pub downhill: Vec2,
    pub sample_count: usize,
    pub rms_residual: f32,
}

/// Left of `forward` in the (x, z) plane with y up
fn left_of(forward: Vec2) -> Vec2 {
    Vec2::new(forward.y, -forward.x)
}

/// Corridor sample positions: stations along the line, lanes across it.
pub fn corridor_points(start: Vec2, end: Vec2, settings: &PuttSettings) -> Vec<Vec2> {
    let forward = (end - start).normalize_or_zero();
    let left = left_of(forward);
    let stations = settings.stations.max(2);
    let centre_lane = (settings.lanes.max(1) - 1) as f32 * 0.5;

    let mut points = Vec::with_capacity(stations * settings.lanes.max(1));
    for s in 0..stations {
        let along = start.lerp(end, s as f32 / (stations - 1) as f32);
        for lane in 0..settings.lanes.max(1) {
            let across = (lane as f32 - centre_lane) * settings.lane_offset;
            points.push(along + left * across);
        }
    }
    points
}

pub fn classify_break(cross_slope_percent: f32, dead_band_percent: f32) -> BreakSide {
    if cross_slope_percent.abs() < dead_band_percent {
        BreakSide::Straight
    } else if cross_slope_percent > 0.0 {
        BreakSide::Left
    } else {
        BreakSide::Right
    }
}

pub fn analyze_putt(
    ctx: &mut RaycastContext,
    caster: &mut dyn RayCaster,
    start: Vec3,
    end: Vec3,
    settings: &PuttSettings,
    now: f64,
) -> Result<PuttAnalysis, AnalysisError> {
    let (a, b) = (horizontal(start), horizontal(end));
    let distance = a.distance(b);
    if distance < MIN_PUTT_LENGTH {
        return Err(AnalysisError::degenerate("ball and hole coincide"));
    }

    let base_y = start.y.max(end.y) + settings.clearance;
    let station_gap = distance / (settings.stations.max(2) - 1) as f32;
    let policy = grid_cache_policy(station_gap.min(settings.lane_offset), ctx.cache.settings());
    let hits: Vec<Vec3> = corridor_points(a, b, settings)
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
    let forward = (b - a) / distance;
    let gradient = fit.gradient();
    let cross_slope_percent = -gradient.dot(left_of(forward)) * 100.0;

    Ok(PuttAnalysis {
        distance,
        elevation_change: fit.height_at(b.x, b.y) - fit.height_at(a.x, a.y),
        grade_percent: gradient.dot(forward) * 100.0,
        cross_slope_percent,
        break_side: classify_break(cross_slope_percent, settings.dead_band_percent),
        downhill: fit.downhill(),
        sample_count: hits.len(),
        rms_residual: fit.rms_residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::{ContextSettings, Ray, RayHit};

    /// 3 % rising toward +x
    struct SideHill;

    impl RayCaster for SideHill {
        fn cast(&mut self, ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
            let p = ray.origin;
            Some(RayHit::new(Vec3::new(p.x, 0.03 * p.x, p.z), TrackableKinds::PLANES))
        }
    }

    #[test]
    fn test_corridor_shape() {
        let points = corridor_points(Vec2::ZERO, Vec2::new(0.0, 1.1), &PuttSettings::default());
        assert_eq!(points.len(), 36);
        // Facing +z, left is +x
        assert!(points[0].distance(Vec2::new(-0.15, 0.0)) < 1e-6);
        assert!(points[2].distance(Vec2::new(0.15, 0.0)) < 1e-6);
        assert!(points[35].distance(Vec2::new(0.15, 1.1)) < 1e-6);
    }

    #[test]
    fn test_across_the_hill_breaks_downhill() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let putt = analyze_putt(
            &mut ctx,
            &mut SideHill,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 0.0, 1.0),
            &PuttSettings::default(),
            0.0,
        )
        .unwrap();
        // Downhill is -x, which is right of a +z putt
        assert_eq!(putt.break_side, BreakSide::Right);
        assert!((putt.cross_slope_percent + 3.0).abs() < 1e-3);
        assert!(putt.grade_percent.abs() < 1e-3);
        assert!((putt.distance - 2.0).abs() < 1e-6);

        let reverse = analyze_putt(
            &mut ctx,
            &mut SideHill,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
            &PuttSettings::default(),
            0.0,
        )
        .unwrap();
        assert_eq!(reverse.break_side, BreakSide::Left);
    }

    #[test]
    fn test_straight_uphill() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let putt = analyze_putt(
            &mut ctx,
            &mut SideHill,
            Vec3::new(-1.0, -0.03, 0.0),
            Vec3::new(1.0, 0.03, 0.0),
            &PuttSettings::default(),
            0.0,
        )
        .unwrap();
        assert_eq!(putt.break_side, BreakSide::Straight);
        assert!((putt.grade_percent - 3.0).abs() < 1e-3);
        assert!((putt.elevation_change - 0.06).abs() < 1e-4);
        assert!(putt.downhill.distance(Vec2::NEG_X) < 1e-4);
    }

    #[test]
    fn test_coincident_endpoints() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let err = analyze_putt(
            &mut ctx,
            &mut SideHill,
            Vec3::ONE,
            Vec3::new(1.0, 0.5, 1.0),
            &PuttSettings::default(),
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_dead_band() {
        assert_eq!(classify_break(0.2, 0.25), BreakSide::Straight);
        assert_eq!(classify_break(0.3, 0.25), BreakSide::Left);
        assert_eq!(classify_break(-0.3, 0.25), BreakSide::Right);
    }
}
