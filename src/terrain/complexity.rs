//! Terrain complexity assessment
//!
//! A quick, sparse look at the surface inside the boundary before the main
//! scan: how much the height varies, how steep it gets between samples, and
//! where the height jumps locally. The result sizes the main sampling grid.

use bevy::math::{Vec2, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::geometry::{Polygon, horizontal_distance};
use super::sampler::HeightSampler;
use crate::raycast::{CachePolicy, RayCaster, RaycastContext};
use crate::stats::std_dev;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComplexityTier {
    Flat,
    Moderate,
    Complex,
    /// Too few hits to judge
    #[default]
    Unknown,
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplexityTier::Flat => write!(f, "flat"),
            ComplexityTier::Moderate => write!(f, "moderate"),
            ComplexityTier::Complex => write!(f, "complex"),
            ComplexityTier::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TerrainComplexityProfile {
    pub tier: ComplexityTier,
    /// Population standard deviation of sampled heights (m)
    pub variance_score: f32,
    /// Steepest slope between any two well separated samples (%)
    pub max_slope_percent: f32,
    pub edge_points: Vec<Vec3>,
    /// Assessment samples that produced a hit
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexitySettings {
    pub assessment_samples: usize,
    pub attempt_factor: usize,
    /// Downcast start heights above the sampling base, tried in order
    pub downcast_offsets: Vec<f32>,
    /// Sampling base sits this far above the highest boundary vertex
    pub downcast_clearance: f32,
    pub edge_detection_sensitivity: f32,
    pub edge_radius: f32,
    pub min_pair_separation: f32,
}

impl Default for ComplexitySettings {
    fn default() -> Self {
        Self {
            assessment_samples: ASSESSMENT_SAMPLES,
            attempt_factor: ASSESSMENT_ATTEMPT_FACTOR,
            downcast_offsets: DOWNCAST_OFFSETS.to_vec(),
            downcast_clearance: DOWNCAST_CLEARANCE,
            edge_detection_sensitivity: EDGE_DETECTION_SENSITIVITY,
            edge_radius: EDGE_NEIGHBORHOOD_RADIUS,
            min_pair_separation: MIN_PAIR_SEPARATION,
        }
    }
}

/// Height rays start from for a boundary
pub fn sampling_base_y(polygon: &Polygon, clearance: f32) -> f32 {
    polygon.max_height() + clearance
}

/// Rejection-sample up to `count` interior points. Falls back to the
/// systematic sampler when the random pass comes up short.
pub fn assessment_points(
    polygon: &Polygon,
    count: usize,
    attempt_factor: usize,
    rng: &mut impl Rng,
) -> Vec<Vec2> {
    let bounds = polygon.bounds();
    let mut points = Vec::with_capacity(count);
    if bounds.width() <= 0.0 || bounds.depth() <= 0.0 {
        return points;
    }

    for _ in 0..count * attempt_factor.max(1) {
        if points.len() >= count {
            break;
        }
        let x = rng.gen_range(bounds.min.x..bounds.max.x);
        let z = rng.gen_range(bounds.min.y..bounds.max.y);
        if polygon.contains(x, z) {
            points.push(Vec2::new(x, z));
        }
    }

    if points.len() < count {
        return systematic_points(polygon, count);
    }
    points
}

/// Deterministic interior points: cell centers of an ever finer square grid
/// over the bounding box until enough land inside.
pub fn systematic_points(polygon: &Polygon, count: usize) -> Vec<Vec2> {
    let bounds = polygon.bounds();
    let start = (count as f32).sqrt().ceil().max(1.0) as usize;
    let mut best = Vec::new();

    for side in start..=start * 4 {
        let mut inside = Vec::with_capacity(count);
        for row in 0..side {
            for col in 0..side {
                let x = bounds.min.x + (col as f32 + 0.5) / side as f32 * bounds.width();
                let z = bounds.min.y + (row as f32 + 0.5) / side as f32 * bounds.depth();
                if polygon.contains(x, z) {
                    inside.push(Vec2::new(x, z));
                }
            }
        }
        if inside.len() >= count {
            inside.truncate(count);
            return inside;
        }
        if inside.len() > best.len() {
            best = inside;
        }
    }
    best
}

pub fn classify(variance: f32, max_slope: f32, edges: usize) -> ComplexityTier {
    if variance > COMPLEX_VARIANCE || max_slope > COMPLEX_SLOPE || edges > COMPLEX_EDGES {
        ComplexityTier::Complex
    } else if variance > MODERATE_VARIANCE || max_slope > MODERATE_SLOPE || edges > MODERATE_EDGES
    {
        ComplexityTier::Moderate
    } else {
        ComplexityTier::Flat
    }
}

/// Build a profile from the assessment samples that hit.
pub fn profile_from_samples(samples: &[Vec3], settings: &ComplexitySettings) -> TerrainComplexityProfile {
    if samples.len() < 3 {
        return TerrainComplexityProfile {
            sample_count: samples.len(),
            ..Default::default()
        };
    }

    let heights: Vec<f32> = samples.iter().map(|p| p.y).collect();
    let variance_score = std_dev(&heights).unwrap_or(0.0);

    let mut max_slope_percent: f32 = 0.0;
    for (k, a) in samples.iter().enumerate() {
        for b in &samples[k + 1..] {
            let run = horizontal_distance(*a, *b);
            if run > settings.min_pair_separation {
                max_slope_percent = max_slope_percent.max((a.y - b.y).abs() / run * 100.0);
            }
        }
    }

    let edge_points: Vec<Vec3> = samples
        .iter()
        .filter(|p| {
            let (lo, hi) = samples
                .iter()
                .filter(|q| horizontal_distance(**p, **q) <= settings.edge_radius)
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), q| {
                    (lo.min(q.y), hi.max(q.y))
                });
            hi - lo > settings.edge_detection_sensitivity
        })
        .copied()
        .collect();

    TerrainComplexityProfile {
        tier: classify(variance_score, max_slope_percent, edge_points.len()),
        variance_score,
        max_slope_percent,
        edge_points,
        sample_count: samples.len(),
    }
}

/// Assessment: pick points, downcast each, profile the hits. Run it in one
/// go with [`TerrainComplexityAnalyzer::analyze`], or take the sampler from
/// [`TerrainComplexityAnalyzer::begin`] and resolve it across ticks.
#[derive(Debug, Clone, Default)]
pub struct TerrainComplexityAnalyzer {
    pub settings: ComplexitySettings,
}

impl TerrainComplexityAnalyzer {
    pub fn new(settings: ComplexitySettings) -> Self {
        Self { settings }
    }

    /// Queue the assessment downcasts for `polygon`. Returns the sampler and
    /// the height rays start from.
    pub fn begin(&self, polygon: &Polygon, rng: &mut impl Rng) -> (HeightSampler, f32) {
        let points = assessment_points(
            polygon,
            self.settings.assessment_samples,
            self.settings.attempt_factor,
            rng,
        );
        let base_y = sampling_base_y(polygon, self.settings.downcast_clearance);
        let bounds = polygon.bounds();
        let row_step = (bounds.depth() / (points.len().max(1) as f32).sqrt()).max(f32::EPSILON);
        let sampler = HeightSampler::new(
            &points,
            row_step,
            base_y,
            &self.settings.downcast_offsets,
            CachePolicy::Bypass,
        );
        (sampler, base_y)
    }

    /// Profile whatever the assessment sampler hit. Misses never reach here.
    pub fn profile(&self, hits: &[Vec3]) -> TerrainComplexityProfile {
        profile_from_samples(hits, &self.settings)
    }

    pub fn analyze(
        &self,
        ctx: &mut RaycastContext,
        caster: &mut dyn RayCaster,
        polygon: &Polygon,
        rng: &mut impl Rng,
        now: f64,
    ) -> TerrainComplexityProfile {
        let (mut sampler, _) = self.begin(polygon, rng);
        sampler.resolve_some(ctx, caster, usize::MAX, now);
        self.profile(sampler.hits())
    }
}
