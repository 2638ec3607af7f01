//! One complete analysis pass and its published result

use serde::Serialize;

use super::scan::{PipelineSettings, TerrainScan};
use crate::error::AnalysisError;
use crate::geometry::{HeightField, Polygon};
use crate::raycast::{RayCaster, RaycastContext};
use crate::terrain::{ContourSet, SlopeField, SlopeSummary, TerrainComplexityProfile};

/// Everything a pass produces. Immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub profile: TerrainComplexityProfile,
    pub step: f32,
    pub requested_samples: usize,
    pub resolved_samples: usize,
    /// The first grid came up short and a denser systematic grid was used
    pub retried: bool,
    pub height_range: Option<(f32, f32)>,
    pub height_field: HeightField,
    pub slope_field: SlopeField,
    pub slope_summary: SlopeSummary,
    pub elevation_contours: Vec<ContourSet>,
    pub slope_contours: Vec<ContourSet>,
}

/// Flat numbers worth logging or writing to a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub tier: String,
    pub variance_score: f32,
    pub assessment_max_slope: f32,
    pub edge_points: usize,
    pub step: f32,
    pub requested_samples: usize,
    pub resolved_samples: usize,
    pub height_cells: usize,
    pub slope_cells: usize,
    pub mean_slope: f32,
    pub min_slope: f32,
    pub max_slope: f32,
    pub min_height: Option<f32>,
    pub max_height: Option<f32>,
    pub elevation_levels: usize,
    pub elevation_polylines: usize,
    pub slope_levels: usize,
    pub slope_polylines: usize,
    pub retried: bool,
}

impl AnalysisResult {
    pub fn summary(&self) -> PassSummary {
        let polylines = |sets: &[ContourSet]| -> usize { sets.iter().map(|s| s.polylines.len()).sum() };
        PassSummary {
            tier: self.profile.tier.to_string(),
            variance_score: self.profile.variance_score,
            assessment_max_slope: self.profile.max_slope_percent,
            edge_points: self.profile.edge_points.len(),
            step: self.step,
            requested_samples: self.requested_samples,
            resolved_samples: self.resolved_samples,
            height_cells: self.height_field.len(),
            slope_cells: self.slope_summary.cells,
            mean_slope: self.slope_summary.mean_percent,
            min_slope: self.slope_summary.min_percent,
            max_slope: self.slope_summary.max_percent,
            min_height: self.height_range.map(|r| r.0),
            max_height: self.height_range.map(|r| r.1),
            elevation_levels: self.elevation_contours.len(),
            elevation_polylines: polylines(&self.elevation_contours),
            slope_levels: self.slope_contours.len(),
            slope_polylines: polylines(&self.slope_contours),
            retried: self.retried,
        }
    }
}

/// Run a whole pass synchronously: same steps as ticking a [`TerrainScan`],
/// with no per-tick budget.
pub fn run_analysis(
    ctx: &mut RaycastContext,
    caster: &mut dyn RayCaster,
    polygon: &Polygon,
    settings: &PipelineSettings,
    now: f64,
) -> Result<AnalysisResult, AnalysisError> {
    let mut scan = TerrainScan::start(polygon.clone(), settings.clone());
    scan.advance_with_budget(ctx, caster, usize::MAX, now);
    scan.take_outcome().unwrap_or(Err(AnalysisError::EmptyInput))
}
