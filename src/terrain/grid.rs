//! Adaptive sample grid
//!
//! Turns a complexity profile into a sample budget and a step, then lays a
//! row-major grid over the boundary's bounding box. Edge points from the
//! assessment get extra focus samples around them.

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use super::complexity::{ComplexityTier, TerrainComplexityProfile};
use crate::constants::*;
use crate::geometry::{GridIndex, Polygon};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub min_samples: usize,
    pub max_samples: usize,
    /// Extra budget per assessment edge point, as a fraction
    pub edge_boost: f32,
    pub min_step: f32,
    pub max_step: f32,
    pub max_cells: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
            max_samples: MAX_SAMPLES,
            edge_boost: EDGE_SAMPLE_BOOST,
            min_step: MIN_STEP,
            max_step: MAX_STEP,
            max_cells: MAX_GRID_CELLS,
        }
    }
}

/// A requested sample location. Grid nodes carry their index, focus
/// samples around edge points do not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSample {
    pub index: Option<GridIndex>,
    pub position: Vec2,
}

impl GridSample {
    pub fn node(index: GridIndex, position: Vec2) -> Self {
        Self {
            index: Some(index),
            position,
        }
    }

    pub fn focus(position: Vec2) -> Self {
        Self {
            index: None,
            position,
        }
    }

    pub fn is_focus(&self) -> bool {
        self.index.is_none()
    }
}

/// The laid-out grid: where index (0, 0) sits, the spacing, and the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    pub origin: Vec2,
    pub step: f32,
    pub samples: Vec<GridSample>,
}

impl SampleGrid {
    pub fn node_count(&self) -> usize {
        self.samples.iter().filter(|s| !s.is_focus()).count()
    }

    pub fn focus_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_focus()).count()
    }
}

pub fn optimal_sample_count(profile: &TerrainComplexityProfile, settings: &GridSettings) -> usize {
    let min = settings.min_samples;
    let max = settings.max_samples.max(min);
    let base = match profile.tier {
        ComplexityTier::Flat | ComplexityTier::Unknown => min,
        ComplexityTier::Moderate => (min + max) / 2,
        ComplexityTier::Complex => max,
    };
    let boosted = base as f32 * (1.0 + settings.edge_boost * profile.edge_points.len() as f32);
    (boosted.round() as usize).clamp(min, max)
}

/// Spacing from the bounding box area shared among `count` samples.
pub fn step_size(area: f32, count: usize, settings: &GridSettings) -> f32 {
    if count == 0 || area <= 0.0 {
        return settings.max_step;
    }
    (area / count as f32).sqrt().clamp(settings.min_step, settings.max_step)
}

/// Coarsen `step` until the bounding box fits in the cell budget.
pub fn apply_cell_budget(width: f32, depth: f32, step: f32, max_cells: usize) -> f32 {
    if step <= 0.0 || max_cells == 0 {
        return step;
    }
    let estimate = (width / step) * (depth / step);
    if estimate > max_cells as f32 {
        step * (estimate / max_cells as f32).sqrt()
    } else {
        step
    }
}

/// Grid nodes inside the polygon, j (z) outer and i (x) inner, up to `target`.
fn grid_nodes(polygon: &Polygon, step: f32, target: Option<usize>) -> SampleGrid {
    let bounds = polygon.bounds();
    let origin = bounds.min;
    let mut samples = Vec::new();
    if step <= 0.0 {
        return SampleGrid {
            origin,
            step,
            samples,
        };
    }

    let cols = (bounds.width() / step).floor() as i32;
    let rows = (bounds.depth() / step).floor() as i32;
    'rows: for j in 0..=rows {
        for i in 0..=cols {
            if target.is_some_and(|t| samples.len() >= t) {
                break 'rows;
            }
            let position = origin + Vec2::new(i as f32 * step, j as f32 * step);
            if polygon.contains(position.x, position.y) {
                samples.push(GridSample::node(GridIndex::new(i, j), position));
            }
        }
    }

    SampleGrid {
        origin,
        step,
        samples,
    }
}

pub fn generate_sample_points(
    polygon: &Polygon,
    step: f32,
    target: usize,
    edge_points: &[Vec2],
) -> SampleGrid {
    let mut grid = grid_nodes(polygon, step, Some(target));
    let half = step * 0.5;
    let offsets = [
        Vec2::new(0.0, half),
        Vec2::new(half, 0.0),
        Vec2::new(0.0, -half),
        Vec2::new(-half, 0.0),
    ];
    for edge in edge_points {
        for offset in offsets {
            let p = *edge + offset;
            if polygon.contains(p.x, p.y) {
                grid.samples.push(GridSample::focus(p));
            }
        }
    }
    grid
}

/// Every node inside the polygon at `step`, with no target and no focus.
pub fn systematic_sample_points(polygon: &Polygon, step: f32) -> SampleGrid {
    grid_nodes(polygon, step, None)
}

/// Budget, step and layout for a boundary in one go. `quality` scales the
/// budget down under frame pressure, never below the minimum.
pub fn plan_grid(
    polygon: &Polygon,
    profile: &TerrainComplexityProfile,
    settings: &GridSettings,
    quality: f32,
) -> SampleGrid {
    let count = optimal_sample_count(profile, settings);
    let count = ((count as f32 * quality).round() as usize).max(settings.min_samples);
    let bounds = polygon.bounds();
    let step = step_size(bounds.area(), count, settings);
    let step = apply_cell_budget(bounds.width(), bounds.depth(), step, settings.max_cells);
    let edges: Vec<Vec2> = profile.edge_points.iter().map(|p| Vec2::new(p.x, p.z)).collect();
    generate_sample_points(polygon, step, count, &edges)
}
