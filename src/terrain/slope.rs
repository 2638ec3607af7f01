//! Slope field by central differences

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::geometry::{GridField, HeightField};

/// Slope at one cell. `direction` points uphill in (x, z); zero when flat.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlopeCell {
    pub percent: f32,
    pub direction: Vec2,
}

impl SlopeCell {
    pub fn downhill(&self) -> Vec2 {
        -self.direction
    }
}

pub type SlopeField = GridField<SlopeCell>;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlopeSummary {
    pub cells: usize,
    pub mean_percent: f32,
    pub max_percent: f32,
    pub min_percent: f32,
}

/// Slope for every cell whose four axis neighbours are all present.
pub fn compute_slope_field(heights: &HeightField) -> SlopeField {
    let mut slopes = SlopeField::new(heights.origin, heights.step);
    let span = 2.0 * heights.step;
    if span <= 0.0 {
        return slopes;
    }

    for (&index, _) in heights.iter() {
        let (Some(east), Some(west), Some(north), Some(south)) = (
            heights.get(index.offset(1, 0)),
            heights.get(index.offset(-1, 0)),
            heights.get(index.offset(0, 1)),
            heights.get(index.offset(0, -1)),
        ) else {
            continue;
        };
        let gradient = Vec2::new((east - west) / span, (north - south) / span);
        slopes.insert(
            index,
            SlopeCell {
                percent: gradient.length() * 100.0,
                direction: gradient.normalize_or_zero(),
            },
        );
    }
    slopes
}

pub fn summarize(slopes: &SlopeField) -> SlopeSummary {
    let mut iter = slopes.iter().map(|(_, cell)| cell.percent);
    let Some(first) = iter.next() else {
        return SlopeSummary::default();
    };
    let (mut sum, mut min, mut max, mut n) = (first as f64, first, first, 1usize);
    for p in iter {
        sum += p as f64;
        min = min.min(p);
        max = max.max(p);
        n += 1;
    }
    SlopeSummary {
        cells: n,
        mean_percent: (sum / n as f64) as f32,
        max_percent: max,
        min_percent: min,
    }
}

/// Slope percent as its own scalar field, for contouring
pub fn percent_field(slopes: &SlopeField) -> GridField<f32> {
    slopes.map(|cell| cell.percent)
}
