//! Iso-contours by marching squares
//!
//! Every 2x2 block of present cells is classified against a level, crossing
//! points are interpolated along the block's edges, and the resulting raw
//! segments are stitched end to end into polylines.
//!
//! Corners of the block at (i, j):
//!
//! ```text
//!   c3 (i, j+1) --- e2 --- c2 (i+1, j+1)
//!        |                      |
//!       e3                     e1
//!        |                      |
//!   c0 (i, j)   --- e0 --- c1 (i+1, j)
//! ```
//!
//! Edges always run from the lower index corner to the higher one so the
//! two blocks sharing an edge compute bit-identical crossing points.

use bevy::math::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{ELEVATION_CONTOUR_INTERVAL, SLOPE_CONTOUR_INTERVAL, STITCH_TOLERANCE_SQ};
use crate::geometry::{GridField, GridIndex, HeightField};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourSettings {
    pub elevation_interval: f32,
    pub slope_interval: f32,
    pub stitch_tolerance_sq: f32,
}

impl Default for ContourSettings {
    fn default() -> Self {
        Self {
            elevation_interval: ELEVATION_CONTOUR_INTERVAL,
            slope_interval: SLOPE_CONTOUR_INTERVAL,
            stitch_tolerance_sq: STITCH_TOLERANCE_SQ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourPolyline {
    pub level: f32,
    pub points: Vec<Vec3>,
    pub closed: bool,
}

impl ContourPolyline {
    /// Length in the horizontal plane
    pub fn length(&self) -> f32 {
        self.points
            .windows(2)
            .map(|w| crate::geometry::horizontal_distance(w[0], w[1]))
            .sum()
    }
}

/// All polylines at one level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourSet {
    pub level: f32,
    pub polylines: Vec<ContourPolyline>,
}

type Segment = (Vec3, Vec3);

/// Edge pairs per case, corners c0..c3 mapping to bits 0..3
const CASES: [&[(usize, usize)]; 16] = [
    &[],
    &[(3, 0)],
    &[(0, 1)],
    &[(3, 1)],
    &[(1, 2)],
    &[(3, 0), (1, 2)],
    &[(0, 2)],
    &[(3, 2)],
    &[(2, 3)],
    &[(0, 2)],
    &[(0, 1), (2, 3)],
    &[(1, 2)],
    &[(1, 3)],
    &[(0, 1)],
    &[(3, 0)],
    &[],
];

/// Corner pair per edge, lower index corner first
const EDGE_CORNERS: [(usize, usize); 4] = [(0, 1), (1, 2), (3, 2), (0, 3)];

const CORNER_OFFSETS: [(i32, i32); 4] = [(0, 0), (1, 0), (1, 1), (0, 1)];

/// Levels at whole multiples of `interval` within [min, max]
pub fn contour_levels(min: f32, max: f32, interval: f32) -> Vec<f32> {
    if interval.is_nan() || interval <= 0.0 || !min.is_finite() || !max.is_finite() || max < min {
        return Vec::new();
    }
    let first = (min / interval).ceil() as i64;
    let last = (max / interval).floor() as i64;
    (first..=last).map(|k| k as f32 * interval).collect()
}

fn crossing(va: f32, vb: f32, level: f32) -> f32 {
    if (vb - va).abs() < 1e-9 {
        0.5
    } else {
        (level - va) / (vb - va)
    }
}

fn cell_segments(
    field: &GridField<f32>,
    drape: Option<&HeightField>,
    base: GridIndex,
    level: f32,
    out: &mut Vec<Segment>,
) {
    let mut corners = [base; 4];
    let mut values = [0.0f32; 4];
    for (k, (di, dj)) in CORNER_OFFSETS.iter().enumerate() {
        corners[k] = base.offset(*di, *dj);
        let Some(v) = field.get(corners[k]) else {
            return;
        };
        values[k] = *v;
    }

    let case = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= level)
        .fold(0usize, |acc, (k, _)| acc | (1 << k));

    let edge_point = |edge: usize| -> Vec3 {
        let (a, b) = EDGE_CORNERS[edge];
        let t = crossing(values[a], values[b], level);
        let pa = field.world_xz(corners[a]);
        let pb = field.world_xz(corners[b]);
        let xz = pa + (pb - pa) * t;
        let y = match drape {
            Some(heights) => match (heights.get(corners[a]), heights.get(corners[b])) {
                (Some(ha), Some(hb)) => ha + (hb - ha) * t,
                _ => level,
            },
            None => level,
        };
        Vec3::new(xz.x, y, xz.y)
    };

    for (ea, eb) in CASES[case] {
        out.push((edge_point(*ea), edge_point(*eb)));
    }
}

/// Raw marching squares segments for one level, in field order
pub fn march(field: &GridField<f32>, level: f32, drape: Option<&HeightField>) -> Vec<(Vec3, Vec3)> {
    let mut segments = Vec::new();
    for (&index, _) in field.iter() {
        cell_segments(field, drape, index, level, &mut segments);
    }
    segments
}

fn close_enough(a: Vec3, b: Vec3, tolerance_sq: f32) -> bool {
    let (dx, dz) = (a.x - b.x, a.z - b.z);
    dx * dx + dz * dz <= tolerance_sq
}

/// Closest unused segment endpoint to `p` within tolerance: (segment, is_start)
fn closest_endpoint(segments: &[Segment], used: &[bool], p: Vec3, tolerance_sq: f32) -> Option<(usize, bool)> {
    let mut best: Option<(usize, bool, f32)> = None;
    for (k, (a, b)) in segments.iter().enumerate() {
        if used[k] {
            continue;
        }
        for (end, is_start) in [(a, true), (b, false)] {
            let (dx, dz) = (end.x - p.x, end.z - p.z);
            let d = dx * dx + dz * dz;
            if d <= tolerance_sq && best.is_none_or(|(_, _, bd)| d < bd) {
                best = Some((k, is_start, d));
            }
        }
    }
    best.map(|(k, is_start, _)| (k, is_start))
}

/// Chain segments into polylines, extending at the tail then at the head.
pub fn stitch(segments: &[(Vec3, Vec3)], level: f32, tolerance_sq: f32) -> Vec<ContourPolyline> {
    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    for seed in 0..segments.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut points = std::collections::VecDeque::from([segments[seed].0, segments[seed].1]);

        loop {
            let tail = points[points.len() - 1];
            if let Some((k, is_start)) = closest_endpoint(segments, &used, tail, tolerance_sq) {
                used[k] = true;
                let (a, b) = segments[k];
                points.push_back(if is_start { b } else { a });
                continue;
            }
            let head = points[0];
            if let Some((k, is_start)) = closest_endpoint(segments, &used, head, tolerance_sq) {
                used[k] = true;
                let (a, b) = segments[k];
                points.push_front(if is_start { b } else { a });
                continue;
            }
            break;
        }

        if points.len() < 2 {
            continue;
        }
        let points: Vec<Vec3> = points.into();
        let closed = points.len() > 2 && close_enough(points[0], points[points.len() - 1], tolerance_sq);
        polylines.push(ContourPolyline {
            level,
            points,
            closed,
        });
    }
    polylines
}

/// Polylines of `field` at one level
pub fn extract(
    field: &GridField<f32>,
    level: f32,
    drape: Option<&HeightField>,
    tolerance_sq: f32,
) -> Vec<ContourPolyline> {
    stitch(&march(field, level, drape), level, tolerance_sq)
}

/// One contour set per level across the field's value range, in level order.
pub fn extract_levels(
    field: &GridField<f32>,
    interval: f32,
    drape: Option<&HeightField>,
    tolerance_sq: f32,
) -> Vec<ContourSet> {
    let Some((min, max)) = field.value_range() else {
        return Vec::new();
    };
    contour_levels(min, max, interval)
        .into_par_iter()
        .map(|level| ContourSet {
            level,
            polylines: extract(field, level, drape, tolerance_sq),
        })
        .filter(|set| !set.polylines.is_empty())
        .collect()
}
