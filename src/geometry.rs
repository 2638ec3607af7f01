//! Boundary polygons, grid addressing and sparse grid fields
//!
//! Everything here works on the horizontal (x, z) projection; y is up.

use std::collections::BTreeMap;
use std::collections::btree_map;

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{MIN_POLYGON_AREA, MIN_POLYGON_VERTICES};
use crate::error::AnalysisError;

/// Horizontal projection of a world point.
#[inline]
pub fn horizontal(p: Vec3) -> Vec2 {
    Vec2::new(p.x, p.z)
}

/// Horizontal distance between two world points.
#[inline]
pub fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    horizontal(a).distance(horizontal(b))
}

/// Axis-aligned bounds in the (x, z) plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Extent along z
    pub fn depth(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f32 {
        self.width() * self.depth()
    }
}

/// Shoelace signed area over (x, z). Negative means clockwise.
pub fn signed_area(vertices: &[Vec3]) -> f32 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        sum += a.x * b.z - b.x * a.z;
    }
    sum * 0.5
}

/// Closed boundary in the horizontal plane, wound clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vec3>,
}

impl Polygon {
    /// Validate a boundary with the default minimum area.
    pub fn new(vertices: Vec<Vec3>) -> Result<Self, AnalysisError> {
        Self::with_min_area(vertices, MIN_POLYGON_AREA)
    }

    /// Validate a boundary and normalize its winding to clockwise.
    pub fn with_min_area(mut vertices: Vec<Vec3>, min_area: f32) -> Result<Self, AnalysisError> {
        if vertices.len() < MIN_POLYGON_VERTICES {
            return Err(AnalysisError::InsufficientSamples {
                needed: MIN_POLYGON_VERTICES,
                got: vertices.len(),
            });
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::degenerate("boundary vertex is not finite"));
        }

        let area = signed_area(&vertices);
        if area.abs() < min_area {
            return Err(AnalysisError::degenerate(format!(
                "boundary area {:.3} m² below minimum {:.3} m²",
                area.abs(),
                min_area
            )));
        }
        if area > 0.0 {
            vertices.reverse();
        }

        Ok(Self { vertices })
    }

    /// Axis-aligned square centered at `center`, at the center's height.
    pub fn square(center: Vec3, side: f32) -> Result<Self, AnalysisError> {
        let h = side / 2.0;
        Self::new(vec![
            Vec3::new(center.x - h, center.y, center.z - h),
            Vec3::new(center.x + h, center.y, center.z - h),
            Vec3::new(center.x + h, center.y, center.z + h),
            Vec3::new(center.x - h, center.y, center.z + h),
        ])
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn area(&self) -> f32 {
        signed_area(&self.vertices).abs()
    }

    pub fn is_clockwise(&self) -> bool {
        signed_area(&self.vertices) < 0.0
    }

    /// Ray-crossing inclusion test on the horizontal projection.
    /// Points exactly on an edge land on either side, consistently for a
    /// given polygon.
    pub fn contains(&self, x: f32, z: f32) -> bool {
        let v = &self.vertices;
        let mut inside = false;
        let mut j = v.len() - 1;
        for i in 0..v.len() {
            let (xi, zi) = (v[i].x, v[i].z);
            let (xj, zj) = (v[j].x, v[j].z);
            if (zi > z) != (zj > z) && x < (xj - xi) * (z - zi) / (zj - zi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.contains(p.x, p.z)
    }

    pub fn bounds(&self) -> Bounds {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for v in &self.vertices {
            min = min.min(horizontal(*v));
            max = max.max(horizontal(*v));
        }
        Bounds { min, max }
    }

    pub fn mean_height(&self) -> f32 {
        self.vertices.iter().map(|v| v.y).sum::<f32>() / self.vertices.len() as f32
    }

    pub fn max_height(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.y)
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Integer cell address relative to a grid origin; `i` runs along x, `j` along z.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridIndex {
    pub i: i32,
    pub j: i32,
}

impl GridIndex {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    pub const fn offset(self, di: i32, dj: i32) -> Self {
        Self {
            i: self.i + di,
            j: self.j + dj,
        }
    }
}

/// Sparse, ordered mapping from grid cells to values over a uniform grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridField<T> {
    /// World (x, z) of index (0, 0)
    pub origin: Vec2,
    pub step: f32,
    cells: BTreeMap<GridIndex, T>,
}

/// Elevation per cell
pub type HeightField = GridField<f32>;

impl<T> GridField<T> {
    pub fn new(origin: Vec2, step: f32) -> Self {
        Self {
            origin,
            step,
            cells: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, index: GridIndex, value: T) -> Option<T> {
        self.cells.insert(index, value)
    }

    pub fn get(&self, index: GridIndex) -> Option<&T> {
        self.cells.get(&index)
    }

    pub fn contains(&self, index: GridIndex) -> bool {
        self.cells.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, GridIndex, T> {
        self.cells.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, GridIndex, T> {
        self.cells.keys()
    }

    /// World (x, z) of a grid node
    pub fn world_xz(&self, index: GridIndex) -> Vec2 {
        self.origin + Vec2::new(index.i as f32, index.j as f32) * self.step
    }

    /// Nearest grid node to a world (x, z) position
    pub fn nearest_index(&self, x: f32, z: f32) -> GridIndex {
        GridIndex::new(
            ((x - self.origin.x) / self.step).round() as i32,
            ((z - self.origin.y) / self.step).round() as i32,
        )
    }

    /// Smallest and largest (i, j) present, componentwise
    pub fn index_bounds(&self) -> Option<(GridIndex, GridIndex)> {
        let mut keys = self.cells.keys();
        let first = *keys.next()?;
        let (mut lo, mut hi) = (first, first);
        for k in keys {
            lo = GridIndex::new(lo.i.min(k.i), lo.j.min(k.j));
            hi = GridIndex::new(hi.i.max(k.i), hi.j.max(k.j));
        }
        Some((lo, hi))
    }

    /// Same topology with each value mapped
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> GridField<U> {
        GridField {
            origin: self.origin,
            step: self.step,
            cells: self.cells.iter().map(|(k, v)| (*k, f(v))).collect(),
        }
    }
}

impl GridField<f32> {
    /// (min, max) of the stored values
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let mut values = self.cells.values().copied();
        let first = values.next()?;
        Some(values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// World point of a stored cell, its value as y
    pub fn world_point(&self, index: GridIndex) -> Option<Vec3> {
        let value = *self.get(index)?;
        let xz = self.world_xz(index);
        Some(Vec3::new(xz.x, value, xz.y))
    }
}
