//! Slope heatmap with contour overlays
//!
//! One square block of pixels per grid cell, +z pointing up the image.
//! Elevation contours are drawn dark, slope contours white.

use bevy::math::{Vec2, Vec3};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::analysis::AnalysisResult;
use crate::geometry::{GridField, GridIndex};
use crate::terrain::ContourSet;

const BACKGROUND: Rgb<u8> = Rgb([230, 230, 230]);
const ELEVATION_LINE: Rgb<u8> = Rgb([30, 30, 60]);
const SLOPE_LINE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    /// Pixels per grid cell side
    pub cell_px: u32,
    /// Slope at which the colour scale saturates red
    pub max_slope_percent: f32,
    pub draw_elevation: bool,
    pub draw_slope: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            cell_px: 8,
            max_slope_percent: 5.0,
            draw_elevation: true,
            draw_slope: false,
        }
    }
}

/// Green (flat) -> yellow -> red (steep)
pub fn slope_to_color(percent: f32, max_percent: f32) -> Rgb<u8> {
    let t = if max_percent > 0.0 {
        (percent / max_percent).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let r = (t * 2.0).min(1.0);
    let g = ((1.0 - t) * 2.0).min(1.0);
    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, 50])
}

/// Maps world (x, z) onto image pixels for one field's index window
struct Projection {
    origin: Vec2,
    step: f32,
    lo: GridIndex,
    hi: GridIndex,
    cell_px: u32,
}

impl Projection {
    fn new<T>(field: &GridField<T>, cell_px: u32) -> Option<Self> {
        let (lo, hi) = field.index_bounds()?;
        Some(Self {
            origin: field.origin,
            step: field.step,
            lo,
            hi,
            cell_px: cell_px.max(1),
        })
    }

    fn size(&self) -> (u32, u32) {
        let w = (self.hi.i - self.lo.i + 1) as u32 * self.cell_px;
        let h = (self.hi.j - self.lo.j + 1) as u32 * self.cell_px;
        (w, h)
    }

    fn cell_origin(&self, index: GridIndex) -> (u32, u32) {
        let x = (index.i - self.lo.i) as u32 * self.cell_px;
        let y = (self.hi.j - index.j) as u32 * self.cell_px;
        (x, y)
    }

    fn pixel(&self, p: Vec3) -> (f32, f32) {
        let gi = (p.x - self.origin.x) / self.step;
        let gj = (p.z - self.origin.y) / self.step;
        let px = (gi - self.lo.i as f32 + 0.5) * self.cell_px as f32;
        let py = (self.hi.j as f32 + 0.5 - gj) * self.cell_px as f32;
        (px, py)
    }
}

fn fill_cell(img: &mut RgbImage, x0: u32, y0: u32, size: u32, color: Rgb<u8>) {
    for dy in 0..size {
        for dx in 0..size {
            img.put_pixel(x0 + dx, y0 + dy, color);
        }
    }
}

fn draw_contours(img: &mut RgbImage, projection: &Projection, sets: &[ContourSet], color: Rgb<u8>) {
    for set in sets {
        for line in &set.polylines {
            for pair in line.points.windows(2) {
                draw_line_segment_mut(img, projection.pixel(pair[0]), projection.pixel(pair[1]), color);
            }
            if line.closed
                && let (Some(first), Some(last)) = (line.points.first(), line.points.last())
            {
                draw_line_segment_mut(img, projection.pixel(*last), projection.pixel(*first), color);
            }
        }
    }
}

/// Render a finished pass. None when there is nothing to draw.
pub fn render_pass(result: &AnalysisResult, settings: &RenderSettings) -> Option<RgbImage> {
    let projection = Projection::new(&result.height_field, settings.cell_px)?;
    let (width, height) = projection.size();
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    for (index, cell) in result.slope_field.iter() {
        let (x0, y0) = projection.cell_origin(*index);
        let color = slope_to_color(cell.percent, settings.max_slope_percent);
        fill_cell(&mut img, x0, y0, projection.cell_px, color);
    }

    if settings.draw_slope {
        draw_contours(&mut img, &projection, &result.slope_contours, SLOPE_LINE);
    }
    if settings.draw_elevation {
        draw_contours(&mut img, &projection, &result.elevation_contours, ELEVATION_LINE);
    }
    Some(img)
}
