//! Terrain sampling pipeline: assessment, grid layout, elevation sampling,
//! height and slope fields, contours.

pub mod complexity;
pub mod contour;
pub mod grid;
pub mod height_field;
pub mod sampler;
pub mod slope;

pub use complexity::*;
pub use contour::{ContourPolyline, ContourSet, ContourSettings, contour_levels, extract, extract_levels};
pub use grid::*;
pub use height_field::*;
pub use sampler::*;
pub use slope::*;
