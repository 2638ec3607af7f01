//! Greenslope - golf green terrain sampling, slope fields and contours
//!
//! Samples surface heights inside a boundary by casting rays through a
//! platform hit test, then builds a height field, a slope field and contour
//! polylines from them. Runs standalone or as a bevy plugin.

// Engine
pub mod analysis;
pub mod geometry;
pub mod quality;
pub mod raycast;
pub mod stats;
pub mod terrain;

// Core modules
pub mod config;
pub mod config_watcher;
pub mod constants;
pub mod error;
pub mod plugin;

// Tools
pub mod render;
pub mod scenario;

// Re-export commonly used types for convenience
pub use analysis::{
    AnalysisResult, BreakSide, LocalSlope, PassSummary, PipelineSettings, PuttAnalysis, ScanStatus,
    TerrainScan, analyze_putt, estimate_local_slope, run_analysis, sample_point_of_interest,
};
pub use config::AnalysisSettings;
pub use config_watcher::ConfigWatcher;
pub use error::AnalysisError;
pub use geometry::{GridField, GridIndex, HeightField, Polygon};
pub use plugin::{ActiveRayCaster, GreenAnalysisPlugin, PublishedAnalysis, TerrainScanner};
pub use raycast::{Ray, RayCaster, RayHit, RaycastContext, TrackableKinds};
pub use terrain::{ComplexityTier, ContourPolyline, ContourSet, SlopeField, TerrainComplexityProfile};
