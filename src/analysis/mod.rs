//! Analysis passes over a boundary, plus the point tools (POI placement,
//! local slope, putt line) that reuse the same ray casting.

pub mod local_slope;
pub mod pass;
pub mod poi;
pub mod putt;
pub mod scan;

pub use local_slope::{LocalSlope, LocalSlopeSettings, estimate_local_slope};
pub use pass::{AnalysisResult, PassSummary, run_analysis};
pub use poi::{PoiSettings, sample_point_of_interest};
pub use putt::{BreakSide, PuttAnalysis, PuttSettings, analyze_putt};
pub use scan::{PipelineSettings, ScanSettings, ScanStatus, TerrainScan};
