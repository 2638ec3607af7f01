//! Tunable constants for greenslope
//!
//! Every default used by the analysis engine is defined here. The serde
//! defaults in `config` point back at these values.

// =============================================================================
// BOUNDARY
// =============================================================================

pub const MIN_POLYGON_VERTICES: usize = 3;
pub const MIN_POLYGON_AREA: f32 = 0.5; // m²

// =============================================================================
// RAYCAST CACHE
// =============================================================================

pub const CACHE_MAX_AGE: f64 = 60.0; // seconds
pub const CACHE_VALID_DISTANCE: f32 = 0.05; // meters between ray origins
pub const CACHE_DIRECTION_COSINE: f32 = 0.98; // ~11° cone
pub const CACHE_CAPACITY: usize = 6;

// =============================================================================
// GAZE PREDICTION
// =============================================================================

pub const GAZE_HISTORY_SIZE: usize = 10;
pub const GAZE_SAMPLE_INTERVAL: f64 = 0.1; // seconds between history samples
pub const GAZE_PREDICTION_HORIZON: f32 = 0.2; // seconds
pub const GAZE_PREDICTION_WEIGHT: f32 = 0.3; // 0 disables prediction

// =============================================================================
// ADAPTIVE QUALITY
// =============================================================================

pub const FRAME_WINDOW: usize = 30;
pub const TARGET_FRAME_TIME_MS: f32 = 16.67;
pub const QUALITY_MIN: f32 = 0.5;
pub const QUALITY_MAX: f32 = 1.0;
pub const QUALITY_DECREASE_RATE: f32 = 0.1; // per second over budget
pub const QUALITY_INCREASE_RATE: f32 = 0.05; // per second under budget
pub const QUALITY_OVER_BUDGET: f32 = 1.2; // × target frame time
pub const QUALITY_UNDER_BUDGET: f32 = 0.9; // × target frame time
pub const HIGH_TIER_FPS: f32 = 60.0;
pub const HIGH_TIER_FRAME_MS: f32 = 16.67;
pub const MEDIUM_TIER_FPS: f32 = 30.0;
pub const MEDIUM_TIER_FRAME_MS: f32 = 33.33;

// =============================================================================
// TERRAIN COMPLEXITY
// =============================================================================

pub const ASSESSMENT_SAMPLES: usize = 25;
pub const ASSESSMENT_ATTEMPT_FACTOR: usize = 20; // random tries per wanted point
pub const DOWNCAST_OFFSETS: [f32; 3] = [0.0, 0.4, 0.8];
pub const DOWNCAST_CLEARANCE: f32 = 0.5; // above the highest boundary vertex
pub const MIN_PAIR_SEPARATION: f32 = 0.1; // meters, for pairwise slope
pub const EDGE_NEIGHBORHOOD_RADIUS: f32 = 1.0;
pub const EDGE_DETECTION_SENSITIVITY: f32 = 0.05;

pub const MODERATE_VARIANCE: f32 = 0.01;
pub const MODERATE_SLOPE: f32 = 2.0;
pub const MODERATE_EDGES: usize = 2;
pub const COMPLEX_VARIANCE: f32 = 0.05;
pub const COMPLEX_SLOPE: f32 = 5.0;
pub const COMPLEX_EDGES: usize = 5;

// =============================================================================
// SAMPLE GRID
// =============================================================================

pub const MIN_SAMPLES: usize = 200;
pub const MAX_SAMPLES: usize = 4000;
pub const EDGE_SAMPLE_BOOST: f32 = 0.1; // per detected edge point
pub const MIN_STEP: f32 = 0.02;
pub const MAX_STEP: f32 = 0.5;
pub const MAX_GRID_CELLS: usize = 10_000;

// =============================================================================
// HEIGHT FIELD / SLOPE / CONTOURS
// =============================================================================

pub const MIN_HEIGHT_FIELD_POINTS: usize = 20;
pub const MIN_ROBUST_FIT_POINTS: usize = 6;
pub const OUTLIER_K: f32 = 2.5;
pub const PLANE_FIT_EPSILON: f64 = 1e-8;
pub const ELEVATION_CONTOUR_INTERVAL: f32 = 0.01; // meters
pub const SLOPE_CONTOUR_INTERVAL: f32 = 0.5; // percent
pub const STITCH_TOLERANCE_SQ: f32 = 1e-3; // squared meters

// =============================================================================
// TICKED SCANNING
// =============================================================================

pub const RAYS_PER_TICK: usize = 64;
pub const ASSESSMENT_SEED: u64 = 0x5EED_6EE2;

// =============================================================================
// POINT OF INTEREST / LOCAL SLOPE / PUTT LINE
// =============================================================================

pub const POI_RING_RAYS: usize = 8;
pub const POI_RING_RADIUS: f32 = 0.02;
pub const LOCAL_SLOPE_RINGS: usize = 2;
pub const LOCAL_SLOPE_RING_RAYS: usize = 8;
pub const LOCAL_SLOPE_RING_SPACING: f32 = 0.15;
pub const PUTT_STATIONS: usize = 12;
pub const PUTT_LANES: usize = 3;
pub const PUTT_LANE_OFFSET: f32 = 0.15;
pub const MIN_PUTT_LENGTH: f32 = 1e-3;
pub const PUTT_BREAK_DEAD_BAND: f32 = 0.25; // percent cross slope

// =============================================================================
// CONFIG HOT RELOAD
// =============================================================================

pub const CONFIG_CHECK_INTERVAL: f32 = 10.0; // seconds
