//! Resumable terrain scan
//!
//! A scan walks Idle -> Assessing -> Sampling -> Done | Failed. Each call to
//! [`TerrainScan::advance`] spends a bounded number of downcasts so the
//! caller can interleave it with frame work; finalization (height field,
//! slope field, contours) runs in the tick that resolves the last sample.

use bevy::log::{debug, info, warn};
use bevy::math::{Vec2, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::pass::AnalysisResult;
use crate::constants::{ASSESSMENT_SEED, RAYS_PER_TICK};
use crate::error::AnalysisError;
use crate::geometry::Polygon;
use crate::raycast::{RayCaster, RaycastContext};
use crate::terrain::{
    ComplexitySettings, ContourSettings, GridSettings, HeightFieldBuilder, HeightFieldSettings,
    HeightSampler, SampleGrid, TerrainComplexityAnalyzer, TerrainComplexityProfile,
    apply_cell_budget, compute_slope_field, extract_levels, grid_cache_policy, percent_field,
    plan_grid, summarize, systematic_sample_points,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Downcast requests per tick at full quality
    pub rays_per_tick: usize,
    /// Retry once on a systematic half-step grid when too few samples land
    pub retry_on_insufficient: bool,
    pub seed: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            rays_per_tick: RAYS_PER_TICK,
            retry_on_insufficient: true,
            seed: ASSESSMENT_SEED,
        }
    }
}

/// Everything one scan needs to know about sampling and extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSettings {
    pub complexity: ComplexitySettings,
    pub grid: GridSettings,
    pub height_field: HeightFieldSettings,
    pub contour: ContourSettings,
    pub scan: ScanSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Assessing,
    Sampling,
    Done,
    Failed,
}

impl ScanStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, ScanStatus::Done | ScanStatus::Failed)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScanStatus::Idle => "idle",
            ScanStatus::Assessing => "assessing",
            ScanStatus::Sampling => "sampling",
            ScanStatus::Done => "done",
            ScanStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Assessing {
        analyzer: TerrainComplexityAnalyzer,
        sampler: HeightSampler,
    },
    Sampling {
        profile: TerrainComplexityProfile,
        grid: SampleGrid,
        sampler: HeightSampler,
        retried: bool,
    },
    Done(Box<AnalysisResult>),
    Failed(AnalysisError),
}

#[derive(Debug)]
pub struct TerrainScan {
    polygon: Option<Polygon>,
    settings: PipelineSettings,
    /// Reloaded settings held back until the next scan starts
    queued: Option<PipelineSettings>,
    phase: Phase,
    base_y: f32,
}

impl Default for TerrainScan {
    fn default() -> Self {
        Self::idle(PipelineSettings::default())
    }
}

impl TerrainScan {
    pub fn idle(settings: PipelineSettings) -> Self {
        Self {
            polygon: None,
            settings,
            queued: None,
            phase: Phase::Idle,
            base_y: 0.0,
        }
    }

    /// Begin a scan of `polygon`. Assessment points are drawn here from the
    /// seeded generator, so equal inputs give equal scans.
    pub fn start(polygon: Polygon, settings: PipelineSettings) -> Self {
        let mut scan = Self::idle(settings);
        scan.restart(polygon);
        scan
    }

    /// Abandon whatever is in flight and scan `polygon` instead.
    pub fn restart(&mut self, polygon: Polygon) {
        if let Some(settings) = self.queued.take() {
            self.settings = settings;
        }
        let analyzer = TerrainComplexityAnalyzer::new(self.settings.complexity.clone());
        let mut rng = StdRng::seed_from_u64(self.settings.scan.seed);
        let (sampler, base_y) = analyzer.begin(&polygon, &mut rng);
        debug!("Terrain scan assessing {} points", sampler.requested());
        self.base_y = base_y;
        self.polygon = Some(polygon);
        self.phase = Phase::Assessing { analyzer, sampler };
    }

    /// Settings the current (or last) scan runs with
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Settings the next started scan will run with
    pub fn next_settings(&self) -> &PipelineSettings {
        self.queued.as_ref().unwrap_or(&self.settings)
    }

    /// New settings apply from the next started scan. A scan in flight keeps
    /// the settings it started with.
    pub fn set_settings(&mut self, settings: PipelineSettings) {
        if matches!(self.phase, Phase::Assessing { .. } | Phase::Sampling { .. }) {
            self.queued = Some(settings);
        } else {
            self.queued = None;
            self.settings = settings;
        }
    }

    pub fn polygon(&self) -> Option<&Polygon> {
        self.polygon.as_ref()
    }

    pub fn status(&self) -> ScanStatus {
        match self.phase {
            Phase::Idle => ScanStatus::Idle,
            Phase::Assessing { .. } => ScanStatus::Assessing,
            Phase::Sampling { .. } => ScanStatus::Sampling,
            Phase::Done(_) => ScanStatus::Done,
            Phase::Failed(_) => ScanStatus::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.phase {
            Phase::Done(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        match &self.phase {
            Phase::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Hand over a finished outcome, leaving the scan idle.
    pub fn take_outcome(&mut self) -> Option<Result<AnalysisResult, AnalysisError>> {
        if !self.is_finished() {
            return None;
        }
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Done(result) => Some(Ok(*result)),
            Phase::Failed(err) => Some(Err(err)),
            _ => None,
        }
    }

    /// Abandon an unfinished scan. What was gathered so far is reported as
    /// too few samples.
    pub fn cancel(&mut self) {
        let got = match &self.phase {
            Phase::Assessing { sampler, .. } | Phase::Sampling { sampler, .. } => sampler.hits().len(),
            _ => return,
        };
        info!("Terrain scan cancelled with {} samples resolved", got);
        self.phase = Phase::Failed(AnalysisError::InsufficientSamples {
            needed: self.settings.height_field.min_points,
            got,
        });
    }

    /// Downcast requests allowed this tick at the context's current quality
    pub fn tick_budget(&self, ctx: &RaycastContext) -> usize {
        ctx.quality.scaled_count(self.settings.scan.rays_per_tick, 1)
    }

    /// One cooperative tick
    pub fn advance(&mut self, ctx: &mut RaycastContext, caster: &mut dyn RayCaster, now: f64) -> ScanStatus {
        let budget = self.tick_budget(ctx);
        self.advance_with_budget(ctx, caster, budget, now)
    }

    pub fn advance_with_budget(
        &mut self,
        ctx: &mut RaycastContext,
        caster: &mut dyn RayCaster,
        budget: usize,
        now: f64,
    ) -> ScanStatus {
        let mut budget = budget;
        loop {
            match &mut self.phase {
                Phase::Idle | Phase::Done(_) | Phase::Failed(_) => break,
                Phase::Assessing { analyzer, sampler } => {
                    budget -= sampler.resolve_some(ctx, caster, budget, now);
                    if !sampler.is_done() {
                        break;
                    }
                    let profile = analyzer.profile(sampler.hits());
                    self.begin_sampling(ctx, profile);
                }
                Phase::Sampling { sampler, .. } => {
                    budget -= sampler.resolve_some(ctx, caster, budget, now);
                    if !sampler.is_done() {
                        break;
                    }
                    self.finalize(ctx);
                }
            }
        }
        self.status()
    }

    fn begin_sampling(&mut self, ctx: &RaycastContext, profile: TerrainComplexityProfile) {
        let Some(polygon) = &self.polygon else {
            self.phase = Phase::Failed(AnalysisError::EmptyInput);
            return;
        };
        let grid = plan_grid(polygon, &profile, &self.settings.grid, ctx.quality.quality_scale());
        debug!(
            "Terrain assessed {} ({} hits, {} edges); sampling {} points at {:.3} m",
            profile.tier,
            profile.sample_count,
            profile.edge_points.len(),
            grid.samples.len(),
            grid.step
        );
        let sampler = self.grid_sampler(ctx, &grid);
        self.phase = Phase::Sampling {
            profile,
            grid,
            sampler,
            retried: false,
        };
    }

    fn grid_sampler(&self, ctx: &RaycastContext, grid: &SampleGrid) -> HeightSampler {
        let points: Vec<Vec2> = grid.samples.iter().map(|s| s.position).collect();
        HeightSampler::new(
            &points,
            grid.step,
            self.base_y,
            &self.settings.complexity.downcast_offsets,
            grid_cache_policy(grid.step, ctx.cache.settings()),
        )
    }

    fn finalize(&mut self, ctx: &RaycastContext) {
        let Phase::Sampling {
            profile,
            grid,
            sampler,
            retried,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };

        let builder = HeightFieldBuilder::new(self.settings.height_field);
        let hits: Vec<Vec3> = sampler.into_hits();
        let heights = match builder.build(&grid, &hits) {
            Ok(heights) => heights,
            Err(err) => {
                if err.is_retryable() && !retried && self.settings.scan.retry_on_insufficient {
                    if let Some(polygon) = &self.polygon {
                        let bounds = polygon.bounds();
                        let step = apply_cell_budget(
                            bounds.width(),
                            bounds.depth(),
                            grid.step * 0.5,
                            self.settings.grid.max_cells,
                        );
                        let retry = systematic_sample_points(polygon, step);
                        warn!("Terrain scan: {}; retrying on a {:.3} m systematic grid", err, step);
                        let sampler = self.grid_sampler(ctx, &retry);
                        self.phase = Phase::Sampling {
                            profile,
                            grid: retry,
                            sampler,
                            retried: true,
                        };
                        return;
                    }
                }
                warn!("Terrain scan failed: {}", err);
                self.phase = Phase::Failed(err);
                return;
            }
        };

        let contour = &self.settings.contour;
        let slopes = compute_slope_field(&heights);
        let elevation_contours =
            extract_levels(&heights, contour.elevation_interval, None, contour.stitch_tolerance_sq);
        let slope_contours = extract_levels(
            &percent_field(&slopes),
            contour.slope_interval,
            Some(&heights),
            contour.stitch_tolerance_sq,
        );
        let slope_summary = summarize(&slopes);

        info!(
            "Terrain pass done: {} terrain, {} cells at {:.3} m, mean slope {:.2}%, {} elevation levels",
            profile.tier,
            heights.len(),
            grid.step,
            slope_summary.mean_percent,
            elevation_contours.len()
        );

        self.phase = Phase::Done(Box::new(AnalysisResult {
            profile,
            step: grid.step,
            requested_samples: grid.samples.len(),
            resolved_samples: hits.len(),
            retried,
            height_range: heights.value_range(),
            height_field: heights,
            slope_field: slopes,
            slope_summary,
            elevation_contours,
            slope_contours,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::{ContextSettings, Ray, RayHit, TrackableKinds};

    /// y = 0.02 x everywhere
    struct Grade;

    impl RayCaster for Grade {
        fn cast(&mut self, ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
            let p = ray.origin;
            Some(RayHit::new(Vec3::new(p.x, 0.02 * p.x, p.z), TrackableKinds::PLANES))
        }
    }

    struct Level;

    impl RayCaster for Level {
        fn cast(&mut self, ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
            let p = ray.origin;
            Some(RayHit::new(Vec3::new(p.x, 0.0, p.z), TrackableKinds::PLANES))
        }
    }

    /// Tracking lost: nothing ever hits
    struct Void;

    impl RayCaster for Void {
        fn cast(&mut self, _ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
            None
        }
    }

    fn square() -> Polygon {
        Polygon::square(Vec3::ZERO, 2.0).unwrap()
    }

    #[test]
    fn test_ticks_walk_through_phases() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), PipelineSettings::default());
        assert_eq!(scan.status(), ScanStatus::Assessing);

        assert_eq!(scan.advance_with_budget(&mut ctx, &mut Grade, 10, 0.0), ScanStatus::Assessing);
        assert_eq!(scan.advance_with_budget(&mut ctx, &mut Grade, 20, 0.1), ScanStatus::Sampling);

        let mut ticks = 0;
        while !scan.is_finished() {
            scan.advance(&mut ctx, &mut Grade, 0.2 + ticks as f64 * 0.016);
            ticks += 1;
            assert!(ticks < 1000);
        }
        assert!(ticks > 1, "sampling spans several ticks");
        assert_eq!(scan.status(), ScanStatus::Done);
        let result = scan.result().unwrap();
        assert!(result.height_field.len() >= 20);
        assert!(!result.retried);
    }

    #[test]
    fn test_cancel_reports_insufficient_samples() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), PipelineSettings::default());
        scan.advance_with_budget(&mut ctx, &mut Grade, 25, 0.0);
        scan.advance_with_budget(&mut ctx, &mut Grade, 30, 0.0);
        assert_eq!(scan.status(), ScanStatus::Sampling);

        scan.cancel();
        assert_eq!(
            scan.error(),
            Some(&AnalysisError::InsufficientSamples { needed: 20, got: 30 })
        );
        // Cancelling a finished scan changes nothing
        scan.cancel();
        assert_eq!(scan.status(), ScanStatus::Failed);
        assert!(scan.take_outcome().unwrap().is_err());
        assert_eq!(scan.status(), ScanStatus::Idle);
    }

    #[test]
    fn test_retry_then_surface_failure() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), PipelineSettings::default());
        let status = scan.advance_with_budget(&mut ctx, &mut Void, usize::MAX, 0.0);
        assert_eq!(status, ScanStatus::Failed);
        assert_eq!(
            scan.error(),
            Some(&AnalysisError::InsufficientSamples { needed: 20, got: 0 })
        );
    }

    #[test]
    fn test_retry_disabled_fails_first_time() {
        let mut settings = PipelineSettings::default();
        settings.scan.retry_on_insufficient = false;
        settings.height_field.min_points = 1_000_000;
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), settings);
        scan.advance_with_budget(&mut ctx, &mut Grade, usize::MAX, 0.0);
        assert_eq!(scan.status(), ScanStatus::Failed);
    }

    #[test]
    fn test_retry_recovers_on_denser_grid() {
        let mut settings = PipelineSettings::default();
        // A flat 2 m square plans at most 200 nodes; demand more than that
        settings.height_field.min_points = 250;
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), settings);
        scan.advance_with_budget(&mut ctx, &mut Level, usize::MAX, 0.0);
        let result = scan.result().unwrap();
        assert!(result.retried);
        assert!(result.height_field.len() >= 250);
    }

    #[test]
    fn test_cancel_while_assessing_counts_hits() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), PipelineSettings::default());
        scan.advance_with_budget(&mut ctx, &mut Grade, 10, 0.0);
        assert_eq!(scan.status(), ScanStatus::Assessing);

        scan.cancel();
        assert_eq!(
            scan.error(),
            Some(&AnalysisError::InsufficientSamples { needed: 20, got: 10 })
        );
    }

    #[test]
    fn test_settings_change_waits_for_next_scan() {
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let mut scan = TerrainScan::start(square(), PipelineSettings::default());
        scan.advance_with_budget(&mut ctx, &mut Grade, 40, 0.0);
        assert_eq!(scan.status(), ScanStatus::Sampling);

        let mut strict = PipelineSettings::default();
        strict.height_field.min_points = 1_000_000;
        strict.scan.retry_on_insufficient = false;
        scan.set_settings(strict.clone());
        assert_eq!(scan.settings().height_field.min_points, 20);
        assert_eq!(scan.next_settings(), &strict);

        scan.advance_with_budget(&mut ctx, &mut Grade, usize::MAX, 0.1);
        assert_eq!(scan.status(), ScanStatus::Done);
        assert!(!scan.result().unwrap().retried);

        scan.restart(square());
        assert_eq!(scan.settings(), &strict);
        scan.advance_with_budget(&mut ctx, &mut Grade, usize::MAX, 0.2);
        assert_eq!(
            scan.error().map(|e| matches!(e, AnalysisError::InsufficientSamples { needed: 1_000_000, .. })),
            Some(true)
        );
    }
}
