//! Bevy integration
//!
//! [`GreenAnalysisPlugin`] owns the raycast context, the running scan and
//! the last published result as resources. Systems run in a fixed order each
//! frame: frame timing, cache eviction, one scan tick, settings reload. The
//! scan only ticks once a platform ray caster has been injected as
//! [`ActiveRayCaster`].

use bevy::prelude::*;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

use crate::analysis::{AnalysisResult, ScanStatus, TerrainScan};
use crate::config::{AnalysisSettings, SETTINGS_FILE};
use crate::config_watcher::{ConfigWatcher, check_config_changes};
use crate::error::AnalysisError;
use crate::geometry::Polygon;
use crate::raycast::{RayCaster, RaycastContext};

/// The platform's hit test, injected once it is available
#[derive(Resource)]
pub struct ActiveRayCaster(pub Box<dyn RayCaster + Send + Sync>);

/// The scan in flight plus a boundary waiting to be scanned
#[derive(Resource, Debug, Default)]
pub struct TerrainScanner {
    pub scan: TerrainScan,
    pending: Option<Polygon>,
}

impl TerrainScanner {
    /// Scan `polygon` from the next tick, replacing any scan in flight
    pub fn request(&mut self, polygon: Polygon) {
        self.pending = Some(polygon);
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.scan.cancel();
    }

    pub fn status(&self) -> ScanStatus {
        self.scan.status()
    }
}

/// One published pass
#[derive(Debug, Clone)]
pub struct PublishedPass {
    pub id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// What renderers and UI read from
#[derive(Resource, Debug, Default)]
pub struct PublishedAnalysis {
    pub latest: Option<PublishedPass>,
    pub last_error: Option<AnalysisError>,
    pub passes: u64,
}

pub struct GreenAnalysisPlugin {
    /// Settings file to load and watch; None runs on defaults
    pub settings_path: Option<PathBuf>,
}

impl Default for GreenAnalysisPlugin {
    fn default() -> Self {
        Self {
            settings_path: Some(PathBuf::from(SETTINGS_FILE)),
        }
    }
}

impl GreenAnalysisPlugin {
    pub fn without_settings_file() -> Self {
        Self { settings_path: None }
    }
}

impl Plugin for GreenAnalysisPlugin {
    fn build(&self, app: &mut App) {
        let settings = match &self.settings_path {
            Some(path) => AnalysisSettings::load_from(path),
            None => AnalysisSettings::default(),
        };

        app.insert_resource(RaycastContext::new(settings.context_settings()))
            .insert_resource(TerrainScanner {
                scan: TerrainScan::idle(settings.pipeline_settings()),
                pending: None,
            })
            .insert_resource(settings)
            .init_resource::<PublishedAnalysis>()
            .insert_resource(ConfigWatcher::new(self.settings_path.clone()))
            .add_systems(
                Update,
                (
                    track_frame_time,
                    evict_stale_rays,
                    advance_scan.run_if(resource_exists::<ActiveRayCaster>),
                    check_config_changes,
                )
                    .chain(),
            );
    }
}

pub fn track_frame_time(time: Res<Time>, mut ctx: ResMut<RaycastContext>) {
    let dt = time.delta_secs();
    if dt > 0.0 {
        ctx.record_frame(dt * 1000.0, dt);
    }
}

pub fn evict_stale_rays(time: Res<Time>, mut ctx: ResMut<RaycastContext>) {
    ctx.evict_stale(time.elapsed_secs_f64());
}

/// Start requested scans, tick the running one, publish when it finishes.
pub fn advance_scan(
    time: Res<Time>,
    mut ctx: ResMut<RaycastContext>,
    mut caster: ResMut<ActiveRayCaster>,
    mut scanner: ResMut<TerrainScanner>,
    mut published: ResMut<PublishedAnalysis>,
) {
    if let Some(polygon) = scanner.pending.take() {
        scanner.scan.restart(polygon);
    }
    if scanner.scan.status() == ScanStatus::Idle {
        return;
    }

    let now = time.elapsed_secs_f64();
    scanner.scan.advance(&mut ctx, caster.0.as_mut(), now);

    match scanner.scan.take_outcome() {
        Some(Ok(result)) => {
            let pass = PublishedPass {
                id: Uuid::new_v4(),
                finished_at: Utc::now(),
                result,
            };
            info!(
                "Published terrain pass {} ({} height cells)",
                pass.id,
                pass.result.height_field.len()
            );
            published.latest = Some(pass);
            published.last_error = None;
            published.passes += 1;
        }
        Some(Err(err)) => {
            warn!("Terrain pass failed: {}", err);
            published.last_error = Some(err);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::{Ray, RayHit, TrackableKinds};

    struct Slope;

    impl RayCaster for Slope {
        fn cast(&mut self, ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
            let p = ray.origin;
            Some(RayHit::new(Vec3::new(p.x, 0.01 * p.z, p.z), TrackableKinds::PLANES))
        }
    }

    fn headless_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(GreenAnalysisPlugin::without_settings_file());
        app
    }

    #[test]
    fn test_no_caster_no_scan() {
        let mut app = headless_app();
        let polygon = Polygon::square(Vec3::ZERO, 2.0).unwrap();
        app.world_mut().resource_mut::<TerrainScanner>().request(polygon);
        for _ in 0..5 {
            app.update();
        }
        assert_eq!(app.world().resource::<TerrainScanner>().status(), ScanStatus::Idle);
        assert!(app.world().resource::<PublishedAnalysis>().latest.is_none());
    }

    #[test]
    fn test_ticks_until_published() {
        let mut app = headless_app();
        app.insert_resource(ActiveRayCaster(Box::new(Slope)));
        let polygon = Polygon::square(Vec3::ZERO, 2.0).unwrap();
        app.world_mut().resource_mut::<TerrainScanner>().request(polygon);

        app.update();
        assert_ne!(app.world().resource::<TerrainScanner>().status(), ScanStatus::Idle);

        for _ in 0..2000 {
            if app.world().resource::<PublishedAnalysis>().passes > 0 {
                break;
            }
            app.update();
        }
        let published = app.world().resource::<PublishedAnalysis>();
        assert_eq!(published.passes, 1);
        let pass = published.latest.as_ref().unwrap();
        assert!(pass.result.slope_summary.cells > 0);
        assert!((pass.result.slope_summary.mean_percent - 1.0).abs() < 1e-2);
        assert_eq!(app.world().resource::<TerrainScanner>().status(), ScanStatus::Idle);
    }

    #[test]
    fn test_cancel_publishes_error() {
        let mut app = headless_app();
        app.insert_resource(ActiveRayCaster(Box::new(Slope)));
        let polygon = Polygon::square(Vec3::ZERO, 2.0).unwrap();
        app.world_mut().resource_mut::<TerrainScanner>().request(polygon);
        app.update();
        app.world_mut().resource_mut::<TerrainScanner>().cancel();
        app.update();

        let published = app.world().resource::<PublishedAnalysis>();
        assert!(matches!(
            published.last_error,
            Some(AnalysisError::InsufficientSamples { .. })
        ));
        assert!(published.latest.is_none());
    }

    #[test]
    fn test_reload_mid_scan_keeps_running_settings() {
        let path = std::env::temp_dir().join(format!("greenslope_reload_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let mut app = App::new();
        app.add_plugins(MinimalPlugins).add_plugins(GreenAnalysisPlugin {
            settings_path: Some(path.clone()),
        });
        app.insert_resource(ActiveRayCaster(Box::new(Slope)));
        let polygon = Polygon::square(Vec3::ZERO, 2.0).unwrap();
        app.world_mut().resource_mut::<TerrainScanner>().request(polygon.clone());
        app.update();
        assert_eq!(app.world().resource::<TerrainScanner>().status(), ScanStatus::Sampling);

        std::fs::write(
            &path,
            r#"{ "height_field": { "min_points": 1000000 }, "scan": { "retry_on_insufficient": false } }"#,
        )
        .unwrap();
        {
            let mut watcher = app.world_mut().resource_mut::<ConfigWatcher>();
            watcher.timer = crate::constants::CONFIG_CHECK_INTERVAL;
            watcher.mtime = None;
        }
        app.update();
        assert_eq!(app.world().resource::<AnalysisSettings>().height_field.min_points, 1_000_000);
        let scanner = app.world().resource::<TerrainScanner>();
        assert_eq!(scanner.status(), ScanStatus::Sampling);
        assert_eq!(scanner.scan.settings().height_field.min_points, 20);
        assert_eq!(scanner.scan.next_settings().height_field.min_points, 1_000_000);

        for _ in 0..2000 {
            if app.world().resource::<PublishedAnalysis>().passes > 0 {
                break;
            }
            app.update();
        }
        let published = app.world().resource::<PublishedAnalysis>();
        assert_eq!(published.passes, 1);
        assert!(published.last_error.is_none());
        assert!(!published.latest.as_ref().unwrap().result.retried);

        // The next scan picks the reloaded settings up
        app.world_mut().resource_mut::<TerrainScanner>().request(polygon);
        for _ in 0..2000 {
            if app.world().resource::<PublishedAnalysis>().last_error.is_some() {
                break;
            }
            app.update();
        }
        assert!(matches!(
            app.world().resource::<PublishedAnalysis>().last_error,
            Some(AnalysisError::InsufficientSamples { needed: 1_000_000, .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
