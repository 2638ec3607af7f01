//! Scenario files and synthetic surfaces
//!
//! A scenario is a TOML file naming a boundary, an analytic surface to cast
//! against and what a pass over it should report. The surfaces implement
//! [`RayCaster`], so the CLI and tests run the real pipeline without a
//! tracking platform.

use bevy::math::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::analysis::AnalysisResult;
use crate::error::AnalysisError;
use crate::geometry::Polygon;
use crate::raycast::{Ray, RayCaster, RayHit, TrackableKinds};

/// Longest distance a non-vertical ray is marched before giving up
const MARCH_RANGE: f32 = 20.0;
const MARCH_STEP: f32 = 0.01;

/// Complete scenario definition from a TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub boundary: Boundary,
    pub surface: Surface,
    pub noise: Option<Noise>,
    #[serde(default)]
    pub expect: ScenarioExpectations,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "shape")]
pub enum Boundary {
    #[serde(rename = "square")]
    Square {
        center: [f32; 3],
        side: f32,
    },
    #[serde(rename = "polygon")]
    Polygon { vertices: Vec<[f32; 3]> },
}

/// Analytic ground height y = f(x, z)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Surface {
    /// Grades are in percent
    #[serde(rename = "plane")]
    Plane {
        #[serde(default)]
        base: f32,
        #[serde(default)]
        grade_x: f32,
        #[serde(default)]
        grade_z: f32,
    },
    /// Falls away linearly from `peak` at `center`
    #[serde(rename = "cone")]
    Cone {
        center: [f32; 2],
        peak: f32,
        slope_percent: f32,
    },
    /// y = curvature · (dx² − dz²)
    #[serde(rename = "saddle")]
    Saddle { center: [f32; 2], curvature: f32 },
    /// Tier break along x = `at`
    #[serde(rename = "step")]
    Step { at: f32, low: f32, high: f32 },
}

impl Surface {
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        match *self {
            Surface::Plane { base, grade_x, grade_z } => base + 0.01 * (grade_x * x + grade_z * z),
            Surface::Cone {
                center,
                peak,
                slope_percent,
            } => {
                let r = Vec2::new(x, z).distance(Vec2::from(center));
                peak - 0.01 * slope_percent * r
            }
            Surface::Saddle { center, curvature } => {
                let dx = x - center[0];
                let dz = z - center[1];
                curvature * (dx * dx - dz * dz)
            }
            Surface::Step { at, low, high } => {
                if x < at {
                    low
                } else {
                    high
                }
            }
        }
    }
}

/// Deterministic height jitter and tracking dropout
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Noise {
    #[serde(default)]
    pub amplitude: f32,
    /// Fraction of downcasts that miss
    #[serde(default)]
    pub dropout: f32,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioExpectations {
    /// Lowercase tier name, e.g. "flat"
    pub tier: Option<String>,
    pub min_mean_slope: Option<f32>,
    pub max_mean_slope: Option<f32>,
    pub min_height_cells: Option<usize>,
    pub min_elevation_levels: Option<usize>,
}

impl Scenario {
    pub fn polygon(&self) -> Result<Polygon, AnalysisError> {
        match &self.boundary {
            Boundary::Square { center, side } => Polygon::square(Vec3::from(*center), *side),
            Boundary::Polygon { vertices } => {
                Polygon::new(vertices.iter().copied().map(Vec3::from).collect())
            }
        }
    }

    pub fn caster(&self) -> SyntheticSurface {
        SyntheticSurface::new(self.surface, self.noise)
    }

    /// Compare a pass against the expectations, returning one line per miss
    pub fn check(&self, result: &AnalysisResult) -> Vec<String> {
        let expect = &self.expect;
        let mut failures = Vec::new();

        if let Some(tier) = &expect.tier
            && *tier != result.profile.tier.to_string()
        {
            failures.push(format!("tier: expected {}, got {}", tier, result.profile.tier));
        }
        let mean = result.slope_summary.mean_percent;
        if let Some(min) = expect.min_mean_slope
            && mean < min
        {
            failures.push(format!("mean slope {:.3}% below {:.3}%", mean, min));
        }
        if let Some(max) = expect.max_mean_slope
            && mean > max
        {
            failures.push(format!("mean slope {:.3}% above {:.3}%", mean, max));
        }
        if let Some(min) = expect.min_height_cells
            && result.height_field.len() < min
        {
            failures.push(format!(
                "height cells: expected at least {}, got {}",
                min,
                result.height_field.len()
            ));
        }
        if let Some(min) = expect.min_elevation_levels
            && result.elevation_contours.len() < min
        {
            failures.push(format!(
                "elevation levels: expected at least {}, got {}",
                min,
                result.elevation_contours.len()
            ));
        }
        failures
    }
}

/// Parse a scenario file from path
pub fn parse_scenario_file(path: &Path) -> Result<Scenario, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

/// Ray caster over an analytic surface. Every hit is reported as a plane.
#[derive(Debug, Clone)]
pub struct SyntheticSurface {
    pub surface: Surface,
    pub noise: Option<Noise>,
}

impl SyntheticSurface {
    pub fn new(surface: Surface, noise: Option<Noise>) -> Self {
        Self { surface, noise }
    }

    /// Measured height at (x, z), or None when tracking drops the point.
    /// The same point always measures the same.
    pub fn measure(&self, x: f32, z: f32) -> Option<f32> {
        let height = self.surface.height_at(x, z);
        let Some(noise) = self.noise else {
            return Some(height);
        };

        let key = ((x.to_bits() as u64) << 32) | z.to_bits() as u64;
        let mut rng = StdRng::seed_from_u64(noise.seed ^ key.rotate_left(17));
        if noise.dropout > 0.0 && rng.gen_bool(noise.dropout.clamp(0.0, 1.0) as f64) {
            return None;
        }
        if noise.amplitude > 0.0 {
            return Some(height + rng.gen_range(-noise.amplitude..=noise.amplitude));
        }
        Some(height)
    }

    fn march(&self, ray: &Ray) -> Option<Vec3> {
        let above = |t: f32| {
            let p = ray.origin + ray.direction * t;
            p.y - self.surface.height_at(p.x, p.z)
        };
        if above(0.0) < 0.0 {
            return None;
        }
        let mut t0 = 0.0;
        while t0 < MARCH_RANGE {
            let t1 = t0 + MARCH_STEP;
            if above(t1) <= 0.0 {
                let (mut lo, mut hi) = (t0, t1);
                for _ in 0..20 {
                    let mid = 0.5 * (lo + hi);
                    if above(mid) > 0.0 {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                return Some(ray.origin + ray.direction * hi);
            }
            t0 = t1;
        }
        None
    }
}

impl RayCaster for SyntheticSurface {
    fn cast(&mut self, ray: &Ray, wanted: TrackableKinds) -> Option<RayHit> {
        if !wanted.intersects(TrackableKinds::PLANES) {
            return None;
        }
        let position = if ray.direction == Vec3::NEG_Y {
            let (x, z) = (ray.origin.x, ray.origin.z);
            let y = self.measure(x, z)?;
            if y > ray.origin.y {
                return None;
            }
            Vec3::new(x, y, z)
        } else {
            let hit = self.march(ray)?;
            let y = self.measure(hit.x, hit.z)?;
            Vec3::new(hit.x, y, hit.z)
        };
        Some(RayHit::new(position, TrackableKinds::PLANES))
    }
}

/// Wraps a caster and keeps every result it produced, in order
#[derive(Debug)]
pub struct RecordingCaster<C> {
    pub inner: C,
    pub hits: Vec<Option<RayHit>>,
}

impl<C: RayCaster> RecordingCaster<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            hits: Vec::new(),
        }
    }

    pub fn into_replay(self) -> ReplayCaster {
        ReplayCaster::new(self.hits)
    }
}

impl<C: RayCaster> RayCaster for RecordingCaster<C> {
    fn cast(&mut self, ray: &Ray, wanted: TrackableKinds) -> Option<RayHit> {
        let hit = self.inner.cast(ray, wanted);
        self.hits.push(hit);
        hit
    }
}

/// Plays back recorded results regardless of the rays asked; misses once
/// the recording runs out
#[derive(Debug, Default)]
pub struct ReplayCaster {
    hits: VecDeque<Option<RayHit>>,
}

impl ReplayCaster {
    pub fn new(hits: Vec<Option<RayHit>>) -> Self {
        Self { hits: hits.into() }
    }

    pub fn remaining(&self) -> usize {
        self.hits.len()
    }
}

impl RayCaster for ReplayCaster {
    fn cast(&mut self, _ray: &Ray, _wanted: TrackableKinds) -> Option<RayHit> {
        self.hits.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{PipelineSettings, run_analysis};
    use crate::raycast::{ContextSettings, RaycastContext};

    const TILTED: &str = r#"
name = "tilted"
[boundary]
shape = "square"
center = [0.0, 0.0, 0.0]
side = 2.0

[surface]
type = "plane"
grade_x = 2.0

[expect]
min_mean_slope = 1.9
max_mean_slope = 2.1
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = toml::from_str(TILTED).unwrap();
        assert_eq!(scenario.name, "tilted");
        assert!(scenario.noise.is_none());
        assert_eq!(
            scenario.surface,
            Surface::Plane {
                base: 0.0,
                grade_x: 2.0,
                grade_z: 0.0
            }
        );
        assert!(scenario.expect.tier.is_none());
        assert_eq!(scenario.expect.min_mean_slope, Some(1.9));
        assert!((scenario.polygon().unwrap().area() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_polygon_boundary_with_noise() {
        let toml = r#"
name = "knoll"
[boundary]
shape = "polygon"
vertices = [[-1.0, 0.1, -1.0], [1.0, 0.1, -1.0], [0.0, 0.1, 1.0]]

[surface]
type = "cone"
center = [0.0, 0.0]
peak = 0.1
slope_percent = 5.0

[noise]
amplitude = 0.002
seed = 7
"#;
        let scenario: Scenario = toml::from_str(toml).unwrap();
        assert_eq!(scenario.polygon().unwrap().vertices().len(), 3);
        let noise = scenario.noise.unwrap();
        assert_eq!(noise.seed, 7);
        assert_eq!(noise.dropout, 0.0);
    }

    #[test]
    fn test_bundled_scenarios_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let mut count = 0;
        for entry in fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml") {
                let scenario = parse_scenario_file(&path).unwrap();
                assert!(scenario.polygon().is_ok(), "{}", scenario.name);
                count += 1;
            }
        }
        assert!(count >= 5);
    }

    #[test]
    fn test_surface_heights() {
        let cone = Surface::Cone {
            center: [1.0, 0.0],
            peak: 0.5,
            slope_percent: 10.0,
        };
        assert!((cone.height_at(1.0, 0.0) - 0.5).abs() < 1e-6);
        assert!((cone.height_at(1.0, 2.0) - 0.3).abs() < 1e-6);

        let saddle = Surface::Saddle {
            center: [0.0, 0.0],
            curvature: 0.1,
        };
        assert!(saddle.height_at(1.0, 0.0) > 0.0);
        assert!(saddle.height_at(0.0, 1.0) < 0.0);

        let step = Surface::Step {
            at: 0.0,
            low: 0.0,
            high: 0.2,
        };
        assert_eq!(step.height_at(-0.1, 3.0), 0.0);
        assert_eq!(step.height_at(0.1, 3.0), 0.2);
    }

    #[test]
    fn test_noise_is_repeatable() {
        let noise = Noise {
            amplitude: 0.01,
            dropout: 0.3,
            seed: 42,
        };
        let surface = SyntheticSurface::new(Surface::Step { at: 0.0, low: 0.0, high: 0.0 }, Some(noise));
        let mut dropped = 0;
        for i in 0..200 {
            let x = i as f32 * 0.013;
            let first = surface.measure(x, -x);
            assert_eq!(first, surface.measure(x, -x));
            match first {
                Some(y) => assert!(y.abs() <= 0.01),
                None => dropped += 1,
            }
        }
        assert!(dropped > 20 && dropped < 120, "dropped {}", dropped);
    }

    #[test]
    fn test_downcast_and_slanted_rays() {
        let mut surface = SyntheticSurface::new(
            Surface::Plane {
                base: 0.0,
                grade_x: 0.0,
                grade_z: 0.0,
            },
            None,
        );
        let down = surface
            .cast(&Ray::down(Vec3::new(0.3, 1.0, -0.2)), TrackableKinds::ALL)
            .unwrap();
        assert_eq!(down.position, Vec3::new(0.3, 0.0, -0.2));

        let slanted = surface
            .cast(
                &Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, -1.0, 0.0)),
                TrackableKinds::ALL,
            )
            .unwrap();
        assert!((slanted.position.x - 1.0).abs() < 1e-3);
        assert!(slanted.position.y.abs() < 1e-3);

        assert!(surface.cast(&Ray::new(Vec3::Y, Vec3::Y), TrackableKinds::ALL).is_none());
        assert!(
            surface
                .cast(&Ray::down(Vec3::new(0.0, 1.0, 0.0)), TrackableKinds::DEPTH)
                .is_none()
        );
    }

    #[test]
    fn test_replay_runs_out() {
        let mut recorder = RecordingCaster::new(SyntheticSurface::new(
            Surface::Plane {
                base: 0.0,
                grade_x: 1.0,
                grade_z: 0.0,
            },
            None,
        ));
        recorder.cast(&Ray::down(Vec3::Y), TrackableKinds::PLANES);
        let mut replay = recorder.into_replay();
        assert_eq!(replay.remaining(), 1);
        assert!(replay.cast(&Ray::down(Vec3::Y), TrackableKinds::PLANES).is_some());
        assert!(replay.cast(&Ray::down(Vec3::Y), TrackableKinds::PLANES).is_none());
    }

    #[test]
    fn test_scenario_expectations_checked() {
        let scenario: Scenario = toml::from_str(TILTED).unwrap();
        let mut ctx = RaycastContext::new(ContextSettings::default());
        let result = run_analysis(
            &mut ctx,
            &mut scenario.caster(),
            &scenario.polygon().unwrap(),
            &PipelineSettings::default(),
            0.0,
        )
        .unwrap();
        let failures = scenario.check(&result);
        assert!(failures.is_empty(), "{:?}", failures);

        let mut strict = scenario.clone();
        strict.expect.tier = Some("complex".to_string());
        strict.expect.min_height_cells = Some(1_000_000);
        assert_eq!(strict.check(&result).len(), 2);
    }
}
