//! Persistent analysis settings
//!
//! Every tunable of the engine in one JSON file. Missing sections or fields
//! fall back to their defaults, so a file only needs the values it changes.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::{LocalSlopeSettings, PipelineSettings, PoiSettings, PuttSettings, ScanSettings};
use crate::constants::GAZE_PREDICTION_WEIGHT;
use crate::quality::QualitySettings;
use crate::raycast::{CacheSettings, ContextSettings, GazeSettings};
use crate::terrain::{ComplexitySettings, ContourSettings, GridSettings, HeightFieldSettings};

/// Path to the settings file
pub const SETTINGS_FILE: &str = "config/analysis_settings.json";

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub cache: CacheSettings,
    pub gaze: GazeSettings,
    pub quality: QualitySettings,
    /// How far gaze casts lean toward the predicted direction (0 disables)
    pub prediction_weight: f32,
    pub complexity: ComplexitySettings,
    pub grid: GridSettings,
    pub height_field: HeightFieldSettings,
    pub contour: ContourSettings,
    pub scan: ScanSettings,
    pub poi: PoiSettings,
    pub local_slope: LocalSlopeSettings,
    pub putt: PuttSettings,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            gaze: GazeSettings::default(),
            quality: QualitySettings::default(),
            prediction_weight: GAZE_PREDICTION_WEIGHT,
            complexity: ComplexitySettings::default(),
            grid: GridSettings::default(),
            height_field: HeightFieldSettings::default(),
            contour: ContourSettings::default(),
            scan: ScanSettings::default(),
            poi: PoiSettings::default(),
            local_slope: LocalSlopeSettings::default(),
            putt: PuttSettings::default(),
        }
    }
}

impl AnalysisSettings {
    /// Load from the default location, or defaults if missing or broken
    pub fn load() -> Self {
        Self::load_from(SETTINGS_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No {} found, using default analysis settings", path.display());
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(settings) => {
                info!("Loaded analysis settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn try_load_from(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(SETTINGS_FILE)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, json)?;
        info!("Saved analysis settings to {}", path.display());
        Ok(())
    }

    /// Parameters for the long-lived raycast context
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            cache: self.cache,
            gaze: self.gaze,
            quality: self.quality,
            prediction_weight: self.prediction_weight,
        }
    }

    /// Parameters for one terrain scan
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            complexity: self.complexity.clone(),
            grid: self.grid,
            height_field: self.height_field,
            contour: self.contour,
            scan: self.scan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("greenslope_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = temp_path("round_trip.json");
        let mut settings = AnalysisSettings::default();
        settings.grid.max_cells = 5000;
        settings.putt.stations = 20;
        settings.save_to(&path).unwrap();

        assert_eq!(AnalysisSettings::try_load_from(&path).unwrap(), settings);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial.json");
        fs::write(&path, r#"{ "cache": { "capacity": 12 }, "prediction_weight": 0.0 }"#).unwrap();

        let settings = AnalysisSettings::load_from(&path);
        assert_eq!(settings.cache.capacity, 12);
        assert_eq!(settings.cache.valid_distance, CacheSettings::default().valid_distance);
        assert_eq!(settings.prediction_weight, 0.0);
        assert_eq!(settings.grid, GridSettings::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_broken_or_missing_file_gives_defaults() {
        let path = temp_path("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(AnalysisSettings::try_load_from(&path).is_err());
        assert_eq!(AnalysisSettings::load_from(&path), AnalysisSettings::default());
        let _ = fs::remove_file(&path);

        assert_eq!(
            AnalysisSettings::load_from(temp_path("missing.json")),
            AnalysisSettings::default()
        );
    }

    #[test]
    fn test_derived_settings() {
        let mut settings = AnalysisSettings::default();
        settings.prediction_weight = 0.7;
        settings.scan.rays_per_tick = 8;
        assert_eq!(settings.context_settings().prediction_weight, 0.7);
        assert_eq!(settings.pipeline_settings().scan.rays_per_tick, 8);
    }
}
