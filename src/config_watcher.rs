//! Settings file auto-reload
//!
//! Polls the analysis settings file every 10 seconds and reloads it when its
//! modification time changes. Cache, gaze and quality parameters go straight
//! into the live context; scan parameters apply from the next scan.

use bevy::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::AnalysisSettings;
use crate::constants::CONFIG_CHECK_INTERVAL;
use crate::plugin::TerrainScanner;
use crate::raycast::RaycastContext;

/// Tracks the settings file's modification time for hot-reload
#[derive(Resource, Debug)]
pub struct ConfigWatcher {
    /// Time since last check
    pub timer: f32,
    /// None disables watching
    pub path: Option<PathBuf>,
    pub mtime: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: Option<PathBuf>) -> Self {
        let mtime = path.as_deref().and_then(get_mtime);
        Self {
            timer: 0.0,
            path,
            mtime,
        }
    }

    /// Advance the timer; on each interval report whether the file changed.
    pub fn poll(&mut self, dt: f32) -> bool {
        self.timer += dt;
        if self.timer < CONFIG_CHECK_INTERVAL {
            return false;
        }
        self.timer = 0.0;

        let Some(path) = &self.path else {
            return false;
        };
        let new_mtime = get_mtime(path);
        if new_mtime != self.mtime {
            self.mtime = new_mtime;
            return true;
        }
        false
    }
}

/// Get file modification time, or None if file doesn't exist
fn get_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

/// Check the settings file and reload it when modified.
pub fn check_config_changes(
    time: Res<Time>,
    mut watcher: ResMut<ConfigWatcher>,
    mut settings: ResMut<AnalysisSettings>,
    mut ctx: ResMut<RaycastContext>,
    mut scanner: ResMut<TerrainScanner>,
) {
    if !watcher.poll(time.delta_secs()) {
        return;
    }
    let Some(path) = watcher.path.clone() else {
        return;
    };

    match AnalysisSettings::try_load_from(&path) {
        Ok(loaded) => {
            ctx.apply_settings(loaded.context_settings());
            scanner.scan.set_settings(loaded.pipeline_settings());
            *settings = loaded;
            info!("Auto-reloaded analysis settings from {}", path.display());
        }
        Err(e) => warn!("{}, keeping current settings", e),
    }
}
