//! Frame-time driven quality scaling
//!
//! Keeps a rolling window of frame durations. When the mean runs over budget
//! the quality scale sinks, when it runs comfortably under it recovers more
//! slowly; in between it holds.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::constants::*;
use crate::raycast::TrackableKinds;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub window: usize,
    pub target_frame_ms: f32,
    pub high_fps: f32,
    pub high_frame_ms: f32,
    pub medium_fps: f32,
    pub medium_frame_ms: f32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            window: FRAME_WINDOW,
            target_frame_ms: TARGET_FRAME_TIME_MS,
            high_fps: HIGH_TIER_FPS,
            high_frame_ms: HIGH_TIER_FRAME_MS,
            medium_fps: MEDIUM_TIER_FPS,
            medium_frame_ms: MEDIUM_TIER_FRAME_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceTier {
    #[default]
    High,
    Medium,
    Low,
}

#[derive(Debug)]
pub struct AdaptiveQualityScaler {
    settings: QualitySettings,
    frames_ms: VecDeque<f32>,
    quality_scale: f32,
}

impl Default for AdaptiveQualityScaler {
    fn default() -> Self {
        Self::new(QualitySettings::default())
    }
}

impl AdaptiveQualityScaler {
    pub fn new(settings: QualitySettings) -> Self {
        Self {
            settings,
            frames_ms: VecDeque::with_capacity(settings.window),
            quality_scale: QUALITY_MAX,
        }
    }

    pub fn set_settings(&mut self, settings: QualitySettings) {
        self.settings = settings;
        while self.frames_ms.len() > self.settings.window.max(1) {
            self.frames_ms.pop_front();
        }
    }

    /// Feed one frame. `frame_ms` joins the window; `dt` (seconds) scales
    /// how far the quality moves this tick.
    pub fn record_frame(&mut self, frame_ms: f32, dt: f32) {
        if !frame_ms.is_finite() || frame_ms < 0.0 {
            return;
        }
        self.frames_ms.push_back(frame_ms);
        while self.frames_ms.len() > self.settings.window.max(1) {
            self.frames_ms.pop_front();
        }

        let mean = self.mean_frame_ms();
        let target = self.settings.target_frame_ms;
        if mean > target * QUALITY_OVER_BUDGET {
            self.quality_scale -= QUALITY_DECREASE_RATE * dt;
        } else if mean < target * QUALITY_UNDER_BUDGET {
            self.quality_scale += QUALITY_INCREASE_RATE * dt;
        }
        self.quality_scale = self.quality_scale.clamp(QUALITY_MIN, QUALITY_MAX);
    }

    pub fn mean_frame_ms(&self) -> f32 {
        if self.frames_ms.is_empty() {
            return 0.0;
        }
        self.frames_ms.iter().sum::<f32>() / self.frames_ms.len() as f32
    }

    pub fn quality_scale(&self) -> f32 {
        self.quality_scale
    }

    pub fn performance_tier(&self) -> PerformanceTier {
        let mean = self.mean_frame_ms();
        if mean <= 0.0 {
            return PerformanceTier::High;
        }
        let fps = 1000.0 / mean;
        let s = &self.settings;
        if fps >= s.high_fps - 0.01 && mean <= s.high_frame_ms {
            PerformanceTier::High
        } else if fps >= s.medium_fps - 0.01 && mean <= s.medium_frame_ms {
            PerformanceTier::Medium
        } else {
            PerformanceTier::Low
        }
    }

    /// Trackable kinds worth asking for at the current tier. Feature-point
    /// hit testing is the expensive one and goes first.
    pub fn effective_kinds(&self, wanted: TrackableKinds) -> TrackableKinds {
        if self.performance_tier() == PerformanceTier::Low {
            let reduced = wanted.without(TrackableKinds::FEATURE_POINTS);
            if !reduced.is_empty() {
                return reduced;
            }
        }
        wanted
    }

    /// Scale a sample budget, never below `floor`
    pub fn scaled_count(&self, count: usize, floor: usize) -> usize {
        ((count as f32 * self.quality_scale).round() as usize).max(floor)
    }
}
