//! Short-horizon gaze direction prediction
//!
//! Extrapolates where the user is about to look so cache lookups and
//! pre-warm casts lean toward it. Never affects correctness, only which ray
//! gets cast.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use bevy::math::Vec3;

use super::Ray;
use crate::constants::{GAZE_HISTORY_SIZE, GAZE_PREDICTION_HORIZON, GAZE_SAMPLE_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeSettings {
    pub history_size: usize,
    pub sample_interval: f64,
    pub horizon: f32,
}

impl Default for GazeSettings {
    fn default() -> Self {
        Self {
            history_size: GAZE_HISTORY_SIZE,
            sample_interval: GAZE_SAMPLE_INTERVAL,
            horizon: GAZE_PREDICTION_HORIZON,
        }
    }
}

#[derive(Debug, Default)]
pub struct GazePredictor {
    settings: GazeSettings,
    history: VecDeque<(Vec3, f64)>,
}

impl GazePredictor {
    pub fn new(settings: GazeSettings) -> Self {
        Self {
            settings,
            history: VecDeque::with_capacity(settings.history_size),
        }
    }

    pub fn set_settings(&mut self, settings: GazeSettings) {
        self.settings = settings;
        while self.history.len() > self.settings.history_size.max(1) {
            self.history.pop_front();
        }
    }

    /// Record a gaze direction; ignored if the last sample is too recent.
    /// Returns whether the sample was kept.
    pub fn record(&mut self, direction: Vec3, now: f64) -> bool {
        let Some(direction) = direction.try_normalize() else {
            return false;
        };
        if let Some(&(_, last)) = self.history.back()
            && now - last < self.settings.sample_interval
        {
            return false;
        }
        self.history.push_back((direction, now));
        while self.history.len() > self.settings.history_size.max(1) {
            self.history.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Linear extrapolation of the last two samples over the horizon.
    pub fn predict_next_direction(&self) -> Option<Vec3> {
        let n = self.history.len();
        let &(last, t1) = self.history.back()?;
        if n < 2 {
            return Some(last);
        }
        let (prev, t0) = self.history[n - 2];
        let dt = (t1 - t0) as f32;
        if dt <= f32::EPSILON {
            return Some(last);
        }
        let velocity = (last - prev) / dt;
        Some((last + velocity * self.settings.horizon).normalize_or(last))
    }

    /// `ray` with its direction rotated toward the prediction by `weight`.
    pub fn blended_ray(&self, ray: &Ray, weight: f32) -> Ray {
        if weight <= 0.0 {
            return *ray;
        }
        match self.predict_next_direction() {
            Some(predicted) => Ray {
                origin: ray.origin,
                direction: slerp(ray.direction, predicted, weight.min(1.0)),
            },
            None => *ray,
        }
    }
}

/// Spherical interpolation between unit vectors. Falls back to `a` when the
/// two are opposite, since no unique great circle exists.
pub fn slerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    let dot = a.dot(b).clamp(-1.0, 1.0);
    if dot > 0.9995 {
        return a.lerp(b, t).normalize_or(a);
    }
    if dot < -0.9995 {
        return a;
    }
    let theta = dot.acos();
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    (a * wa + b * wb).normalize_or(a)
}
