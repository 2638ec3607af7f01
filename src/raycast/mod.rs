//! Ray casting against the real world
//!
//! The platform supplies the actual hit test through [`RayCaster`]. Everything
//! in the engine casts through a [`RaycastContext`], which adds caching, gaze
//! prediction and quality-driven trackable filtering on top.

pub mod cache;
pub mod context;
pub mod gaze;

pub use cache::*;
pub use context::*;
pub use gaze::*;

use std::ops::{BitOr, BitOrAssign};

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

/// Bitmask of trackable categories a hit can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TrackableKinds(pub u32);

impl TrackableKinds {
    pub const NONE: Self = Self(0);
    /// Reconstructed planar surface
    pub const PLANES: Self = Self(1);
    /// Sparse feature point
    pub const FEATURE_POINTS: Self = Self(1 << 1);
    /// Dense depth sample
    pub const DEPTH: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    /// True when every bit of `other` is also set here
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TrackableKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TrackableKinds {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A world-space ray. `direction` is kept unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or(Vec3::NEG_Y),
        }
    }

    /// Straight down from `origin`
    pub fn down(origin: Vec3) -> Self {
        Self {
            origin,
            direction: Vec3::NEG_Y,
        }
    }
}

/// Nearest intersection reported by the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub position: Vec3,
    /// Meaningful for planar hits only; +Y otherwise
    pub surface_up: Vec3,
    pub kind: TrackableKinds,
}

impl RayHit {
    pub fn new(position: Vec3, kind: TrackableKinds) -> Self {
        Self {
            position,
            surface_up: Vec3::Y,
            kind,
        }
    }
}

/// Platform hit test. `None` means no intersection and is routine.
pub trait RayCaster {
    fn cast(&mut self, ray: &Ray, wanted: TrackableKinds) -> Option<RayHit>;
}

impl<C: RayCaster + ?Sized> RayCaster for Box<C> {
    fn cast(&mut self, ray: &Ray, wanted: TrackableKinds) -> Option<RayHit> {
        (**self).cast(ray, wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trackable_mask_ops() {
        let both = TrackableKinds::PLANES | TrackableKinds::DEPTH;
        assert!(both.contains(TrackableKinds::PLANES));
        assert!(!both.contains(TrackableKinds::FEATURE_POINTS));
        assert!(TrackableKinds::ALL.contains(both));
        assert_eq!(both.without(TrackableKinds::DEPTH), TrackableKinds::PLANES);
        assert!(TrackableKinds::NONE.is_empty());
    }

    #[test]
    fn test_ray_direction_normalized() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, -4.0, 0.0));
        assert_eq!(ray.direction, Vec3::NEG_Y);
        let degenerate = Ray::new(Vec3::ZERO, Vec3::ZERO);
        assert_eq!(degenerate.direction, Vec3::NEG_Y);
    }
}
