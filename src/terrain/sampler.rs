//! Elevation resolution for requested sample points
//!
//! Requests are walked in serpentine rows so consecutive downcasts stay
//! close together. Hits come back without any promise of order; the height
//! field builder matches them back to their requests.

use bevy::math::{Vec2, Vec3};

use crate::raycast::{CacheSettings, CachePolicy, RayCaster, RaycastContext, TrackableKinds};

/// Grid rays may share cached results only when neighbouring nodes are
/// further apart than the cache's positional tolerance.
pub fn grid_cache_policy(step: f32, cache: &CacheSettings) -> CachePolicy {
    if step > cache.valid_distance {
        CachePolicy::Use
    } else {
        CachePolicy::Bypass
    }
}

/// Reorder points into boustrophedon rows of height `row_step` along z:
/// even rows run +x, odd rows run -x.
pub fn serpentine_order(points: &[Vec2], row_step: f32) -> Vec<Vec2> {
    let Some(min_z) = points.iter().map(|p| p.y).reduce(f32::min) else {
        return Vec::new();
    };
    let row_step = if row_step > 0.0 { row_step } else { 1.0 };
    let row_of = |p: &Vec2| ((p.y - min_z) / row_step).round() as i64;

    let mut ordered = points.to_vec();
    ordered.sort_by(|a, b| {
        let (ra, rb) = (row_of(a), row_of(b));
        ra.cmp(&rb).then_with(|| {
            if ra % 2 == 0 {
                a.x.total_cmp(&b.x)
            } else {
                b.x.total_cmp(&a.x)
            }
        })
    });
    ordered
}

/// Resumable downcast queue. Each call to [`HeightSampler::resolve_some`]
/// spends at most its budget of requests.
#[derive(Debug, Clone)]
pub struct HeightSampler {
    queue: Vec<Vec2>,
    cursor: usize,
    hits: Vec<Vec3>,
    base_y: f32,
    offsets: Vec<f32>,
    policy: CachePolicy,
    wanted: TrackableKinds,
}

impl HeightSampler {
    pub fn new(points: &[Vec2], row_step: f32, base_y: f32, offsets: &[f32], policy: CachePolicy) -> Self {
        Self {
            queue: serpentine_order(points, row_step),
            cursor: 0,
            hits: Vec::with_capacity(points.len()),
            base_y,
            offsets: offsets.to_vec(),
            policy,
            wanted: TrackableKinds::ALL,
        }
    }

    pub fn with_kinds(mut self, wanted: TrackableKinds) -> Self {
        self.wanted = wanted;
        self
    }

    /// Resolve up to `budget` requests. Returns how many were attempted.
    pub fn resolve_some(
        &mut self,
        ctx: &mut RaycastContext,
        caster: &mut dyn RayCaster,
        budget: usize,
        now: f64,
    ) -> usize {
        let end = self.cursor.saturating_add(budget).min(self.queue.len());
        for k in self.cursor..end {
            let p = self.queue[k];
            if let Some(hit) = ctx.downcast(
                caster,
                p.x,
                p.y,
                self.base_y,
                &self.offsets,
                self.wanted,
                self.policy,
                now,
            ) {
                self.hits.push(hit);
            }
        }
        let attempted = end - self.cursor;
        self.cursor = end;
        attempted
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn requested(&self) -> usize {
        self.queue.len()
    }

    pub fn hits(&self) -> &[Vec3] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<Vec3> {
        self.hits
    }
}

/// Resolve every point in one go.
#[allow(clippy::too_many_arguments)]
pub fn resolve_heights(
    ctx: &mut RaycastContext,
    caster: &mut dyn RayCaster,
    points: &[Vec2],
    row_step: f32,
    offsets: &[f32],
    base_y: f32,
    policy: CachePolicy,
    now: f64,
) -> Vec<Vec3> {
    let mut sampler = HeightSampler::new(points, row_step, base_y, offsets, policy);
    sampler.resolve_some(ctx, caster, points.len(), now);
    sampler.into_hits()
}
