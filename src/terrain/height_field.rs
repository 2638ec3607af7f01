//! Height field construction from resolved hits

use std::collections::BTreeMap;

use bevy::math::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::grid::SampleGrid;
use crate::constants::MIN_HEIGHT_FIELD_POINTS;
use crate::error::AnalysisError;
use crate::geometry::{GridIndex, HeightField};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightFieldSettings {
    pub min_points: usize,
}

impl Default for HeightFieldSettings {
    fn default() -> Self {
        Self {
            min_points: MIN_HEIGHT_FIELD_POINTS,
        }
    }
}

/// A hit's claim on a cell: horizontal distance to what it matched, and its height
#[derive(Debug, Clone, Copy)]
struct Claim {
    distance: f32,
    height: f32,
}

fn keep_closer(claims: &mut BTreeMap<GridIndex, Claim>, index: GridIndex, claim: Claim) {
    claims
        .entry(index)
        .and_modify(|held| {
            if claim.distance < held.distance {
                *held = claim;
            }
        })
        .or_insert(claim);
}

#[derive(Debug, Clone, Default)]
pub struct HeightFieldBuilder {
    pub settings: HeightFieldSettings,
}

impl HeightFieldBuilder {
    pub fn new(settings: HeightFieldSettings) -> Self {
        Self { settings }
    }

    /// Match each hit to its nearest request and fill the grid.
    ///
    /// Hits may arrive in any order and any subset. Grid node matches win
    /// their cell outright (closest hit first); focus sample matches only
    /// fill the nearest cell if no node match claimed it.
    pub fn build(&self, grid: &SampleGrid, hits: &[Vec3]) -> Result<HeightField, AnalysisError> {
        let mut field = HeightField::new(grid.origin, grid.step);
        let mut node_claims = BTreeMap::new();
        let mut focus_claims = BTreeMap::new();

        if !grid.samples.is_empty() {
            for hit in hits {
                let xz = Vec2::new(hit.x, hit.z);
                let Some((sample, distance)) = grid
                    .samples
                    .iter()
                    .map(|s| (s, s.position.distance(xz)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                else {
                    continue;
                };

                match sample.index {
                    Some(index) => keep_closer(
                        &mut node_claims,
                        index,
                        Claim {
                            distance,
                            height: hit.y,
                        },
                    ),
                    None => {
                        let index = field.nearest_index(xz.x, xz.y);
                        let distance = field.world_xz(index).distance(xz);
                        keep_closer(
                            &mut focus_claims,
                            index,
                            Claim {
                                distance,
                                height: hit.y,
                            },
                        );
                    }
                }
            }
        }

        for (index, claim) in &node_claims {
            field.insert(*index, claim.height);
        }
        for (index, claim) in focus_claims {
            if !field.contains(index) {
                field.insert(index, claim.height);
            }
        }

        if field.len() < self.settings.min_points {
            return Err(AnalysisError::InsufficientSamples {
                needed: self.settings.min_points,
                got: field.len(),
            });
        }
        Ok(field)
    }
}
