//! Bounded randomized search for a valid placement point
//!
//! The search is a small state machine: the desired position is tried first,
//! then up to `max_iterations` jittered positions on growing rings around it.
//! Every candidate goes through the same evaluation: bounds, slope, collision
//! with already placed objects, then the adaptive rules for the object type.

use std::f32::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::config::PlacementConfig;
use super::request::{ObjectBounds, PlacementRequest};
use super::rules::{EffectiveConstraints, RuleSet, WaterProximity};
use super::spatial::SpatialIndex;
use crate::core::Error;
use crate::core::types::{Quat, Result, Vec2, Vec3};
use crate::terrain::TerrainQuery;

/// Ring directions sampled by the water predicate
const WATER_DIRECTIONS: u32 = 8;
/// Rings sampled between the candidate and the proximity distance
const WATER_RINGS: u32 = 3;

/// Per-request RNG derived from the batch seed and the request's queue index
pub fn request_rng(seed: u64, index: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Search progress
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SearchState {
    Initial,
    TryDirect,
    /// 1-based jittered attempt
    TryJittered { attempt: u32 },
    Success(Candidate),
    Exhausted,
}

/// Why a candidate position was rejected
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    OutOfBounds,
    TooSteep { slope: f32, max: f32 },
    Collision { with: u64 },
    SlopeWindow { slope: f32 },
    HeightWindow { relative: f32 },
    Water(WaterProximity),
    SameTypeSpacing { with: u64 },
}

impl Rejection {
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::OutOfBounds => "out_of_bounds",
            Rejection::TooSteep { .. } => "too_steep",
            Rejection::Collision { .. } => "collision",
            Rejection::SlopeWindow { .. } => "slope_window",
            Rejection::HeightWindow { .. } => "height_window",
            Rejection::Water(_) => "water",
            Rejection::SameTypeSpacing { .. } => "same_type_spacing",
        }
    }
}

/// Accepted ground point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub xz: Vec2,
    pub height: f32,
    pub normal: Vec3,
    pub slope: f32,
}

/// Final world transform of an accepted candidate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub normal: Vec3,
}

impl PlacedTransform {
    pub fn xz(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }
}

/// Result of one search, with the number of positions evaluated
#[derive(Debug)]
pub struct SearchOutcome {
    pub result: Result<PlacedTransform>,
    pub attempts: u32,
    pub last_rejection: Option<Rejection>,
}

impl SearchOutcome {
    pub fn failed(error: Error) -> Self {
        Self { result: Err(error), attempts: 0, last_rejection: None }
    }
}

/// What is being placed: request plus the size it will have
#[derive(Clone, Debug)]
pub struct SearchTarget<'r> {
    pub request: &'r PlacementRequest,
    pub bounds: ObjectBounds,
    pub scale: f32,
    pub constraints: Option<EffectiveConstraints>,
}

impl SearchTarget<'_> {
    pub fn radius(&self) -> f32 {
        self.bounds.footprint_radius() * self.scale
    }
}

/// Evaluates candidate positions against a terrain and an index snapshot
#[derive(Clone, Copy)]
pub struct PlacementSearch<'a> {
    terrain: &'a dyn TerrainQuery,
    index: &'a SpatialIndex,
    rules: &'a RuleSet,
    config: &'a PlacementConfig,
}

impl<'a> PlacementSearch<'a> {
    pub fn new(
        terrain: &'a dyn TerrainQuery,
        index: &'a SpatialIndex,
        rules: &'a RuleSet,
        config: &'a PlacementConfig,
    ) -> Self {
        Self { terrain, index, rules, config }
    }

    /// Resolve rules and draw the final scale for `request`
    pub fn target<'r>(&self, request: &'r PlacementRequest, bounds: ObjectBounds, rng: &mut ChaCha8Rng) -> SearchTarget<'r> {
        let jitter = self.config.scale_jitter.clamp(0.0, 0.99);
        let scale = request.desired_scale * (1.0 + (rng.random::<f32>() * 2.0 - 1.0) * jitter);
        SearchTarget {
            request,
            bounds,
            scale,
            constraints: self.rules.constraints_for(&request.object_type),
        }
    }

    /// Run the state machine for one request
    pub fn search(&self, request: &PlacementRequest, bounds: ObjectBounds, rng: &mut ChaCha8Rng) -> SearchOutcome {
        let target = self.target(request, bounds, rng);
        let max_iterations = self.config.max_iterations;
        let mut attempts = 0u32;
        let mut last_rejection = None;
        let mut state = SearchState::Initial;

        loop {
            state = match state {
                SearchState::Initial => SearchState::TryDirect,
                SearchState::TryDirect => {
                    attempts += 1;
                    match self.evaluate(&target, request.desired_position) {
                        Ok(candidate) => SearchState::Success(candidate),
                        Err(rejection) => {
                            last_rejection = Some(rejection);
                            if max_iterations == 0 {
                                SearchState::Exhausted
                            } else {
                                SearchState::TryJittered { attempt: 1 }
                            }
                        }
                    }
                }
                SearchState::TryJittered { attempt } => {
                    attempts += 1;
                    let xz = request.desired_position + self.jitter_offset(attempt, rng);
                    match self.evaluate(&target, xz) {
                        Ok(candidate) => SearchState::Success(candidate),
                        Err(rejection) => {
                            last_rejection = Some(rejection);
                            if attempt >= max_iterations {
                                SearchState::Exhausted
                            } else {
                                SearchState::TryJittered { attempt: attempt + 1 }
                            }
                        }
                    }
                }
                SearchState::Success(candidate) => {
                    return SearchOutcome {
                        result: Ok(self.finalize(&target, &candidate, rng)),
                        attempts,
                        last_rejection,
                    };
                }
                SearchState::Exhausted => {
                    return SearchOutcome {
                        result: Err(Error::NoSuitablePosition {
                            object_type: request.object_type.clone(),
                            attempts,
                        }),
                        attempts,
                        last_rejection,
                    };
                }
            };
        }
    }

    /// Polar offset for jittered attempt `attempt`, uniform over its disc
    fn jitter_offset(&self, attempt: u32, rng: &mut ChaCha8Rng) -> Vec2 {
        let radius = self.config.jitter_radius.max(0.0) * (1.0 + 0.5 * attempt as f32);
        let angle = rng.random::<f32>() * TAU;
        let distance = radius * rng.random::<f32>().sqrt();
        Vec2::from_angle(angle) * distance
    }

    /// Check one position against bounds, slope, collision and rules
    pub fn evaluate(&self, target: &SearchTarget<'_>, xz: Vec2) -> std::result::Result<Candidate, Rejection> {
        if !xz.is_finite() || !self.terrain.is_within_bounds(xz) {
            return Err(Rejection::OutOfBounds);
        }

        let normal = self.terrain.normal_at(xz);
        let slope = normal.y.clamp(-1.0, 1.0).acos().to_degrees();
        let max_slope = target
            .constraints
            .as_ref()
            .and_then(|c| c.max_slope)
            .unwrap_or(self.config.max_slope_degrees);
        if slope > max_slope {
            return Err(Rejection::TooSteep { slope, max: max_slope });
        }

        let spacing = self.config.spacing_factor.max(0.0);
        let radius = target.radius();
        let reach = (radius + self.index.max_radius()) * spacing;
        for other in self.index.query(xz, reach) {
            if other.position_xz().distance(xz) < (radius + other.radius) * spacing {
                return Err(Rejection::Collision { with: other.id });
            }
        }

        let height = self.terrain.height_at(xz);
        if let Some(c) = &target.constraints {
            if slope < c.min_slope {
                return Err(Rejection::SlopeWindow { slope });
            }
            if let Some(relative) = self.terrain.relative_height(height) {
                if relative < c.min_relative_height || relative > c.max_relative_height {
                    return Err(Rejection::HeightWindow { relative });
                }
            }
            for water in &c.water {
                let near = self.near_water(xz, water.distance);
                let ok = match water.proximity {
                    WaterProximity::Ignore => true,
                    WaterProximity::MustBeNear => near,
                    WaterProximity::MustNotBeNear => !near,
                };
                if !ok {
                    return Err(Rejection::Water(water.proximity));
                }
            }
            if c.min_spacing_same_type > 0.0 {
                let same = self
                    .index
                    .query_within(xz, c.min_spacing_same_type)
                    .into_iter()
                    .find(|e| e.object_type == target.request.object_type && e.position_xz().distance(xz) < c.min_spacing_same_type);
                if let Some(other) = same {
                    return Err(Rejection::SameTypeSpacing { with: other.id });
                }
            }
        }

        Ok(Candidate { xz, height, normal, slope })
    }

    /// Whether any ring sample within `distance` lies below the water level
    pub fn near_water(&self, xz: Vec2, distance: f32) -> bool {
        let Some(level) = self.terrain.water_level() else {
            return false;
        };
        if self.terrain.height_at(xz) < level {
            return true;
        }
        if distance <= 0.0 {
            return false;
        }
        for ring in 1..=WATER_RINGS {
            let r = distance * ring as f32 / WATER_RINGS as f32;
            for k in 0..WATER_DIRECTIONS {
                let p = xz + Vec2::from_angle(TAU * k as f32 / WATER_DIRECTIONS as f32) * r;
                if self.terrain.is_within_bounds(p) && self.terrain.height_at(p) < level {
                    return true;
                }
            }
        }
        false
    }

    /// World transform for an accepted candidate
    pub fn finalize(&self, target: &SearchTarget<'_>, candidate: &Candidate, rng: &mut ChaCha8Rng) -> PlacedTransform {
        let yaw = Quat::from_rotation_y(target.request.desired_rotation_y.to_radians());
        let align = Quat::from_rotation_arc(Vec3::Y, candidate.normal);
        let strength = self.config.surface_alignment_strength.clamp(0.0, 1.0);
        let tilted = yaw.slerp(align * yaw, strength);

        let jitter = (rng.random::<f32>() * 2.0 - 1.0) * self.config.rotation_jitter_degrees;
        let rotation = (tilted * Quat::from_rotation_y(jitter.to_radians())).normalize();

        let sink = target
            .constraints
            .as_ref()
            .and_then(|c| c.ground_sink_fraction)
            .unwrap_or(self.config.ground_sink_fraction);
        let object_height = target.bounds.height() * target.scale;

        PlacedTransform {
            position: Vec3::new(candidate.xz.x, candidate.height - sink * object_height, candidate.xz.y),
            rotation,
            scale: target.scale,
            normal: candidate.normal,
        }
    }

    /// Whether an earlier result still holds against this (newer) index
    pub fn still_valid(&self, request: &PlacementRequest, bounds: ObjectBounds, transform: &PlacedTransform) -> bool {
        let target = SearchTarget {
            request,
            bounds,
            scale: transform.scale,
            constraints: self.rules.constraints_for(&request.object_type),
        };
        self.evaluate(&target, transform.xz()).is_ok()
    }
}
