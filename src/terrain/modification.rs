//! Terrain modification descriptions
//!
//! A `TerrainModification` describes one localized edit of the heightmap:
//! where it applies (bounds or spline), what height it pulls toward, and how
//! it composes with the heights already in the grid.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::grid::HeightGrid;
use super::noise_field::NoiseParams;
use crate::core::Error;
use crate::core::types::{Result, Vec2};
use crate::math::NormRect;

/// Spline half-width used when a modification doesn't override it
pub const DEFAULT_SPLINE_WIDTH: f32 = 0.05;

/// Steepest slope accepted for the slope gradient, in degrees
pub const MAX_SLOPE_DEGREES: f32 = 89.0;

/// How a modification's target height composes with the current height
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    /// Signed delta around 0.5
    Add,
    /// Scale by target / 0.5
    Multiply,
    Min,
    Max,
    #[default]
    Replace,
    /// Negative signed delta around 0.5
    Subtract,
    /// Photographic overlay
    Overlay,
}

/// Source of a modification's target height
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    #[default]
    Basic,
    HeightmapSource,
    Procedural,
    Spline,
}

/// Footprint shape for non-spline kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationShape {
    #[default]
    Ellipse,
    Rectangle,
    Diamond,
}

impl ModificationShape {
    /// Normalized shape distance: <= 1 inside the footprint.
    ///
    /// `local` is the offset from the footprint center divided by its radii.
    pub fn distance(self, local: Vec2) -> f32 {
        match self {
            ModificationShape::Ellipse => local.length(),
            ModificationShape::Rectangle => local.x.abs().max(local.y.abs()),
            ModificationShape::Diamond => local.x.abs() + local.y.abs(),
        }
    }
}

/// One localized terrain edit
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainModification {
    /// Label for logs (usually the analysis feature label)
    pub name: String,
    /// Footprint in normalized map space
    pub bounds: NormRect,
    pub base_height: f32,
    pub height_variation: f32,
    /// Slope of the gradient across the footprint, degrees
    pub slope: f32,
    /// Direction the gradient rises toward, degrees (0 = +X, 90 = +Y)
    pub slope_direction: f32,
    /// Amplitude of high-frequency detail for procedural modifications
    pub roughness: f32,
    /// Falloff width beyond the footprint, as a fraction of the footprint radius
    pub blend_radius: f32,
    pub blend_mode: BlendMode,
    /// Overall influence, 0..=1
    pub strength: f32,
    /// Higher priorities are applied later and win
    pub priority: i32,
    pub kind: ModificationKind,
    pub shape: ModificationShape,
    /// Reflect the change about the current height
    pub invert: bool,
    /// Normalized polyline vertices (spline kind only)
    pub control_points: Vec<Vec2>,
    /// Spline half-width in normalized units
    pub spline_width: Option<f32>,
    pub noise: NoiseParams,
    #[serde(skip)]
    pub source_heightmap: Option<Arc<HeightGrid>>,
    #[serde(skip)]
    pub mask: Option<Arc<HeightGrid>>,
}

impl Default for TerrainModification {
    fn default() -> Self {
        Self {
            name: String::new(),
            bounds: NormRect::unit(),
            base_height: 0.5,
            height_variation: 0.0,
            slope: 0.0,
            slope_direction: 0.0,
            roughness: 0.0,
            blend_radius: 0.25,
            blend_mode: BlendMode::Replace,
            strength: 1.0,
            priority: 0,
            kind: ModificationKind::Basic,
            shape: ModificationShape::Ellipse,
            invert: false,
            control_points: Vec::new(),
            spline_width: None,
            noise: NoiseParams::default(),
            source_heightmap: None,
            mask: None,
        }
    }
}

impl TerrainModification {
    /// Shaped modification pulling toward `base_height`
    pub fn basic(bounds: NormRect, base_height: f32) -> Self {
        Self {
            bounds,
            base_height,
            ..Default::default()
        }
    }

    /// Noise-driven modification; noise is always on for this kind
    pub fn procedural(bounds: NormRect, base_height: f32, height_variation: f32, noise: NoiseParams) -> Self {
        Self {
            bounds,
            base_height,
            height_variation,
            kind: ModificationKind::Procedural,
            noise: NoiseParams { enabled: true, ..noise },
            ..Default::default()
        }
    }

    /// Stamp an external heightmap into `bounds`
    pub fn from_heightmap(bounds: NormRect, source: Arc<HeightGrid>) -> Self {
        Self {
            bounds,
            base_height: 0.0,
            height_variation: 1.0,
            kind: ModificationKind::HeightmapSource,
            source_heightmap: Some(source),
            ..Default::default()
        }
    }

    /// Band along a polyline of normalized control points
    pub fn spline(control_points: Vec<Vec2>, width: f32, base_height: f32) -> Self {
        let bounds = NormRect::bounding(&control_points).unwrap_or_default();
        Self {
            bounds,
            base_height,
            kind: ModificationKind::Spline,
            control_points,
            spline_width: Some(width),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_shape(mut self, shape: ModificationShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_blend_radius(mut self, blend_radius: f32) -> Self {
        self.blend_radius = blend_radius;
        self
    }

    pub fn with_slope(mut self, degrees: f32, direction_degrees: f32) -> Self {
        self.slope = degrees;
        self.slope_direction = direction_degrees;
        self
    }

    pub fn with_mask(mut self, mask: Arc<HeightGrid>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Effective spline half-width
    pub fn spline_width(&self) -> f32 {
        self.spline_width.unwrap_or(DEFAULT_SPLINE_WIDTH)
    }

    /// Strength clamped into 0..=1
    pub fn effective_strength(&self) -> f32 {
        if self.strength.is_finite() {
            self.strength.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Blend radius clamped to be non-negative
    pub fn effective_blend_radius(&self) -> f32 {
        if self.blend_radius.is_finite() {
            self.blend_radius.max(0.0)
        } else {
            0.0
        }
    }

    /// Check the structural invariants for this modification's kind
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ModificationKind::Spline => {
                if self.control_points.len() < 2 {
                    return Err(Error::InvalidInput(format!(
                        "spline '{}' has {} control points, needs at least 2",
                        self.name, self.control_points.len()
                    )));
                }
                if !(self.spline_width() > 0.0) {
                    return Err(Error::InvalidInput(format!(
                        "spline '{}' has non-positive width", self.name
                    )));
                }
            }
            kind => {
                if self.bounds.is_degenerate() {
                    return Err(Error::InvalidInput(format!(
                        "modification '{}' has degenerate bounds {:?}", self.name, self.bounds
                    )));
                }
                if kind == ModificationKind::HeightmapSource {
                    match &self.source_heightmap {
                        Some(src) if !src.is_empty() => {}
                        _ => {
                            return Err(Error::InvalidInput(format!(
                                "heightmap modification '{}' has no source grid", self.name
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
