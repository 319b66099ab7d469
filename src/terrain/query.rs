//! Terrain query interface consumed by object placement

use std::sync::Arc;

use super::grid::HeightGrid;
use crate::core::types::{Vec2, Vec3};

/// Read-only view of a built terrain.
///
/// World coordinates are XZ in world units; heights are world units.
pub trait TerrainQuery: Send + Sync {
    /// Terrain surface height at a world XZ position
    fn height_at(&self, xz: Vec2) -> f32;

    /// Unit surface normal at a world XZ position
    fn normal_at(&self, xz: Vec2) -> Vec3;

    /// Whether the position lies on the terrain
    fn is_within_bounds(&self, xz: Vec2) -> bool;

    /// Slope angle in degrees (0 = flat, 90 = vertical)
    fn slope_at(&self, xz: Vec2) -> f32 {
        self.normal_at(xz).y.clamp(-1.0, 1.0).acos().to_degrees()
    }

    /// (lowest, highest) surface height, when known.
    ///
    /// Relative-height rules only apply to terrains that report a range.
    fn height_range(&self) -> Option<(f32, f32)> {
        None
    }

    /// Water surface height, if the terrain has water
    fn water_level(&self) -> Option<f32> {
        None
    }

    /// World XZ extent, when the terrain is bounded
    fn extent(&self) -> Option<Vec2> {
        None
    }

    /// Height mapped into 0..=1 across `height_range`
    fn relative_height(&self, height: f32) -> Option<f32> {
        let (lo, hi) = self.height_range()?;
        if hi - lo <= f32::EPSILON {
            return Some(0.0);
        }
        Some(((height - lo) / (hi - lo)).clamp(0.0, 1.0))
    }
}

impl<T: TerrainQuery + ?Sized> TerrainQuery for Arc<T> {
    fn height_at(&self, xz: Vec2) -> f32 {
        (**self).height_at(xz)
    }

    fn normal_at(&self, xz: Vec2) -> Vec3 {
        (**self).normal_at(xz)
    }

    fn is_within_bounds(&self, xz: Vec2) -> bool {
        (**self).is_within_bounds(xz)
    }

    fn slope_at(&self, xz: Vec2) -> f32 {
        (**self).slope_at(xz)
    }

    fn height_range(&self) -> Option<(f32, f32)> {
        (**self).height_range()
    }

    fn water_level(&self) -> Option<f32> {
        (**self).water_level()
    }

    fn extent(&self) -> Option<Vec2> {
        (**self).extent()
    }
}

impl<T: TerrainQuery + ?Sized> TerrainQuery for &T {
    fn height_at(&self, xz: Vec2) -> f32 {
        (**self).height_at(xz)
    }

    fn normal_at(&self, xz: Vec2) -> Vec3 {
        (**self).normal_at(xz)
    }

    fn is_within_bounds(&self, xz: Vec2) -> bool {
        (**self).is_within_bounds(xz)
    }

    fn slope_at(&self, xz: Vec2) -> f32 {
        (**self).slope_at(xz)
    }

    fn height_range(&self) -> Option<(f32, f32)> {
        (**self).height_range()
    }

    fn water_level(&self) -> Option<f32> {
        (**self).water_level()
    }

    fn extent(&self) -> Option<Vec2> {
        (**self).extent()
    }
}

/// Terrain backed by a normalized height grid stretched over a world rectangle.
///
/// Grid pixel (0, 0) maps to world `origin`; grid rows run along +Z.
#[derive(Clone, Debug)]
pub struct GridTerrain {
    grid: HeightGrid,
    origin: Vec2,
    size: Vec2,
    height_scale: f32,
    water_level: Option<f32>,
    height_range: (f32, f32),
}

impl GridTerrain {
    /// Create a terrain of `size` world units (XZ) with heights scaled by `height_scale`
    pub fn new(grid: HeightGrid, size: Vec2, height_scale: f32) -> Self {
        let (lo, hi) = grid.min_max();
        Self {
            grid,
            origin: Vec2::ZERO,
            size,
            height_scale,
            water_level: None,
            height_range: (lo * height_scale, hi * height_scale),
        }
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    /// Water surface at a normalized height (0..=1 of `height_scale`)
    pub fn with_water_level(mut self, normalized: f32) -> Self {
        self.water_level = Some(normalized * self.height_scale);
        self
    }

    pub fn grid(&self) -> &HeightGrid {
        &self.grid
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    /// World distance between adjacent grid samples (finite-difference step)
    fn sample_spacing(&self) -> Vec2 {
        let cells = Vec2::new(
            (self.grid.width().max(2) - 1) as f32,
            (self.grid.height().max(2) - 1) as f32,
        );
        self.size / cells
    }

    fn to_uv(&self, xz: Vec2) -> Vec2 {
        (xz - self.origin) / self.size
    }
}

impl TerrainQuery for GridTerrain {
    fn height_at(&self, xz: Vec2) -> f32 {
        let uv = self.to_uv(xz);
        self.grid.sample_bilinear(uv.x, uv.y) * self.height_scale
    }

    fn normal_at(&self, xz: Vec2) -> Vec3 {
        let eps = self.sample_spacing();
        let dh_dx = (self.height_at(xz + Vec2::new(eps.x, 0.0))
                   - self.height_at(xz - Vec2::new(eps.x, 0.0))) / (2.0 * eps.x);
        let dh_dz = (self.height_at(xz + Vec2::new(0.0, eps.y))
                   - self.height_at(xz - Vec2::new(0.0, eps.y))) / (2.0 * eps.y);
        Vec3::new(-dh_dx, 1.0, -dh_dz).try_normalize().unwrap_or(Vec3::Y)
    }

    fn is_within_bounds(&self, xz: Vec2) -> bool {
        let uv = self.to_uv(xz);
        (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y)
    }

    fn height_range(&self) -> Option<(f32, f32)> {
        Some(self.height_range)
    }

    fn water_level(&self) -> Option<f32> {
        self.water_level
    }

    fn extent(&self) -> Option<Vec2> {
        Some(self.size)
    }
}
