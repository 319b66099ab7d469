//! Heightmap compositing of terrain modifications.
//!
//! Each modification is evaluated per pixel: shape (or spline) distance,
//! falloff across the blend annulus, target height from its kind, and
//! finally composition with the existing height through its blend mode.
//! Rows are independent, so each application is split across rayon workers.

use std::sync::Arc;

use rayon::prelude::*;

use super::grid::HeightGrid;
use super::modification::{
    BlendMode, ModificationKind, TerrainModification, MAX_SLOPE_DEGREES,
};
use super::noise_field::NoiseField;
use crate::core::types::Vec2;
use crate::math::{NormRect, Polyline};

/// Frequency multiplier of the roughness detail layer
const DETAIL_FREQUENCY: f32 = 4.0;

/// Compose `target` onto `current` with weight `factor`.
///
/// The result is always clamped to [0, 1]; non-finite results leave `current` in place.
pub fn blend(current: f32, target: f32, factor: f32, mode: BlendMode, invert: bool) -> f32 {
    let f = factor.clamp(0.0, 1.0);
    // Exact at f = 1
    let lerp = |to: f32| current * (1.0 - f) + to * f;

    let blended = match mode {
        BlendMode::Add => current + (target - 0.5) * f,
        BlendMode::Subtract => current - (target - 0.5) * f,
        BlendMode::Multiply => lerp(current * target * 2.0),
        BlendMode::Min => lerp(current.min(target)),
        BlendMode::Max => lerp(current.max(target)),
        BlendMode::Replace => lerp(target),
        BlendMode::Overlay => {
            let overlay = if current < 0.5 {
                2.0 * current * target
            } else {
                1.0 - 2.0 * (1.0 - current) * (1.0 - target)
            };
            lerp(overlay)
        }
    };

    let result = if invert { current - (blended - current) } else { blended };
    if result.is_finite() {
        result.clamp(0.0, 1.0)
    } else {
        current.clamp(0.0, 1.0)
    }
}

/// Smoothstep taper from 1 at d = 1 to 0 at d = 1 + blend_radius
#[inline]
fn falloff(d: f32, blend_radius: f32) -> f32 {
    if d <= 1.0 {
        return 1.0;
    }
    if blend_radius <= 0.0 {
        return 0.0;
    }
    let t = ((d - 1.0) / blend_radius).clamp(0.0, 1.0);
    1.0 - t * t * (3.0 - 2.0 * t)
}

/// Half-open pixel rectangle [x0, x1) × [y0, y1)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PixelRegion {
    x0: usize,
    x1: usize,
    y0: usize,
    y1: usize,
}

impl PixelRegion {
    /// Pixels whose centers may fall inside [min, max] (normalized), clamped to the grid
    fn covering(min: Vec2, max: Vec2, width: usize, height: usize) -> Option<Self> {
        let clamp_axis = |lo: f32, hi: f32, n: usize| -> Option<(usize, usize)> {
            let a = (lo * n as f32).floor().max(0.0);
            let b = (hi * n as f32).ceil().min(n as f32);
            if !(a < b) {
                return None;
            }
            Some((a as usize, b as usize))
        };
        let (x0, x1) = clamp_axis(min.x, max.x, width)?;
        let (y0, y1) = clamp_axis(min.y, max.y, height)?;
        Some(Self { x0, x1, y0, y1 })
    }
}

/// Per-modification state precomputed once before the pixel loop
struct ModificationContext<'a> {
    m: &'a TerrainModification,
    center: Vec2,
    radii: Vec2,
    blend_radius: f32,
    strength: f32,
    slope_dir: Vec2,
    slope_tan: f32,
    max_extent: f32,
    noise: Option<NoiseField>,
    detail: Option<NoiseField>,
    polyline: Option<Polyline>,
    spline_width: f32,
    source: Option<Arc<HeightGrid>>,
    mask: Option<Arc<HeightGrid>>,
}

impl<'a> ModificationContext<'a> {
    fn new(m: &'a TerrainModification) -> Self {
        let radii = m.bounds.half_size();
        let slope = if m.slope.is_finite() {
            m.slope.clamp(-MAX_SLOPE_DEGREES, MAX_SLOPE_DEGREES)
        } else {
            0.0
        };
        let dir = m.slope_direction.to_radians();
        let uses_noise = m.noise.enabled || m.kind == ModificationKind::Procedural;
        let polyline = if m.kind == ModificationKind::Spline {
            Polyline::new(&m.control_points)
        } else {
            None
        };

        Self {
            m,
            center: m.bounds.center(),
            radii,
            blend_radius: m.effective_blend_radius(),
            strength: m.effective_strength(),
            slope_dir: Vec2::new(dir.cos(), dir.sin()),
            slope_tan: slope.to_radians().tan(),
            max_extent: radii.max_element().max(f32::EPSILON),
            noise: uses_noise.then(|| NoiseField::from_params(&m.noise)),
            detail: (m.kind == ModificationKind::Procedural && m.roughness != 0.0)
                .then(|| NoiseField::new(m.noise.seed, 2, 0.5, 2.0)),
            polyline,
            spline_width: m.spline_width(),
            source: m.source_heightmap.clone(),
            mask: m.mask.clone(),
        }
    }

    /// Pixel region that can possibly be affected
    fn region(&self, width: usize, height: usize) -> Option<PixelRegion> {
        match &self.polyline {
            Some(line) => {
                let bounds = NormRect::bounding(line.points())?;
                let pad = Vec2::splat(self.spline_width * (1.0 + self.blend_radius));
                PixelRegion::covering(bounds.min() - pad, bounds.max() + pad, width, height)
            }
            None => {
                let reach = self.m.bounds.expanded(self.blend_radius);
                PixelRegion::covering(reach.min(), reach.max(), width, height)
            }
        }
    }

    fn noise_variation(&self, x: f32, y: f32) -> f32 {
        match &self.noise {
            Some(field) => (field.get_scaled(x, y, self.m.noise.scale) - 0.5) * 2.0 * self.m.height_variation,
            None => 0.0,
        }
    }

    fn slope_term(&self, uv: Vec2) -> f32 {
        if self.slope_tan == 0.0 {
            return 0.0;
        }
        let signed = (uv - self.center).dot(self.slope_dir);
        self.slope_tan * signed / self.max_extent
    }

    fn target_height(&self, uv: Vec2, arc_t: f32) -> f32 {
        let m = self.m;
        match m.kind {
            ModificationKind::Basic => {
                m.base_height + self.slope_term(uv) + self.noise_variation(uv.x, uv.y)
            }
            ModificationKind::Procedural => {
                let detail = match &self.detail {
                    Some(field) => (field.get_scaled(uv.x, uv.y, m.noise.scale * DETAIL_FREQUENCY) - 0.5) * m.roughness,
                    None => 0.0,
                };
                m.base_height + self.slope_term(uv) + self.noise_variation(uv.x, uv.y) + detail
            }
            ModificationKind::HeightmapSource => {
                let local = m.bounds.to_local_uv(uv);
                let sampled = self
                    .source
                    .as_ref()
                    .map(|src| src.sample_bilinear(local.x, local.y))
                    .unwrap_or(0.0);
                m.base_height + m.height_variation * sampled + self.slope_term(uv)
            }
            ModificationKind::Spline => {
                m.base_height + self.noise_variation(arc_t, 0.5)
            }
        }
    }

    /// New height for the pixel at `uv`, or None when it is outside the reach
    fn evaluate(&self, uv: Vec2, current: f32) -> Option<f32> {
        let (d, arc_t) = match &self.polyline {
            Some(line) => {
                let hit = line.closest(uv);
                (hit.distance / self.spline_width, hit.t)
            }
            None => {
                let local = (uv - self.center) / self.radii;
                (self.m.shape.distance(local), 0.0)
            }
        };

        // Negated comparison also rejects NaN distances
        if !(d <= 1.0 + self.blend_radius) {
            return None;
        }

        let mut factor = falloff(d, self.blend_radius) * self.strength;
        if let Some(mask) = &self.mask {
            let mask_uv = if self.polyline.is_some() { uv } else { self.m.bounds.to_local_uv(uv) };
            factor *= mask.sample_bilinear(mask_uv.x, mask_uv.y).clamp(0.0, 1.0);
        }
        if factor <= 0.0 {
            return None;
        }

        let target = self.target_height(uv, arc_t);
        Some(blend(current, target, factor, self.m.blend_mode, self.m.invert))
    }
}

/// Applies terrain modifications to height grids
#[derive(Clone, Copy, Debug, Default)]
pub struct HeightmapBlender;

impl HeightmapBlender {
    pub fn new() -> Self {
        Self
    }

    /// Apply one modification in place. Returns the number of pixels touched.
    ///
    /// An empty grid or an invalid modification leaves the grid unchanged.
    pub fn apply(&self, grid: &mut HeightGrid, modification: &TerrainModification) -> usize {
        if grid.is_empty() {
            log::warn!("Skipping modification '{}': empty height grid", modification.name);
            return 0;
        }
        if let Err(e) = modification.validate() {
            log::warn!("Skipping terrain modification: {}", e);
            return 0;
        }

        let (width, height) = (grid.width(), grid.height());
        let ctx = ModificationContext::new(modification);
        let Some(region) = ctx.region(width, height) else {
            log::debug!("Modification '{}' lies outside the grid", modification.name);
            return 0;
        };

        let touched: usize = grid
            .data_mut()
            .par_chunks_mut(width)
            .enumerate()
            .skip(region.y0)
            .take(region.y1 - region.y0)
            .map(|(py, row)| {
                let v = (py as f32 + 0.5) / height as f32;
                let mut count = 0;
                for px in region.x0..region.x1 {
                    let uv = Vec2::new((px as f32 + 0.5) / width as f32, v);
                    if let Some(new_height) = ctx.evaluate(uv, row[px]) {
                        row[px] = new_height;
                        count += 1;
                    }
                }
                count
            })
            .sum();

        log::debug!(
            "Applied {:?} modification '{}' ({:?}, priority {}): {} pixels",
            modification.kind, modification.name, modification.blend_mode,
            modification.priority, touched
        );
        touched
    }

    /// Apply a list of modifications in ascending priority order.
    ///
    /// Sorting is stable, so equal priorities keep their list order. Each
    /// modification sees the output of the ones before it.
    pub fn apply_all(&self, grid: &mut HeightGrid, modifications: &[TerrainModification]) -> usize {
        let mut ordered: Vec<&TerrainModification> = modifications.iter().collect();
        ordered.sort_by_key(|m| m.priority);

        let start = std::time::Instant::now();
        let touched = ordered.into_iter().map(|m| self.apply(grid, m)).sum();
        log::info!(
            "Composited {} terrain modifications into {}x{} grid ({} pixel writes, {:.1}ms)",
            modifications.len(), grid.width(), grid.height(), touched,
            start.elapsed().as_secs_f64() * 1000.0
        );
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::modification::ModificationShape;
    use crate::terrain::noise_field::NoiseParams;

    const ALL_SHAPES: [ModificationShape; 3] = [
        ModificationShape::Ellipse,
        ModificationShape::Rectangle,
        ModificationShape::Diamond,
    ];

    const ALL_BLEND_MODES: [BlendMode; 7] = [
        BlendMode::Add,
        BlendMode::Multiply,
        BlendMode::Min,
        BlendMode::Max,
        BlendMode::Replace,
        BlendMode::Subtract,
        BlendMode::Overlay,
    ];

    fn flat(size: usize, value: f32) -> HeightGrid {
        HeightGrid::filled(size, size, value)
    }

    fn varied(size: usize) -> HeightGrid {
        let field = NoiseField::new(3, 3, 0.5, 2.0);
        HeightGrid::from_fn(size, size, |x, y| field.get(x as f32 * 0.2, y as f32 * 0.2))
    }

    #[test]
    fn test_blend_modes() {
        assert!((blend(0.5, 0.8, 1.0, BlendMode::Add, false) - 0.8).abs() < 1e-6);
        assert!((blend(0.5, 0.8, 1.0, BlendMode::Subtract, false) - 0.2).abs() < 1e-6);
        assert!((blend(0.4, 0.25, 1.0, BlendMode::Multiply, false) - 0.2).abs() < 1e-6);
        assert_eq!(blend(0.4, 0.7, 1.0, BlendMode::Min, false), 0.4);
        assert_eq!(blend(0.4, 0.7, 1.0, BlendMode::Max, false), 0.7);
        assert!((blend(0.4, 0.8, 0.5, BlendMode::Replace, false) - 0.6).abs() < 1e-6);
        assert!((blend(0.25, 0.5, 1.0, BlendMode::Overlay, false) - 0.25).abs() < 1e-6);
        assert!((blend(0.75, 0.5, 1.0, BlendMode::Overlay, false) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_blend_invert_reflects_delta() {
        // Replace toward 0.7 from 0.5 is +0.2; inverted it becomes -0.2
        assert!((blend(0.5, 0.7, 1.0, BlendMode::Replace, true) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_blend_non_finite_target() {
        assert_eq!(blend(0.4, f32::NAN, 1.0, BlendMode::Replace, false), 0.4);
    }

    #[test]
    fn test_falloff() {
        assert_eq!(falloff(0.3, 0.5), 1.0);
        assert_eq!(falloff(1.0, 0.5), 1.0);
        assert!((falloff(1.25, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(falloff(1.5, 0.5), 0.0);
        assert_eq!(falloff(1.1, 0.0), 0.0);
    }

    #[test]
    fn test_output_clamped_for_all_modes() {
        let blender = HeightmapBlender::new();
        for mode in ALL_BLEND_MODES {
            for shape in ALL_SHAPES {
                for invert in [false, true] {
                    for base in [-0.5, 0.0, 0.5, 1.0, 2.0] {
                        let mut grid = varied(32);
                        let m = TerrainModification {
                            bounds: NormRect::new(0.1, 0.2, 0.6, 0.5),
                            base_height: base,
                            height_variation: 0.8,
                            slope: 60.0,
                            slope_direction: 30.0,
                            roughness: 0.5,
                            blend_mode: mode,
                            shape,
                            invert,
                            kind: ModificationKind::Procedural,
                            noise: NoiseParams { enabled: true, ..Default::default() },
                            ..Default::default()
                        };
                        blender.apply(&mut grid, &m);
                        assert!(
                            grid.data().iter().all(|v| (0.0..=1.0).contains(v)),
                            "{:?}/{:?}/invert={} base={} escaped [0,1]",
                            mode, shape, invert, base
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_replace_full_strength_idempotent() {
        let blender = HeightmapBlender::new();
        let m = TerrainModification {
            bounds: NormRect::new(0.2, 0.2, 0.5, 0.4),
            base_height: 0.3,
            height_variation: 0.2,
            slope: 20.0,
            blend_radius: 0.0,
            noise: NoiseParams { enabled: true, seed: 8, ..Default::default() },
            ..Default::default()
        };

        let mut grid = varied(40);
        blender.apply(&mut grid, &m);
        let once = grid.clone();
        blender.apply(&mut grid, &m);

        for (a, b) in once.data().iter().zip(grid.data()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_replace_idempotent_inside_footprint_only() {
        let blender = HeightmapBlender::new();
        let bounds = NormRect::new(0.2, 0.2, 0.5, 0.4);
        let m = TerrainModification {
            bounds,
            base_height: 0.3,
            height_variation: 0.2,
            noise: NoiseParams { enabled: true, seed: 8, ..Default::default() },
            ..Default::default()
        };
        assert!(m.blend_radius > 0.0);

        let mut grid = varied(40);
        blender.apply(&mut grid, &m);
        let once = grid.clone();
        blender.apply(&mut grid, &m);

        let mut annulus_changed = 0;
        for y in 0..40 {
            for x in 0..40 {
                let local = (grid.pixel_uv(x, y) - bounds.center()) / bounds.half_size();
                let d = ModificationShape::Ellipse.distance(local);
                let (a, b) = (once.get(x, y), grid.get(x, y));
                if d <= 1.0 {
                    assert_eq!(a.to_bits(), b.to_bits(), "pixel ({x}, {y}) drifted");
                } else if a != b {
                    annulus_changed += 1;
                }
            }
        }
        // The falloff annulus keeps moving toward the target on every pass
        assert!(annulus_changed > 0);
    }

    #[test]
    fn test_spline_band() {
        let blender = HeightmapBlender::new();
        let mut grid = flat(100, 0.5);
        let m = TerrainModification::spline(
            vec![Vec2::new(0.2, 0.5), Vec2::new(0.8, 0.5)],
            0.05,
            0.8,
        );
        assert!(blender.apply(&mut grid, &m) > 0);

        for py in 0..100 {
            for px in 0..100 {
                let uv = grid.pixel_uv(px, py);
                if (0.2..=0.8).contains(&uv.x) && (uv.y - 0.5).abs() < 0.05 {
                    assert!(
                        (grid.get(px, py) - 0.8).abs() < 1e-4,
                        "pixel {:?} = {}", uv, grid.get(px, py)
                    );
                }
            }
        }

        // (0.1, 0.9) is far from the band
        assert!((grid.get(9, 89) - 0.5).abs() < 1e-6);
        assert!((grid.get(50, 10) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_spline_with_one_point_is_noop() {
        let blender = HeightmapBlender::new();
        let mut grid = flat(16, 0.5);
        let m = TerrainModification::spline(vec![Vec2::new(0.5, 0.5)], 0.1, 0.9);
        assert_eq!(blender.apply(&mut grid, &m), 0);
        assert_eq!(grid, flat(16, 0.5));
    }

    #[test]
    fn test_empty_grid_is_noop() {
        let blender = HeightmapBlender::new();
        let mut grid = HeightGrid::default();
        assert_eq!(blender.apply(&mut grid, &TerrainModification::default()), 0);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_ellipse_inside_and_outside() {
        let blender = HeightmapBlender::new();
        let mut grid = flat(64, 0.5);
        let m = TerrainModification::basic(NormRect::new(0.25, 0.25, 0.5, 0.5), 0.9)
            .with_blend_radius(0.2);
        blender.apply(&mut grid, &m);

        // Center gets the full target
        assert!((grid.get(32, 32) - 0.9).abs() < 1e-6);
        // Corner pixel is outside the ellipse reach
        assert_eq!(grid.get(0, 0), 0.5);
        // Just outside the ellipse edge is blended partially
        let annulus = grid.get(32, 14);
        assert!(annulus > 0.5 && annulus < 0.9, "annulus value {}", annulus);
    }

    #[test]
    fn test_shapes_differ_at_corner() {
        let blender = HeightmapBlender::new();
        let bounds = NormRect::new(0.25, 0.25, 0.5, 0.5);
        let corner = (20, 20); // inside the rectangle, outside the ellipse

        let mut rect = flat(64, 0.0);
        blender.apply(&mut rect, &TerrainModification::basic(bounds, 1.0)
            .with_shape(ModificationShape::Rectangle).with_blend_radius(0.0));
        let mut ellipse = flat(64, 0.0);
        blender.apply(&mut ellipse, &TerrainModification::basic(bounds, 1.0).with_blend_radius(0.0));

        assert_eq!(rect.get(corner.0, corner.1), 1.0);
        assert_eq!(ellipse.get(corner.0, corner.1), 0.0);
    }

    #[test]
    fn test_priority_order_matches_manual() {
        let blender = HeightmapBlender::new();
        let low = TerrainModification::basic(NormRect::new(0.1, 0.1, 0.6, 0.6), 0.9).with_priority(1);
        let high = TerrainModification::basic(NormRect::new(0.3, 0.3, 0.6, 0.6), 0.2)
            .with_priority(2)
            .with_blend_mode(BlendMode::Overlay);

        let mut batched = varied(48);
        let mut manual = batched.clone();
        // Listed out of order on purpose
        blender.apply_all(&mut batched, &[high.clone(), low.clone()]);
        blender.apply(&mut manual, &low);
        blender.apply(&mut manual, &high);

        assert_eq!(batched, manual);
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let blender = HeightmapBlender::new();
        let a = TerrainModification::basic(NormRect::unit(), 0.2)
            .with_shape(ModificationShape::Rectangle);
        let b = TerrainModification::basic(NormRect::unit(), 0.7)
            .with_shape(ModificationShape::Rectangle);

        let mut grid = flat(8, 0.5);
        blender.apply_all(&mut grid, &[a, b]);
        assert!(grid.data().iter().all(|v| (v - 0.7).abs() < 1e-6));
    }

    #[test]
    fn test_heightmap_source_stamp() {
        let blender = HeightmapBlender::new();
        let source = Arc::new(HeightGrid::filled(4, 4, 0.3));
        let m = TerrainModification::from_heightmap(NormRect::unit(), source)
            .with_shape(ModificationShape::Rectangle)
            .with_blend_radius(0.0);

        let mut grid = flat(16, 0.9);
        assert_eq!(blender.apply(&mut grid, &m), 256);
        assert!(grid.data().iter().all(|v| (v - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_zero_mask_blocks_change() {
        let blender = HeightmapBlender::new();
        let m = TerrainModification::basic(NormRect::unit(), 1.0)
            .with_shape(ModificationShape::Rectangle)
            .with_mask(Arc::new(HeightGrid::filled(2, 2, 0.0)));

        let mut grid = flat(16, 0.5);
        assert_eq!(blender.apply(&mut grid, &m), 0);
        assert_eq!(grid, flat(16, 0.5));
    }

    #[test]
    fn test_slope_rises_along_direction() {
        let blender = HeightmapBlender::new();
        let m = TerrainModification::basic(NormRect::unit(), 0.5)
            .with_shape(ModificationShape::Rectangle)
            .with_blend_radius(0.0)
            .with_slope(20.0, 0.0);

        let mut grid = flat(32, 0.0);
        blender.apply(&mut grid, &m);

        let row: Vec<f32> = (0..32).map(|x| grid.get(x, 16)).collect();
        assert!(row.windows(2).all(|w| w[1] > w[0]), "row should rise along +X");
        // Columns are flat perpendicular to the slope direction
        assert!((grid.get(5, 0) - grid.get(5, 31)).abs() < 1e-6);
    }

    #[test]
    fn test_bounds_outside_grid() {
        let blender = HeightmapBlender::new();
        let m = TerrainModification::basic(NormRect::new(2.0, 2.0, 0.5, 0.5), 1.0)
            .with_blend_radius(0.0);
        let mut grid = flat(16, 0.5);
        assert_eq!(blender.apply(&mut grid, &m), 0);
    }
}
