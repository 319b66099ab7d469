//! Row-major grid of normalized terrain heights

use std::path::Path;

use image::{ImageBuffer, Luma};

use crate::core::Error;
use crate::core::types::{Result, Vec2};

/// 16-bit grayscale heightmap image
pub type HeightImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Width × height grid of heights in [0, 1], row-major.
///
/// A grid with zero width or height is valid but empty; blending into it is a no-op.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeightGrid {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl HeightGrid {
    /// Create a grid filled with `value`
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Create a flat grid at height 0
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Wrap existing row-major data
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::InvalidInput(format!(
                "grid data has {} values, expected {}x{}",
                data.len(), width, height
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Build a grid by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    /// Normalized coordinate of a pixel center
    #[inline]
    pub fn pixel_uv(&self, x: usize, y: usize) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }

    /// Bilinear sample at normalized (u, v); coordinates are clamped to the grid
    pub fn sample_bilinear(&self, u: f32, v: f32) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let fx = u.clamp(0.0, 1.0) * (self.width as f32 - 1.0);
        let fy = v.clamp(0.0, 1.0) * (self.height as f32 - 1.0);
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let a = self.get(x0, y0) * (1.0 - tx) + self.get(x1, y0) * tx;
        let b = self.get(x0, y1) * (1.0 - tx) + self.get(x1, y1) * tx;
        a * (1.0 - ty) + b * ty
    }

    /// (min, max) over all values; (0, 0) for an empty grid
    pub fn min_max(&self) -> (f32, f32) {
        if self.data.is_empty() {
            return (0.0, 0.0);
        }
        self.data.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
    }

    /// Import from a 16-bit grayscale image (0 → 0.0, 65535 → 1.0)
    pub fn from_image(img: &HeightImage) -> Self {
        let (w, h) = img.dimensions();
        Self::from_fn(w as usize, h as usize, |x, y| {
            img.get_pixel(x as u32, y as u32).0[0] as f32 / u16::MAX as f32
        })
    }

    /// Export to a 16-bit grayscale image, clamping to [0, 1]
    pub fn to_image(&self) -> HeightImage {
        ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
            let v = self.get(x as usize, y as usize).clamp(0.0, 1.0);
            Luma([(v * u16::MAX as f32).round() as u16])
        })
    }

    /// Load any image format `image` understands, converted to 16-bit luma
    pub fn load_image(path: &Path) -> Result<Self> {
        let img = image::open(path)?.to_luma16();
        Ok(Self::from_image(&img))
    }

    /// Save as a 16-bit grayscale PNG (or whatever the extension selects)
    pub fn save_image(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_image().save(path)?;
        Ok(())
    }
}
