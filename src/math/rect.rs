//! Normalized 2D rectangle

use serde::{Deserialize, Serialize};

use crate::core::types::Vec2;

/// Rectangle in normalized map space, defined by min corner and size
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormRect {
    /// Create rect from min corner and size
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Create rect from center and half-size
    pub fn from_center_half_size(center: Vec2, half: Vec2) -> Self {
        Self {
            x: center.x - half.x,
            y: center.y - half.y,
            width: half.x * 2.0,
            height: half.y * 2.0,
        }
    }

    /// The whole normalized map
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    /// Get center point
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Get half-size (ellipse radii for shaped modifications)
    pub fn half_size(&self) -> Vec2 {
        self.size() * 0.5
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// True when the rect has no usable area (zero, negative or non-finite size)
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
            || !self.x.is_finite()
            || !self.y.is_finite()
            || !self.width.is_finite()
            || !self.height.is_finite()
    }

    /// Check if point is inside rect
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.x + self.width &&
        p.y >= self.y && p.y <= self.y + self.height
    }

    /// Rect grown around its center by `factor` of its half-size on every side
    pub fn expanded(&self, factor: f32) -> NormRect {
        let half = self.half_size() * (1.0 + factor.max(0.0));
        Self::from_center_half_size(self.center(), half)
    }

    /// Map a normalized point into this rect's local UV (0..1 across the rect)
    pub fn to_local_uv(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            ((p.x - self.x) / self.width).clamp(0.0, 1.0),
            ((p.y - self.y) / self.height).clamp(0.0, 1.0),
        )
    }

    /// Smallest rect containing all points
    pub fn bounding(points: &[Vec2]) -> Option<NormRect> {
        let first = *points.first()?;
        let (min, max) = points[1..]
            .iter()
            .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self::new(min.x, min.y, max.x - min.x, max.y - min.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let r = NormRect::new(0.2, 0.4, 0.2, 0.4);
        assert!((r.center() - Vec2::new(0.3, 0.6)).length() < 1e-6);
        assert!((r.half_size() - Vec2::new(0.1, 0.2)).length() < 1e-6);
        assert!(!r.is_degenerate());
    }

    #[test]
    fn test_degenerate() {
        assert!(NormRect::new(0.1, 0.1, 0.0, 0.5).is_degenerate());
        assert!(NormRect::new(0.1, 0.1, -0.2, 0.5).is_degenerate());
        assert!(NormRect::new(f32::NAN, 0.1, 0.2, 0.5).is_degenerate());
    }

    #[test]
    fn test_contains_and_local_uv() {
        let r = NormRect::new(0.0, 0.0, 0.5, 0.5);
        assert!(r.contains(Vec2::splat(0.25)));
        assert!(!r.contains(Vec2::splat(0.75)));
        assert_eq!(r.to_local_uv(Vec2::splat(0.25)), Vec2::splat(0.5));
        assert_eq!(r.to_local_uv(Vec2::splat(0.9)), Vec2::ONE);
    }

    #[test]
    fn test_expanded_keeps_center() {
        let r = NormRect::new(0.4, 0.4, 0.2, 0.2);
        let e = r.expanded(0.5);
        assert!((e.center() - r.center()).length() < 1e-6);
        assert!((e.width - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_bounding() {
        let r = NormRect::bounding(&[Vec2::new(0.2, 0.5), Vec2::new(0.8, 0.3)]).unwrap();
        assert_eq!(r.min(), Vec2::new(0.2, 0.3));
        assert!((r.max() - Vec2::new(0.8, 0.5)).length() < 1e-6);
        assert!(NormRect::bounding(&[]).is_none());
    }
}
