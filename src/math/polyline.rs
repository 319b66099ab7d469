//! Open polyline with arc-length parametrization

use crate::core::types::Vec2;

/// Closest-point query result against a polyline
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolylineHit {
    /// Euclidean distance from the query point to the polyline
    pub distance: f32,
    /// Arc-length parameter of the closest point (0 at the first vertex, 1 at the last)
    pub t: f32,
}

/// Ordered vertices with precomputed cumulative segment lengths
#[derive(Clone, Debug)]
pub struct Polyline {
    points: Vec<Vec2>,
    cumulative: Vec<f32>,
    total_length: f32,
}

impl Polyline {
    /// Build a polyline. Returns None with fewer than 2 vertices.
    pub fn new(points: &[Vec2]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let mut cumulative = Vec::with_capacity(points.len());
        let mut acc = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            acc += pair[0].distance(pair[1]);
            cumulative.push(acc);
        }
        Some(Self {
            points: points.to_vec(),
            cumulative,
            total_length: acc,
        })
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn length(&self) -> f32 {
        self.total_length
    }

    /// Closest point on any segment, by projection clamped to the segment
    pub fn closest(&self, p: Vec2) -> PolylineHit {
        let mut best = PolylineHit { distance: f32::INFINITY, t: 0.0 };

        for (i, pair) in self.points.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let ab = b - a;
            let len_sq = ab.length_squared();
            let s = if len_sq > f32::EPSILON {
                ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let d = p.distance(a + ab * s);
            if d < best.distance {
                let arc = self.cumulative[i] + len_sq.sqrt() * s;
                let t = if self.total_length > f32::EPSILON {
                    arc / self.total_length
                } else {
                    0.0
                };
                best = PolylineHit { distance: d, t };
            }
        }

        best
    }
}
