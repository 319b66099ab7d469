//! Uniform XZ grid over placed objects for neighbour queries

use std::collections::HashMap;

use glam::I64Vec2;

use super::request::PlacedObjectRecord;
use crate::core::types::{IVec2, Vec2, Vec3};

/// Smallest cell size, world units
pub const MIN_CELL_SIZE: f32 = 10.0;

/// Terrain extent is split into roughly this many cells per axis
pub const CELLS_PER_EXTENT: f32 = 100.0;

/// One object tracked by the index
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialEntry {
    pub id: u64,
    pub position: Vec3,
    /// Footprint radius, world units
    pub radius: f32,
    pub object_type: String,
}

impl SpatialEntry {
    #[inline]
    pub fn position_xz(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }
}

impl From<&PlacedObjectRecord> for SpatialEntry {
    fn from(record: &PlacedObjectRecord) -> Self {
        Self {
            id: record.id,
            position: record.world_position,
            radius: record.footprint_radius(),
            object_type: record.object_type.clone(),
        }
    }
}

/// Cell → entries map. Entries are never removed individually.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    cell_size: f32,
    cells: HashMap<IVec2, Vec<usize>>,
    entries: Vec<SpatialEntry>,
    max_radius: f32,
}

impl SpatialIndex {
    /// Index with a fixed cell size; non-positive sizes fall back to `MIN_CELL_SIZE`
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { MIN_CELL_SIZE };
        Self {
            cell_size,
            cells: HashMap::new(),
            entries: Vec::new(),
            max_radius: 0.0,
        }
    }

    /// Index sized for a terrain of `extent` world units
    pub fn for_extent(extent: Vec2) -> Self {
        Self::new((extent.max_element() / CELLS_PER_EXTENT).max(MIN_CELL_SIZE))
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cell_of(&self, xz: Vec2) -> IVec2 {
        (xz / self.cell_size).floor().as_ivec2()
    }

    pub fn insert(&mut self, entry: SpatialEntry) {
        let cell = self.cell_of(entry.position_xz());
        self.max_radius = self.max_radius.max(entry.radius);
        self.cells.entry(cell).or_default().push(self.entries.len());
        self.entries.push(entry);
    }

    /// Every entry whose cell overlaps the square `[p - r, p + r]`.
    ///
    /// A superset of the entries within `radius`: callers confirm with an exact test.
    pub fn query(&self, position: Vec2, radius: f32) -> Vec<&SpatialEntry> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let radius = radius.max(0.0);
        let lo = self.cell_of(position - Vec2::splat(radius));
        let hi = self.cell_of(position + Vec2::splat(radius));
        let span = hi.as_i64vec2() - lo.as_i64vec2() + I64Vec2::ONE;
        let mut found = Vec::new();

        if span.x.saturating_mul(span.y) > self.cells.len() as i64 {
            // Fewer occupied cells than cells in range
            for (cell, ids) in &self.cells {
                if cell.cmpge(lo).all() && cell.cmple(hi).all() {
                    found.extend(ids.iter().map(|&i| &self.entries[i]));
                }
            }
        } else {
            for z in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    if let Some(ids) = self.cells.get(&IVec2::new(x, z)) {
                        found.extend(ids.iter().map(|&i| &self.entries[i]));
                    }
                }
            }
        }
        found
    }

    /// Entries whose center lies within `radius` (XZ distance)
    pub fn query_within(&self, position: Vec2, radius: f32) -> Vec<&SpatialEntry> {
        self.query(position, radius)
            .into_iter()
            .filter(|e| e.position_xz().distance(position) <= radius)
            .collect()
    }

    /// Largest radius inserted so far
    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    pub fn entries(&self) -> &[SpatialEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
        self.max_radius = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn entry(id: u64, x: f32, z: f32, radius: f32) -> SpatialEntry {
        SpatialEntry {
            id,
            position: Vec3::new(x, 0.0, z),
            radius,
            object_type: "rock".into(),
        }
    }

    #[test]
    fn test_cell_size_from_extent() {
        assert_eq!(SpatialIndex::for_extent(Vec2::splat(500.0)).cell_size(), 10.0);
        assert_eq!(SpatialIndex::for_extent(Vec2::new(4000.0, 2000.0)).cell_size(), 40.0);
        assert_eq!(SpatialIndex::new(0.0).cell_size(), MIN_CELL_SIZE);
    }

    #[test]
    fn test_negative_coordinates_floor() {
        let index = SpatialIndex::new(10.0);
        assert_eq!(index.cell_of(Vec2::new(-0.5, 9.9)), IVec2::new(-1, 0));
        assert_eq!(index.cell_of(Vec2::new(-10.0, -10.1)), IVec2::new(-1, -2));
    }

    #[test]
    fn test_query_across_cells() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(entry(1, 9.5, 9.5, 1.0));
        index.insert(entry(2, 10.5, 10.5, 2.0));
        index.insert(entry(3, 55.0, 55.0, 1.0));

        let ids: Vec<u64> = index.query(Vec2::new(10.0, 10.0), 1.0).iter().map(|e| e.id).collect();
        assert!(ids.contains(&1) && ids.contains(&2));
        assert!(!ids.contains(&3));
        assert_eq!(index.max_radius(), 2.0);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut index = SpatialIndex::new(10.0);
        let mut all = Vec::new();
        for id in 0..500u64 {
            let e = entry(id, rng.random::<f32>() * 300.0 - 150.0, rng.random::<f32>() * 300.0 - 150.0, 1.0);
            all.push(e.clone());
            index.insert(e);
        }

        for _ in 0..50 {
            let p = Vec2::new(rng.random::<f32>() * 300.0 - 150.0, rng.random::<f32>() * 300.0 - 150.0);
            let r = rng.random::<f32>() * 40.0;
            let got: Vec<u64> = index.query(p, r).iter().map(|e| e.id).collect();
            for e in &all {
                if e.position_xz().distance(p) <= r {
                    assert!(got.contains(&e.id), "missed entry {} near {:?}", e.id, p);
                }
            }
        }
    }

    #[test]
    fn test_huge_radius_scans_occupied_cells() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(entry(1, 0.0, 0.0, 1.0));
        index.insert(entry(2, -5000.0, 8000.0, 1.0));
        assert_eq!(index.query(Vec2::ZERO, 1.0e6).len(), 2);
    }

    #[test]
    fn test_query_within_is_exact() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(entry(1, 0.0, 0.0, 1.0));
        index.insert(entry(2, 3.0, 4.0, 1.0));
        assert_eq!(index.query_within(Vec2::ZERO, 4.9).len(), 1);
        assert_eq!(index.query_within(Vec2::ZERO, 5.0).len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(entry(1, 0.0, 0.0, 3.0));
        index.insert(entry(2, 4.0, 4.0, 1.0));
        index.insert(entry(3, 25.0, -5.0, 1.0));
        assert_eq!(index.occupied_cells(), 2);
        assert_eq!(index.entries().iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        index.clear();
        assert!(index.is_empty());
        assert!(index.entries().is_empty());
        assert_eq!(index.occupied_cells(), 0);
        assert_eq!(index.max_radius(), 0.0);
        assert!(index.query(Vec2::ZERO, 100.0).is_empty());
    }
}
