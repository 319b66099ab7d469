//! Object placement on a built terrain
//!
//! Requests flow through the orchestrator, which orders them, searches for a
//! valid ground point for each one and records what it placed in a spatial
//! index so later objects keep their distance.

pub mod config;
pub mod observer;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod request;
pub mod rules;
pub mod search;
pub mod spatial;

pub use config::PlacementConfig;
pub use observer::{ChannelObserver, PlacementEvent, PlacementObserver};
pub use orchestrator::{BatchRun, CancelToken, PlacementOrchestrator, StepStatus};
pub use provider::{ModelHandle, ModelProvider, StaticModelProvider};
pub use report::{BatchReport, PlacementStats};
pub use request::{ObjectBounds, ObjectGroup, PlacedObjectRecord, PlacementRequest, group_by_similarity, group_requests};
pub use rules::{PlacementRule, RuleSet, WaterProximity};
pub use search::{PlacementSearch, Rejection, SearchOutcome, SearchState};
pub use spatial::{SpatialEntry, SpatialIndex};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::types::{Vec2, Vec3};
    use crate::terrain::TerrainQuery;

    /// Square planar terrain rising along +X, with optional water
    pub struct PlaneTerrain {
        size: f32,
        base: f32,
        gradient: f32,
        water_level: Option<f32>,
    }

    impl PlaneTerrain {
        pub fn flat(size: f32, height: f32) -> Self {
            Self { size, base: height, gradient: 0.0, water_level: None }
        }

        pub fn inclined(size: f32, degrees: f32) -> Self {
            Self { size, base: 0.0, gradient: degrees.to_radians().tan(), water_level: None }
        }

        /// Gentle ramp with water covering `x < shore_x`
        pub fn with_water_below_x(size: f32, shore_x: f32) -> Self {
            let gradient = 0.1;
            Self { size, base: 0.0, gradient, water_level: Some(shore_x * gradient) }
        }
    }

    impl TerrainQuery for PlaneTerrain {
        fn height_at(&self, xz: Vec2) -> f32 {
            self.base + self.gradient * xz.x
        }

        fn normal_at(&self, _xz: Vec2) -> Vec3 {
            Vec3::new(-self.gradient, 1.0, 0.0).normalize()
        }

        fn is_within_bounds(&self, xz: Vec2) -> bool {
            (0.0..=self.size).contains(&xz.x) && (0.0..=self.size).contains(&xz.y)
        }

        fn height_range(&self) -> Option<(f32, f32)> {
            Some((self.base, self.base + self.gradient * self.size))
        }

        fn water_level(&self) -> Option<f32> {
            self.water_level
        }

        fn extent(&self) -> Option<Vec2> {
            Some(Vec2::splat(self.size))
        }
    }
}
