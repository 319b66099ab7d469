//! Placement configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Configuration for object placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Batch seed; per-request RNGs derive from it.
    pub seed: u64,
    /// Jittered attempts after the direct attempt fails.
    pub max_iterations: u32,
    /// Base jitter radius in world units; attempt i searches `radius * (1 + 0.5 i)`.
    pub jitter_radius: f32,
    /// Multiplier on summed footprint radii for the collision test.
    pub spacing_factor: f32,
    /// Slope limit in degrees when no rule sets one.
    pub max_slope_degrees: f32,
    /// 0 keeps objects upright, 1 aligns them fully to the surface normal.
    pub surface_alignment_strength: f32,
    /// Random yaw added to the desired rotation, ± degrees.
    pub rotation_jitter_degrees: f32,
    /// Random relative scale change, ± fraction.
    pub scale_jitter: f32,
    /// Fraction of object height pushed below the surface.
    pub ground_sink_fraction: f32,
    /// Requests searched in parallel per window.
    pub max_concurrent: usize,
    /// Requests processed per cooperative step.
    pub yield_every: usize,
    /// Wall-clock budget for one batch.
    pub batch_timeout_secs: Option<f32>,
    /// Spatial index cell size; derived from terrain extent when unset.
    pub cell_size: Option<f32>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            max_iterations: 10,
            jitter_radius: 5.0,
            spacing_factor: 1.2,
            max_slope_degrees: 45.0,
            surface_alignment_strength: 0.5,
            rotation_jitter_degrees: 15.0,
            scale_jitter: 0.1,
            ground_sink_fraction: 0.02,
            max_concurrent: 8,
            yield_every: 16,
            batch_timeout_secs: None,
            cell_size: None,
        }
    }
}

impl PlacementConfig {
    /// Config with no randomness beyond the jittered search positions
    pub fn deterministic(seed: u64) -> Self {
        Self {
            seed,
            rotation_jitter_degrees: 0.0,
            scale_jitter: 0.0,
            ..Default::default()
        }
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f32)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}
