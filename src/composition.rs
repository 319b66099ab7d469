//! End-to-end scene composition: base terrain, feature modifications and
//! object placement from one JSON scene document.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResults, FeatureProfileTable, modifications_from_features, requests_from_objects};
use crate::core::Error;
use crate::core::types::{Result, Vec2};
use crate::placement::{
    BatchReport, PlacedObjectRecord, PlacementConfig, PlacementOrchestrator, RuleSet, group_by_similarity,
};
use crate::terrain::{GridTerrain, HeightGrid, HeightmapBlender, NoiseField, NoiseParams, TerrainModification};

/// Scene document consumed by `compose_scene`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    /// Heightmap resolution in pixels
    pub width: usize,
    pub height: usize,
    pub base_height: f32,
    /// Amplitude of the base noise around `base_height`
    pub base_variation: f32,
    pub base_noise: NoiseParams,
    /// World XZ size covered by the heightmap
    pub world_size: Vec2,
    /// World height of a normalized height of 1
    pub height_scale: f32,
    /// Normalized water level
    pub water_level: Option<f32>,
    pub analysis: AnalysisResults,
    /// Applied together with the modifications derived from `analysis`
    pub modifications: Vec<TerrainModification>,
    /// Built-in feature profiles when unset
    pub feature_profiles: Option<FeatureProfileTable>,
    /// Built-in rules when unset
    pub rules: Option<RuleSet>,
    pub placement: PlacementConfig,
    /// Group ungrouped same-type objects closer than this (world units)
    pub group_distance: Option<f32>,
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            base_height: 0.4,
            base_variation: 0.05,
            base_noise: NoiseParams { enabled: true, ..Default::default() },
            world_size: Vec2::splat(1000.0),
            height_scale: 100.0,
            water_level: None,
            analysis: AnalysisResults::default(),
            modifications: Vec::new(),
            feature_profiles: None,
            rules: None,
            placement: PlacementConfig::default(),
            group_distance: None,
        }
    }
}

impl SceneDescription {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Flat or noisy starting heightmap
    pub fn base_grid(&self) -> HeightGrid {
        let noise = &self.base_noise;
        if !noise.enabled || self.base_variation == 0.0 {
            return HeightGrid::filled(self.width, self.height, self.base_height.clamp(0.0, 1.0));
        }
        let field = NoiseField::from_params(noise);
        let (w, h) = (self.width.max(1) as f32, self.height.max(1) as f32);
        HeightGrid::from_fn(self.width, self.height, |x, y| {
            let n = field.get_scaled((x as f32 + 0.5) / w, (y as f32 + 0.5) / h, noise.scale);
            (self.base_height + (n - 0.5) * 2.0 * self.base_variation).clamp(0.0, 1.0)
        })
    }
}

/// Output of [`compose`]
#[derive(Debug)]
pub struct ComposedScene {
    pub heightmap: HeightGrid,
    pub modifications_applied: usize,
    pub records: Vec<PlacedObjectRecord>,
    pub report: BatchReport,
}

/// Build the heightmap and place every detected object
pub fn compose(scene: &SceneDescription) -> Result<ComposedScene> {
    if scene.width == 0 || scene.height == 0 {
        return Err(Error::InvalidInput(format!(
            "scene resolution {}x{} is empty", scene.width, scene.height
        )));
    }
    if !(scene.world_size.min_element() > 0.0) {
        return Err(Error::InvalidInput(format!("scene world size {:?} is not positive", scene.world_size)));
    }

    let start = Instant::now();
    let mut grid = scene.base_grid();

    let profiles = scene.feature_profiles.clone().unwrap_or_else(FeatureProfileTable::with_defaults);
    let mut modifications = modifications_from_features(&scene.analysis.features, &profiles);
    modifications.extend(scene.modifications.iter().cloned());
    HeightmapBlender.apply_all(&mut grid, &modifications);
    log::info!(
        "Composited {}x{} heightmap with {} modifications in {:.1}ms",
        grid.width(), grid.height(), modifications.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let mut terrain = GridTerrain::new(grid.clone(), scene.world_size, scene.height_scale);
    if let Some(level) = scene.water_level {
        terrain = terrain.with_water_level(level);
    }

    let mut requests = requests_from_objects(&scene.analysis.objects, scene.world_size, scene.height_scale);
    if let Some(distance) = scene.group_distance {
        let first_id = requests.iter().filter_map(|r| r.group_id).max().map_or(0, |id| id + 1);
        let formed = group_by_similarity(&mut requests, distance, first_id);
        log::debug!("Formed {} similarity groups", formed);
    }

    let rules = scene.rules.clone().unwrap_or_else(RuleSet::with_defaults);
    let mut orchestrator = PlacementOrchestrator::new(terrain, rules, scene.placement.clone());
    let report = orchestrator.place_batch(requests, &mut ());

    Ok(ComposedScene {
        heightmap: grid,
        modifications_applied: modifications.len(),
        records: orchestrator.records().to_vec(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MapObject, TerrainFeature};
    use crate::math::NormRect;

    fn small_scene() -> SceneDescription {
        SceneDescription {
            width: 64,
            height: 64,
            base_noise: NoiseParams::default(),
            world_size: Vec2::splat(640.0),
            analysis: AnalysisResults {
                features: vec![TerrainFeature {
                    label: "plateau".into(),
                    bounds: NormRect::new(0.25, 0.25, 0.5, 0.5),
                    confidence: 1.0,
                    path: Vec::new(),
                }],
                objects: vec![
                    MapObject {
                        object_type: "house".into(),
                        bounds: NormRect::new(0.45, 0.45, 0.02, 0.02),
                        ..Default::default()
                    },
                    MapObject {
                        object_type: "rock".into(),
                        bounds: NormRect::new(0.6, 0.6, 0.01, 0.01),
                        ..Default::default()
                    },
                ],
            },
            placement: PlacementConfig::deterministic(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_small_scene() {
        let composed = compose(&small_scene()).expect("compose failed");
        assert_eq!(composed.modifications_applied, 1);
        // Plateau raises the center from 0.4 to 0.7
        assert!((composed.heightmap.get(32, 32) - 0.7).abs() < 1e-4);
        assert_eq!(composed.report.total, 2);
        assert_eq!(composed.report.placed, 2);
        let house = composed.records.iter().find(|r| r.object_type == "house").unwrap();
        assert!(house.world_position.y > 60.0);
    }

    #[test]
    fn test_empty_resolution_rejected() {
        let scene = SceneDescription { width: 0, ..small_scene() };
        assert!(matches!(compose(&scene), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_base_grid_noise_in_range() {
        let scene = SceneDescription { width: 32, height: 32, base_variation: 0.3, ..Default::default() };
        let grid = scene.base_grid();
        let (lo, hi) = grid.min_max();
        assert!(lo >= 0.1 - 1e-5 && hi <= 0.7 + 1e-5);
        assert!(hi > lo);
    }

    #[test]
    fn test_scene_json_defaults() {
        let scene = SceneDescription::from_json_str(r#"{"width": 128, "height": 64}"#).unwrap();
        assert_eq!(scene.width, 128);
        assert_eq!(scene.height_scale, 100.0);
        assert!(scene.rules.is_none());
    }
}
