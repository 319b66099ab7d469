//! Conversion of map analysis output into terrain modifications and
//! placement requests.
//!
//! Analysis works in normalized image space: boxes and paths are 0..=1 with
//! image Y pointing down the map, which maps to world +Z.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::{Result, Vec2, Vec3};
use crate::math::NormRect;
use crate::placement::rules::pattern_matches;
use crate::placement::{ObjectBounds, PlacementRequest};
use crate::terrain::{BlendMode, ModificationKind, ModificationShape, NoiseParams, TerrainModification};

/// A detected terrain feature
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainFeature {
    /// Feature class, e.g. "mountain" or "river"
    pub label: String,
    pub bounds: NormRect,
    pub confidence: f32,
    /// Centerline for linear features
    pub path: Vec<Vec2>,
}

/// A detected object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapObject {
    pub object_type: String,
    pub description: String,
    pub bounds: NormRect,
    /// Degrees
    pub rotation_y: f32,
    pub confidence: f32,
    pub group_id: Option<u32>,
}

impl Default for MapObject {
    fn default() -> Self {
        Self {
            object_type: String::new(),
            description: String::new(),
            bounds: NormRect::default(),
            rotation_y: 0.0,
            confidence: 1.0,
            group_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResults {
    pub features: Vec<TerrainFeature>,
    pub objects: Vec<MapObject>,
}

impl AnalysisResults {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Modification template for feature labels matching `pattern`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureProfile {
    pub pattern: String,
    pub template: TerrainModification,
}

impl FeatureProfile {
    pub fn new(pattern: impl Into<String>, template: TerrainModification) -> Self {
        Self { pattern: pattern.into(), template }
    }
}

/// Ordered label → template table; the first matching profile wins
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureProfileTable {
    profiles: Vec<FeatureProfile>,
}

impl FeatureProfileTable {
    pub fn new(profiles: Vec<FeatureProfile>) -> Self {
        Self { profiles }
    }

    pub fn with_defaults() -> Self {
        let noise = |seed: u32, scale: f32, octaves: u32| NoiseParams {
            enabled: true,
            seed,
            scale,
            octaves,
            ..Default::default()
        };

        let mountain = TerrainModification {
            base_height: 0.8,
            height_variation: 0.2,
            roughness: 0.1,
            blend_radius: 0.6,
            blend_mode: BlendMode::Max,
            priority: 3,
            kind: ModificationKind::Procedural,
            noise: noise(101, 6.0, 5),
            ..Default::default()
        };
        let hill = TerrainModification {
            base_height: 0.62,
            height_variation: 0.08,
            blend_radius: 0.8,
            blend_mode: BlendMode::Max,
            priority: 2,
            noise: noise(202, 3.0, 3),
            ..Default::default()
        };
        let plateau = TerrainModification {
            base_height: 0.7,
            blend_radius: 0.2,
            priority: 2,
            shape: ModificationShape::Rectangle,
            ..Default::default()
        };
        let valley = TerrainModification {
            base_height: 0.3,
            blend_radius: 0.6,
            blend_mode: BlendMode::Min,
            priority: 1,
            ..Default::default()
        };
        let lake = TerrainModification {
            base_height: 0.15,
            blend_radius: 0.3,
            blend_mode: BlendMode::Min,
            priority: 4,
            ..Default::default()
        };
        let river = TerrainModification {
            base_height: 0.2,
            height_variation: 0.03,
            blend_radius: 0.8,
            blend_mode: BlendMode::Min,
            priority: 5,
            kind: ModificationKind::Spline,
            spline_width: Some(0.015),
            noise: noise(303, 2.0, 2),
            ..Default::default()
        };
        let road = TerrainModification {
            base_height: 0.45,
            blend_radius: 0.5,
            strength: 0.6,
            priority: 6,
            kind: ModificationKind::Spline,
            spline_width: Some(0.008),
            ..Default::default()
        };
        let plain = TerrainModification {
            base_height: 0.45,
            blend_radius: 0.5,
            strength: 0.5,
            priority: 0,
            ..Default::default()
        };

        Self::new(vec![
            FeatureProfile::new("mountain*", mountain),
            FeatureProfile::new("hill*", hill),
            FeatureProfile::new("plateau*", plateau),
            FeatureProfile::new("valley*", valley),
            FeatureProfile::new("lake*", lake.clone()),
            FeatureProfile::new("water*", lake),
            FeatureProfile::new("river*", river.clone()),
            FeatureProfile::new("stream*", river),
            FeatureProfile::new("road*", road.clone()),
            FeatureProfile::new("path*", road),
            FeatureProfile::new("plain*", plain.clone()),
            FeatureProfile::new("field*", plain),
        ])
    }

    pub fn profiles(&self) -> &[FeatureProfile] {
        &self.profiles
    }

    pub fn push(&mut self, profile: FeatureProfile) {
        self.profiles.push(profile);
    }

    pub fn lookup(&self, label: &str) -> Option<&FeatureProfile> {
        self.profiles.iter().find(|p| pattern_matches(&p.pattern, label))
    }

    /// Instantiate the matching template for `feature`
    pub fn modification_for(&self, feature: &TerrainFeature) -> Option<TerrainModification> {
        let profile = self.lookup(&feature.label)?;
        let mut m = profile.template.clone();
        m.name = feature.label.clone();
        m.strength *= feature.confidence.clamp(0.0, 1.0);

        if m.kind == ModificationKind::Spline {
            m.control_points = if feature.path.len() >= 2 {
                feature.path.clone()
            } else {
                centerline(&feature.bounds)
            };
            m.bounds = NormRect::bounding(&m.control_points).unwrap_or(feature.bounds);
        } else {
            m.bounds = feature.bounds;
        }
        Some(m)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Line through the box center along its longer axis
fn centerline(bounds: &NormRect) -> Vec<Vec2> {
    let (lo, hi, c) = (bounds.min(), bounds.max(), bounds.center());
    if bounds.width >= bounds.height {
        vec![Vec2::new(lo.x, c.y), Vec2::new(hi.x, c.y)]
    } else {
        vec![Vec2::new(c.x, lo.y), Vec2::new(c.x, hi.y)]
    }
}

/// Modifications for every feature with a profile, skipping unknown labels
/// and features whose modification would be a no-op.
///
/// Procedural noise seeds are offset per feature so repeated labels differ.
pub fn modifications_from_features(features: &[TerrainFeature], table: &FeatureProfileTable) -> Vec<TerrainModification> {
    let mut out = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let Some(mut m) = table.modification_for(feature) else {
            log::debug!("No terrain profile for feature '{}'", feature.label);
            continue;
        };
        m.noise.seed = m.noise.seed.wrapping_add(i as u32);
        if let Err(e) = m.validate() {
            log::warn!("Skipping feature '{}': {}", feature.label, e);
            continue;
        }
        out.push(m);
    }
    log::debug!("{} of {} features produced terrain modifications", out.len(), features.len());
    out
}

/// Placement requests for detected objects on a terrain of `world_extent` (XZ).
///
/// Boxes become world positions and footprint half-extents. Object height is
/// taken as its larger footprint half-extent, capped at a quarter of
/// `height_scale` when that is positive.
pub fn requests_from_objects(objects: &[MapObject], world_extent: Vec2, height_scale: f32) -> Vec<PlacementRequest> {
    objects
        .iter()
        .map(|object| {
            let center = object.bounds.center() * world_extent;
            let half = object.bounds.half_size().abs() * world_extent;
            let mut half_y = half.x.max(half.y);
            if height_scale > 0.0 {
                half_y = half_y.min(height_scale * 0.25);
            }
            PlacementRequest {
                object_type: object.object_type.clone(),
                description: object.description.clone(),
                desired_position: center,
                desired_rotation_y: object.rotation_y,
                desired_scale: 1.0,
                bounds: ObjectBounds::new(Vec3::new(half.x, half_y, half.y)),
                confidence: object.confidence,
                group_id: object.group_id,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(label: &str, bounds: NormRect) -> TerrainFeature {
        TerrainFeature { label: label.into(), bounds, confidence: 1.0, path: Vec::new() }
    }

    #[test]
    fn test_default_profiles() {
        let table = FeatureProfileTable::with_defaults();
        let m = table.modification_for(&feature("Mountain_Range", NormRect::new(0.1, 0.1, 0.3, 0.3))).unwrap();
        assert_eq!(m.kind, ModificationKind::Procedural);
        assert_eq!(m.name, "Mountain_Range");
        assert_eq!(m.bounds, NormRect::new(0.1, 0.1, 0.3, 0.3));
        assert!(table.lookup("lake").is_some());
        assert!(table.lookup("volcano").is_none());
    }

    #[test]
    fn test_confidence_scales_strength() {
        let table = FeatureProfileTable::with_defaults();
        let mut f = feature("valley", NormRect::new(0.2, 0.2, 0.2, 0.2));
        f.confidence = 0.5;
        assert_eq!(table.modification_for(&f).unwrap().strength, 0.5);
    }

    #[test]
    fn test_river_uses_path_or_centerline() {
        let table = FeatureProfileTable::with_defaults();
        let mut river = feature("river", NormRect::new(0.0, 0.4, 1.0, 0.2));
        let m = table.modification_for(&river).unwrap();
        assert_eq!(m.control_points, vec![Vec2::new(0.0, 0.5), Vec2::new(1.0, 0.5)]);

        river.path = vec![Vec2::new(0.1, 0.1), Vec2::new(0.5, 0.6), Vec2::new(0.9, 0.2)];
        let m = table.modification_for(&river).unwrap();
        assert_eq!(m.control_points.len(), 3);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_modifications_skip_unknown_and_invalid() {
        let features = vec![
            feature("hill", NormRect::new(0.1, 0.1, 0.2, 0.2)),
            feature("volcano", NormRect::new(0.5, 0.5, 0.2, 0.2)),
            feature("plateau", NormRect::new(0.5, 0.5, 0.0, 0.2)),
            feature("hill", NormRect::new(0.6, 0.6, 0.2, 0.2)),
        ];
        let mods = modifications_from_features(&features, &FeatureProfileTable::with_defaults());
        assert_eq!(mods.len(), 2);
        assert_ne!(mods[0].noise.seed, mods[1].noise.seed);
    }

    #[test]
    fn test_requests_from_objects() {
        let objects = vec![MapObject {
            object_type: "house".into(),
            description: "small red house".into(),
            bounds: NormRect::new(0.4, 0.2, 0.02, 0.04),
            rotation_y: 45.0,
            confidence: 0.8,
            group_id: Some(2),
        }];
        let requests = requests_from_objects(&objects, Vec2::new(1000.0, 500.0), 100.0);
        let r = &requests[0];
        assert!((r.desired_position - Vec2::new(410.0, 110.0)).length() < 1e-3);
        assert!((r.bounds.half_extents - Vec3::new(10.0, 10.0, 10.0)).length() < 1e-3);
        assert_eq!(r.desired_rotation_y, 45.0);
        assert_eq!(r.group_id, Some(2));
    }

    #[test]
    fn test_object_height_capped() {
        let objects = vec![MapObject {
            object_type: "castle".into(),
            bounds: NormRect::new(0.0, 0.0, 0.5, 0.5),
            ..Default::default()
        }];
        let requests = requests_from_objects(&objects, Vec2::splat(100.0), 40.0);
        assert_eq!(requests[0].bounds.half_extents.y, 10.0);
    }

    #[test]
    fn test_results_json() {
        let json = r#"{
            "features": [{"label": "lake", "bounds": {"x": 0.1, "y": 0.1, "width": 0.2, "height": 0.2}, "confidence": 0.9}],
            "objects": [{"object_type": "tree", "bounds": {"x": 0.5, "y": 0.5, "width": 0.01, "height": 0.01}}]
        }"#;
        let results = AnalysisResults::from_json_str(json).unwrap();
        assert_eq!(results.features.len(), 1);
        assert_eq!(results.objects[0].confidence, 1.0);
    }
}
