//! Per-type placement rules
//!
//! Rules match object types by pattern. Every matching rule applies, so the
//! effective constraints for a type are the intersection of all matching
//! windows.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Result;

/// Match `value` against `pattern`, where a trailing `*` matches any suffix.
/// Comparison ignores ASCII case.
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => {
            value.len() >= prefix.len()
                && value.is_char_boundary(prefix.len())
                && value[..prefix.len()].eq_ignore_ascii_case(prefix)
        }
        None => value.eq_ignore_ascii_case(pattern),
    }
}

/// Water requirement for a rule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterProximity {
    #[default]
    Ignore,
    MustBeNear,
    MustNotBeNear,
}

/// Constraints for object types matching `type_pattern`.
///
/// A trailing `*` matches any suffix; matching ignores ASCII case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementRule {
    pub type_pattern: String,
    /// Degrees
    pub min_slope: f32,
    /// Degrees; None defers to the global limit
    pub max_slope: Option<f32>,
    /// 0..=1 across the terrain height range
    pub min_relative_height: f32,
    pub max_relative_height: f32,
    /// Minimum center distance to objects of the same type, world units
    pub min_spacing_same_type: f32,
    pub water_proximity: WaterProximity,
    /// World units
    pub water_proximity_distance: f32,
    pub ground_sink_fraction: Option<f32>,
}

impl Default for PlacementRule {
    fn default() -> Self {
        Self {
            type_pattern: "*".into(),
            min_slope: 0.0,
            max_slope: None,
            min_relative_height: 0.0,
            max_relative_height: 1.0,
            min_spacing_same_type: 0.0,
            water_proximity: WaterProximity::Ignore,
            water_proximity_distance: 0.0,
            ground_sink_fraction: None,
        }
    }
}

impl PlacementRule {
    pub fn new(type_pattern: impl Into<String>) -> Self {
        Self {
            type_pattern: type_pattern.into(),
            ..Default::default()
        }
    }

    pub fn with_slope(mut self, min: f32, max: f32) -> Self {
        self.min_slope = min;
        self.max_slope = Some(max);
        self
    }

    pub fn with_relative_height(mut self, min: f32, max: f32) -> Self {
        self.min_relative_height = min;
        self.max_relative_height = max;
        self
    }

    pub fn with_spacing(mut self, min_spacing_same_type: f32) -> Self {
        self.min_spacing_same_type = min_spacing_same_type;
        self
    }

    pub fn with_water(mut self, proximity: WaterProximity, distance: f32) -> Self {
        self.water_proximity = proximity;
        self.water_proximity_distance = distance;
        self
    }

    pub fn with_sink(mut self, fraction: f32) -> Self {
        self.ground_sink_fraction = Some(fraction);
        self
    }

    pub fn matches(&self, object_type: &str) -> bool {
        pattern_matches(&self.type_pattern, object_type)
    }
}

/// One water predicate carried into the effective constraints
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterConstraint {
    pub proximity: WaterProximity,
    pub distance: f32,
}

/// Combined constraints of every rule matching one object type
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveConstraints {
    pub min_slope: f32,
    /// Tightest rule maximum; None when no matching rule sets one
    pub max_slope: Option<f32>,
    pub min_relative_height: f32,
    pub max_relative_height: f32,
    pub min_spacing_same_type: f32,
    pub water: Vec<WaterConstraint>,
    /// From the first matching rule that sets one
    pub ground_sink_fraction: Option<f32>,
    pub rule_count: usize,
}

impl EffectiveConstraints {
    fn unconstrained() -> Self {
        Self {
            min_slope: 0.0,
            max_slope: None,
            min_relative_height: 0.0,
            max_relative_height: 1.0,
            min_spacing_same_type: 0.0,
            water: Vec::new(),
            ground_sink_fraction: None,
            rule_count: 0,
        }
    }

    fn intersect(&mut self, rule: &PlacementRule) {
        self.min_slope = self.min_slope.max(rule.min_slope);
        self.max_slope = match (self.max_slope, rule.max_slope) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.min_relative_height = self.min_relative_height.max(rule.min_relative_height);
        self.max_relative_height = self.max_relative_height.min(rule.max_relative_height);
        self.min_spacing_same_type = self.min_spacing_same_type.max(rule.min_spacing_same_type);
        if rule.water_proximity != WaterProximity::Ignore {
            self.water.push(WaterConstraint {
                proximity: rule.water_proximity,
                distance: rule.water_proximity_distance.max(0.0),
            });
        }
        if self.ground_sink_fraction.is_none() {
            self.ground_sink_fraction = rule.ground_sink_fraction;
        }
        self.rule_count += 1;
    }

    /// True when the windows leave no valid slope or height
    pub fn is_empty(&self) -> bool {
        self.min_slope > self.max_slope.unwrap_or(90.0) || self.min_relative_height > self.max_relative_height
    }
}

/// Ordered rule table
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<PlacementRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: Vec<PlacementRule>) -> Self {
        Self { rules }
    }

    /// Rules for the object types the map analysis usually reports
    pub fn with_defaults() -> Self {
        Self::from_rules(vec![
            PlacementRule::new("building*")
                .with_slope(0.0, 15.0)
                .with_sink(0.05)
                .with_water(WaterProximity::MustNotBeNear, 2.0),
            PlacementRule::new("house*")
                .with_slope(0.0, 15.0)
                .with_sink(0.05)
                .with_water(WaterProximity::MustNotBeNear, 2.0),
            PlacementRule::new("tower*").with_slope(0.0, 10.0).with_sink(0.05),
            PlacementRule::new("tree*")
                .with_slope(0.0, 35.0)
                .with_relative_height(0.0, 0.85)
                .with_sink(0.1),
            PlacementRule::new("bush*").with_slope(0.0, 40.0).with_sink(0.1),
            PlacementRule::new("rock*").with_slope(0.0, 60.0).with_sink(0.25),
            PlacementRule::new("dock*")
                .with_slope(0.0, 10.0)
                .with_water(WaterProximity::MustBeNear, 5.0),
            PlacementRule::new("pier*")
                .with_slope(0.0, 10.0)
                .with_water(WaterProximity::MustBeNear, 5.0),
            PlacementRule::new("windmill*").with_slope(0.0, 20.0).with_spacing(15.0),
        ])
    }

    pub fn push(&mut self, rule: PlacementRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[PlacementRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matching<'a>(&'a self, object_type: &'a str) -> impl Iterator<Item = &'a PlacementRule> + 'a {
        self.rules.iter().filter(move |r| r.matches(object_type))
    }

    /// Intersection of every rule matching `object_type`; `None` when nothing matches
    pub fn constraints_for(&self, object_type: &str) -> Option<EffectiveConstraints> {
        let mut constraints = EffectiveConstraints::unconstrained();
        for rule in self.matching(object_type) {
            constraints.intersect(rule);
        }
        (constraints.rule_count > 0).then_some(constraints)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let wildcard = PlacementRule::new("Tree*");
        assert!(wildcard.matches("tree"));
        assert!(wildcard.matches("tree_oak"));
        assert!(wildcard.matches("TREE_PINE"));
        assert!(!wildcard.matches("tre"));
        assert!(!wildcard.matches("shrub_tree"));

        let exact = PlacementRule::new("house");
        assert!(exact.matches("HOUSE"));
        assert!(!exact.matches("house_small"));

        assert!(PlacementRule::new("*").matches("anything"));
    }

    #[test]
    fn test_non_ascii_types_do_not_panic() {
        let rule = PlacementRule::new("ab*");
        assert!(!rule.matches("é"));
        assert!(!rule.matches("aé"));
    }

    #[test]
    fn test_constraints_intersect() {
        let rules = RuleSet::from_rules(vec![
            PlacementRule::new("tree*").with_slope(5.0, 40.0),
            PlacementRule::new("tree_pine").with_slope(10.0, 30.0).with_relative_height(0.2, 1.0),
            PlacementRule::new("rock*").with_slope(0.0, 5.0),
        ]);
        let c = rules.constraints_for("tree_pine").unwrap();
        assert_eq!(c.rule_count, 2);
        assert_eq!(c.min_slope, 10.0);
        assert_eq!(c.max_slope, Some(30.0));
        assert_eq!(c.min_relative_height, 0.2);
        assert!(!c.is_empty());

        let oak = rules.constraints_for("tree_oak").unwrap();
        assert_eq!(oak.min_slope, 5.0);
        assert_eq!(oak.max_slope, Some(40.0));

        assert!(rules.constraints_for("lamp").is_none());
    }

    #[test]
    fn test_disjoint_windows_are_empty() {
        let rules = RuleSet::from_rules(vec![
            PlacementRule::new("x*").with_slope(30.0, 90.0),
            PlacementRule::new("x").with_slope(0.0, 10.0),
        ]);
        assert!(rules.constraints_for("x").unwrap().is_empty());
    }

    #[test]
    fn test_first_sink_wins_and_water_accumulates() {
        let rules = RuleSet::from_rules(vec![
            PlacementRule::new("dock*").with_water(WaterProximity::MustBeNear, 5.0),
            PlacementRule::new("dock_big").with_sink(0.3),
            PlacementRule::new("dock*").with_sink(0.1).with_water(WaterProximity::MustNotBeNear, 0.5),
        ]);
        let c = rules.constraints_for("dock_big").unwrap();
        assert_eq!(c.ground_sink_fraction, Some(0.3));
        assert_eq!(c.water.len(), 2);
        assert_eq!(c.water[0].proximity, WaterProximity::MustBeNear);
    }

    #[test]
    fn test_defaults_cover_common_types() {
        let rules = RuleSet::with_defaults();
        assert!(rules.constraints_for("house").is_some());
        assert!(rules.constraints_for("tree_birch").is_some());
        assert_eq!(rules.constraints_for("rock").unwrap().ground_sink_fraction, Some(0.25));
    }

    #[test]
    fn test_json() {
        let rules = RuleSet::from_json_str(
            r#"[{"type_pattern": "lamp*", "max_slope": 5.0}, {"type_pattern": "well"}]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        let c = rules.constraints_for("lamp_post").unwrap();
        assert_eq!(c.max_slope, Some(5.0));
        assert_eq!(c.max_relative_height, 1.0);
        assert_eq!(rules.constraints_for("well").unwrap().max_slope, None);

        let json = serde_json::to_string(&rules).unwrap();
        assert_eq!(RuleSet::from_json_str(&json).unwrap(), rules);
    }
}
