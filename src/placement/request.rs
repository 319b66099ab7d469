//! Placement requests, placed-object records and request grouping

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::Error;
use crate::core::types::{Quat, Result, Vec2, Vec3};

/// Axis-aligned object half-extents in world units (Y is up)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectBounds {
    pub half_extents: Vec3,
}

impl Default for ObjectBounds {
    fn default() -> Self {
        Self { half_extents: Vec3::splat(0.5) }
    }
}

impl ObjectBounds {
    pub fn new(half_extents: Vec3) -> Self {
        Self { half_extents }
    }

    /// Round footprint of `radius` and total `height`
    pub fn from_radius_height(radius: f32, height: f32) -> Self {
        Self { half_extents: Vec3::new(radius, height * 0.5, radius) }
    }

    /// Radius of the circle enclosing the XZ footprint axes
    pub fn footprint_radius(&self) -> f32 {
        self.half_extents.x.max(self.half_extents.z)
    }

    /// Full object height
    pub fn height(&self) -> f32 {
        self.half_extents.y * 2.0
    }

    /// XZ footprint area
    pub fn footprint_area(&self) -> f32 {
        4.0 * self.half_extents.x * self.half_extents.z
    }
}

/// One object the analysis wants placed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementRequest {
    /// Object type key, e.g. "house" or "tree_oak"
    pub object_type: String,
    /// Free-form description passed to the model provider
    pub description: String,
    /// Desired world XZ position
    pub desired_position: Vec2,
    /// Desired yaw, degrees
    pub desired_rotation_y: f32,
    pub desired_scale: f32,
    pub bounds: ObjectBounds,
    /// Detection confidence, 0..=1
    pub confidence: f32,
    pub group_id: Option<u32>,
}

impl Default for PlacementRequest {
    fn default() -> Self {
        Self {
            object_type: String::new(),
            description: String::new(),
            desired_position: Vec2::ZERO,
            desired_rotation_y: 0.0,
            desired_scale: 1.0,
            bounds: ObjectBounds::default(),
            confidence: 1.0,
            group_id: None,
        }
    }
}

impl PlacementRequest {
    pub fn new(object_type: impl Into<String>, desired_position: Vec2) -> Self {
        Self {
            object_type: object_type.into(),
            desired_position,
            ..Default::default()
        }
    }

    pub fn with_bounds(mut self, bounds: ObjectBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_group(mut self, group_id: u32) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.desired_rotation_y = degrees;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.desired_scale = scale;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reject requests that cannot be placed at all
    pub fn validate(&self) -> Result<()> {
        if self.object_type.trim().is_empty() {
            return Err(Error::InvalidInput("placement request has an empty object type".into()));
        }
        if !self.desired_position.is_finite() {
            return Err(Error::InvalidInput(format!(
                "'{}' has a non-finite position", self.object_type
            )));
        }
        if !(self.desired_scale > 0.0) || !self.desired_scale.is_finite() {
            return Err(Error::InvalidInput(format!(
                "'{}' has invalid scale {}", self.object_type, self.desired_scale
            )));
        }
        if !self.bounds.half_extents.is_finite() || self.bounds.half_extents.min_element() < 0.0 {
            return Err(Error::InvalidInput(format!(
                "'{}' has invalid bounds {:?}", self.object_type, self.bounds.half_extents
            )));
        }
        if !self.confidence.is_finite() {
            return Err(Error::InvalidInput(format!(
                "'{}' has non-finite confidence", self.object_type
            )));
        }
        Ok(())
    }

    /// Singleton priority: confidence × scaled footprint area
    pub fn priority(&self) -> f32 {
        let scale = self.desired_scale.max(0.0);
        self.confidence.clamp(0.0, 1.0) * self.bounds.footprint_area() * scale * scale
    }
}

/// A successfully placed object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacedObjectRecord {
    pub id: u64,
    pub object_type: String,
    pub world_position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    /// Half-extents after scaling
    pub bounds_extents: Vec3,
    pub confidence: f32,
    pub group_id: Option<u32>,
    /// Positions evaluated before this one was accepted
    pub attempts: u32,
    /// Unix time in milliseconds
    pub placed_at_ms: u64,
}

impl PlacedObjectRecord {
    pub fn footprint_radius(&self) -> f32 {
        self.bounds_extents.x.max(self.bounds_extents.z)
    }

    pub fn position_xz(&self) -> Vec2 {
        Vec2::new(self.world_position.x, self.world_position.z)
    }
}

/// Requests placed together: either sharing an explicit group id, or a singleton
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectGroup {
    pub group_id: Option<u32>,
    /// Type of the first member
    pub object_type: String,
    pub members: Vec<PlacementRequest>,
}

impl ObjectGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn average_confidence(&self) -> f32 {
        if self.members.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.members.iter().map(|r| r.confidence.clamp(0.0, 1.0)).sum();
        sum / self.members.len() as f32
    }

    /// Groups rank by size × average confidence; singletons by their own priority
    pub fn priority(&self) -> f32 {
        match (self.group_id, self.members.as_slice()) {
            (None, [single]) => single.priority(),
            _ => self.members.len() as f32 * self.average_confidence(),
        }
    }
}

/// Split requests into groups and order them by descending priority.
///
/// Group order is stable: equal priorities keep first-appearance order, and
/// members keep their input order within a group.
pub fn group_requests(requests: Vec<PlacementRequest>) -> Vec<ObjectGroup> {
    let mut groups: Vec<ObjectGroup> = Vec::new();
    let mut by_id: HashMap<u32, usize> = HashMap::new();

    for request in requests {
        match request.group_id {
            Some(id) => {
                let slot = *by_id.entry(id).or_insert_with(|| {
                    groups.push(ObjectGroup {
                        group_id: Some(id),
                        object_type: request.object_type.clone(),
                        members: Vec::new(),
                    });
                    groups.len() - 1
                });
                groups[slot].members.push(request);
            }
            None => groups.push(ObjectGroup {
                group_id: None,
                object_type: request.object_type.clone(),
                members: vec![request],
            }),
        }
    }

    groups.sort_by(|a, b| b.priority().total_cmp(&a.priority()));
    groups
}

/// Assign group ids to ungrouped requests of the same type lying within
/// `max_distance` of each other (single-link clustering).
///
/// Only clusters with at least two members receive an id; ids start at
/// `first_id`. Returns the number of groups formed.
pub fn group_by_similarity(requests: &mut [PlacementRequest], max_distance: f32, first_id: u32) -> u32 {
    let n = requests.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        if requests[i].group_id.is_some() {
            continue;
        }
        for j in (i + 1)..n {
            if requests[j].group_id.is_some() || requests[j].object_type != requests[i].object_type {
                continue;
            }
            if requests[i].desired_position.distance(requests[j].desired_position) <= max_distance {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for i in 0..n {
        if requests[i].group_id.is_none() {
            *sizes.entry(find(&mut parent, i)).or_default() += 1;
        }
    }

    let mut assigned: HashMap<usize, u32> = HashMap::new();
    let mut next_id = first_id;
    for i in 0..n {
        if requests[i].group_id.is_some() {
            continue;
        }
        let root = find(&mut parent, i);
        if sizes[&root] < 2 {
            continue;
        }
        let id = *assigned.entry(root).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        requests[i].group_id = Some(id);
    }

    next_id - first_id
}
