//! Node (object or room) in the scene graph.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::geom::{Aabb, Quat, Vec3};
use super::{PropertyMap, Value};

/// Stable node identifier.
///
/// Ids arrive as strings from bootstrap JSON (`"table_1"`, `"kitchen"`) or
/// are minted by the command router. Ordered so agent iteration and
/// snapshot listings are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Coarse level-of-mobility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mobility {
    Fixed,
    Low,
    Medium,
    High,
}

impl Mobility {
    /// Mobility factor used by the accessibility score.
    pub fn factor(self) -> f64 {
        match self {
            Mobility::Fixed => 0.0,
            Mobility::Low => 0.25,
            Mobility::Medium => 0.6,
            Mobility::High => 1.0,
        }
    }
}

impl Default for Mobility {
    fn default() -> Self {
        Mobility::Medium
    }
}

/// A node in the scene graph — a physical object or a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Class tag (`table`, `cup`, `room`, …).
    pub cls: String,
    /// Position of the node's centroid in the shared frame.
    pub pos: Vec3,
    /// Orientation quaternion, normalized.
    pub ori: Quat,
    /// Axis-aligned size (w, d, h). All components > 0.
    pub size: Vec3,
    /// Affordance tags (`support`, `hold_liquid`, …).
    pub affordances: SmallVec<[String; 4]>,
    /// Level of mobility.
    pub lom: Mobility,
    /// Detection / existence confidence in [0, 1].
    pub conf: f64,
    /// Dynamic state map.
    pub state: PropertyMap,
    /// Static metadata (color, material, …).
    pub meta: PropertyMap,
}

impl Node {
    pub fn new(id: impl Into<String>, cls: impl Into<String>) -> Self {
        let id = NodeId::new(id);
        let name = id.0.clone();
        Self {
            id,
            name,
            cls: cls.into(),
            pos: Vec3::ZERO,
            ori: Quat::IDENTITY,
            size: Vec3::new(1.0, 1.0, 1.0),
            affordances: SmallVec::new(),
            lom: Mobility::default(),
            conf: 1.0,
            state: PropertyMap::new(),
            meta: PropertyMap::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64, z: f64) -> Self {
        self.pos = Vec3::new(x, y, z);
        self
    }

    pub fn sized(mut self, w: f64, d: f64, h: f64) -> Self {
        self.size = Vec3::new(w, d, h);
        self
    }

    pub fn with_affordance(mut self, tag: impl Into<String>) -> Self {
        self.affordances.push(tag.into());
        self
    }

    pub fn with_lom(mut self, lom: Mobility) -> Self {
        self.lom = lom;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn is_room(&self) -> bool {
        self.cls == "room"
    }

    pub fn has_affordance(&self, tag: &str) -> bool {
        self.affordances.iter().any(|a| a == tag)
    }

    /// World-space AABB derived from position and size.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center_size(&self.pos, &self.size)
    }

    /// Z of the bottom face.
    pub fn bottom(&self) -> f64 {
        self.pos.z - self.size.z / 2.0
    }

    /// Z of the top face.
    pub fn top(&self) -> f64 {
        self.pos.z + self.size.z / 2.0
    }

    /// Validates the node invariants: positive size, confidence range,
    /// finite pose, normalizable orientation.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.0.is_empty() {
            return Err("node id must be non-empty".into());
        }
        if !(self.size.x > 0.0 && self.size.y > 0.0 && self.size.z > 0.0) {
            return Err(format!("node {}: size components must be > 0", self.id));
        }
        if !(0.0..=1.0).contains(&self.conf) {
            return Err(format!("node {}: confidence {} outside [0, 1]", self.id, self.conf));
        }
        if !self.pos.is_finite() {
            return Err(format!("node {}: non-finite position", self.id));
        }
        if self.ori.normalized().is_none() {
            return Err(format!("node {}: degenerate orientation quaternion", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let n = Node::new("table_1", "table")
            .at(1.5, 1.5, 0.75)
            .sized(1.2, 0.8, 0.75)
            .with_affordance("support")
            .with_lom(Mobility::Low);
        assert_eq!(n.id.as_str(), "table_1");
        assert!(n.has_affordance("support"));
        assert!((n.top() - 1.125).abs() < 1e-9);
        assert!(n.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_size() {
        let mut n = Node::new("x", "cup");
        n.size = Vec3::new(0.0, 1.0, 1.0);
        assert!(n.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_conf() {
        let mut n = Node::new("x", "cup");
        n.conf = 1.5;
        assert!(n.validate().is_err());
    }
}
