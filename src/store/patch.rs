//! Patches — transactional deltas applied to the scene graph.
//!
//! A patch is a value: agents and the command router build them, the store
//! consumes them in commit order. Conflicts resolve last-writer-wins on the
//! patch stamp, per field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{Mobility, Node, NodeId, PropertyMap, Quat, RelKey, Relation, Value, Vec3};

/// Logical commit stamp: `(timestamp, origin)`.
///
/// Timestamps are logical (derived from the tick counter), never wall
/// clock — the event log must replay byte-identical. Ordering is
/// lexicographic: timestamp first, origin string breaks ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    pub ts: u64,
    pub origin: String,
}

impl Stamp {
    pub fn new(ts: u64, origin: impl Into<String>) -> Self {
        Self { ts, origin: origin.into() }
    }

    pub fn zero() -> Self {
        Self { ts: 0, origin: String::new() }
    }

    /// A stamp strictly later than `self`, attributed to `origin`.
    pub fn successor(&self, origin: impl Into<String>) -> Self {
        Self { ts: self.ts + 1, origin: origin.into() }
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.origin, self.ts)
    }
}

/// Per-field identity for LWW bookkeeping. State/meta entries are fields
/// of their own so independent writers merge instead of clobbering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Record,
    Name,
    Pos,
    Ori,
    Size,
    Conf,
    Lom,
    Affordances,
    State(String),
    Meta(String),
}

/// Partial update of a single node. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ori: Option<Quat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lom: Option<Mobility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affordances: Option<SmallVec<[String; 4]>>,
    /// State entries to merge (LWW per key).
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub state: PropertyMap,
    /// Metadata entries to merge (LWW per key).
    #[serde(default, skip_serializing_if = "PropertyMap::is_empty")]
    pub meta: PropertyMap,
}

impl NodeUpdate {
    pub fn move_to(pos: Vec3) -> Self {
        Self { pos: Some(pos), ..Self::default() }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Enumerates the fields this update touches.
    pub fn touched_fields(&self) -> Vec<FieldKey> {
        let mut fields = Vec::new();
        if self.name.is_some() { fields.push(FieldKey::Name); }
        if self.pos.is_some() { fields.push(FieldKey::Pos); }
        if self.ori.is_some() { fields.push(FieldKey::Ori); }
        if self.size.is_some() { fields.push(FieldKey::Size); }
        if self.conf.is_some() { fields.push(FieldKey::Conf); }
        if self.lom.is_some() { fields.push(FieldKey::Lom); }
        if self.affordances.is_some() { fields.push(FieldKey::Affordances); }
        for k in self.state.keys() { fields.push(FieldKey::State(k.clone())); }
        for k in self.meta.keys() { fields.push(FieldKey::Meta(k.clone())); }
        fields
    }
}

/// A transactional delta: nodes to add, per-node updates, relations to add,
/// relation keys and nodes to remove. Applied atomically by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub stamp: Stamp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub update_nodes: BTreeMap<NodeId, NodeUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_relations: Vec<Relation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_relations: Vec<RelKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_nodes: Vec<NodeId>,
}

impl Patch {
    pub fn new(stamp: Stamp) -> Self {
        Self {
            stamp,
            add_nodes: Vec::new(),
            update_nodes: BTreeMap::new(),
            add_relations: Vec::new(),
            remove_relations: Vec::new(),
            remove_nodes: Vec::new(),
        }
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.add_nodes.push(node);
        self
    }

    pub fn update_node(mut self, id: impl Into<NodeId>, update: NodeUpdate) -> Self {
        self.update_nodes.insert(id.into(), update);
        self
    }

    pub fn add_relation(mut self, rel: Relation) -> Self {
        self.add_relations.push(rel);
        self
    }

    pub fn remove_relation(mut self, key: RelKey) -> Self {
        self.remove_relations.push(key);
        self
    }

    pub fn remove_node(mut self, id: impl Into<NodeId>) -> Self {
        self.remove_nodes.push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_nodes.is_empty()
            && self.update_nodes.is_empty()
            && self.add_relations.is_empty()
            && self.remove_relations.is_empty()
            && self.remove_nodes.is_empty()
    }

    /// The inverse of a pure-translation patch, usable to undo a move.
    ///
    /// Only meaningful for patches that exclusively carry position updates;
    /// returns `None` otherwise.
    pub fn inverse_translation(&self, previous: &BTreeMap<NodeId, Vec3>) -> Option<Patch> {
        if !self.add_nodes.is_empty()
            || !self.add_relations.is_empty()
            || !self.remove_relations.is_empty()
            || !self.remove_nodes.is_empty()
        {
            return None;
        }
        let mut inverse = Patch::new(self.stamp.successor(self.stamp.origin.clone()));
        for (id, update) in &self.update_nodes {
            if update.pos.is_none() || !update.state.is_empty() || !update.meta.is_empty() {
                return None;
            }
            let prev = previous.get(id)?;
            inverse
                .update_nodes
                .insert(id.clone(), NodeUpdate::move_to(*prev));
        }
        Some(inverse)
    }
}
