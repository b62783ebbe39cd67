//! # Scene Graph Store
//!
//! The store is the only mutable shared resource of the core. It owns all
//! node and relation records plus the append-only event log, guarded by a
//! single `parking_lot::RwLock` — readers (`snapshot`, `neighbors`, Q&A)
//! run concurrently, every write funnels through [`SceneStore::apply_patch`].
//!
//! ## Semantics
//!
//! - **Atomic patches**: validation happens before any mutation; a failed
//!   patch leaves the store untouched.
//! - **Last-writer-wins**: every patch carries a `(timestamp, origin)`
//!   stamp; node fields and relation records keep the lexicographically
//!   greatest stamp ever committed.
//! - **Event sourcing**: each committed patch appends one event; derived
//!   indices (support, clusters, accessibility) are caches rebuilt from
//!   the store, never mutated directly.

pub mod event;
pub mod patch;

use std::collections::BTreeMap;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::model::{Node, NodeId, RelKey, Relation};
use crate::{Error, Result};

pub use event::{Event, EventKind};
pub use patch::{FieldKey, NodeUpdate, Patch, Stamp};

/// Origin tag used by bootstrap commits.
pub const ORIGIN_BOOTSTRAP: &str = "bootstrap";

// ============================================================================
// SceneStore
// ============================================================================

/// Owner of all scene graph state.
pub struct SceneStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    nodes: HashMap<NodeId, Node>,
    relations: HashMap<RelKey, Relation>,
    /// node id → keys of relations where the node is an endpoint.
    adjacency: HashMap<NodeId, Vec<RelKey>>,
    /// Per-field LWW clocks.
    clocks: HashMap<(NodeId, FieldKey), Stamp>,
    events: Vec<Event>,
}

/// Deep, immutable copy of the graph for export, simulation and Q&A.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub nodes: BTreeMap<NodeId, Node>,
    pub relations: BTreeMap<RelKey, Relation>,
}

impl StoreSnapshot {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Relations where `id` is either endpoint, key-sorted.
    pub fn relations_of(&self, id: &NodeId) -> Vec<&Relation> {
        self.relations
            .values()
            .filter(|r| &r.a == id || &r.b == id)
            .collect()
    }

    /// Minimum bottom face across all rooms — the floor level. Falls back
    /// to 0 when the scene has no rooms.
    pub fn floor_z(&self) -> f64 {
        let lowest = self
            .nodes
            .values()
            .filter(|n| n.is_room())
            .map(|n| n.bottom())
            .fold(f64::INFINITY, f64::min);
        if lowest.is_finite() { lowest } else { 0.0 }
    }
}

impl SceneStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    // ========================================================================
    // Bootstrap
    // ========================================================================

    /// Atomically populates an empty store and emits a single `bootstrap`
    /// event. Fails with `BadBootstrap` on duplicate ids, invalid node
    /// records, or relations referencing unknown nodes.
    pub fn load_bootstrap(&self, nodes: Vec<Node>, relations: Vec<Relation>) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.nodes.is_empty() {
            return Err(Error::BadBootstrap("store already bootstrapped".into()));
        }

        let mut staged_nodes: HashMap<NodeId, Node> = HashMap::with_capacity(nodes.len());
        for mut node in nodes {
            node.validate().map_err(Error::BadBootstrap)?;
            // Orientation arrives unnormalized from JSON; fix it up once here.
            node.ori = node
                .ori
                .normalized()
                .ok_or_else(|| Error::BadBootstrap(format!("node {}: bad quaternion", node.id)))?;
            if staged_nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(Error::BadBootstrap(format!("duplicate node id {}", node.id)));
            }
        }

        let mut staged_rels: HashMap<RelKey, Relation> = HashMap::with_capacity(relations.len());
        for mut rel in relations {
            if !staged_nodes.contains_key(&rel.a) || !staged_nodes.contains_key(&rel.b) {
                return Err(Error::BadBootstrap(format!(
                    "relation {} references a missing node",
                    rel.key()
                )));
            }
            if rel.a == rel.b {
                return Err(Error::BadBootstrap(format!("self-relation {}", rel.key())));
            }
            rel.stamp = Stamp::new(0, ORIGIN_BOOTSTRAP);
            staged_rels.insert(rel.key(), rel);
        }

        let node_count = staged_nodes.len() as u64;
        let rel_count = staged_rels.len() as u64;

        inner.nodes = staged_nodes;
        for key in staged_rels.keys() {
            inner.adjacency.entry(key.a.clone()).or_default().push(key.clone());
            inner.adjacency.entry(key.b.clone()).or_default().push(key.clone());
        }
        inner.relations = staged_rels;

        let seq = inner.events.len() as u64;
        inner.events.push(Event {
            seq,
            stamp: Stamp::new(0, ORIGIN_BOOTSTRAP),
            kind: EventKind::Bootstrap {
                nodes: node_count,
                relations: rel_count,
            },
        });

        info!(nodes = node_count, relations = rel_count, "scene bootstrapped");
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_node(&self, id: &NodeId) -> Result<Node> {
        self.inner
            .read()
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("node {id}")))
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.inner.read().nodes.contains_key(id)
    }

    /// All nodes within ground-plane radius `r` of `id`, excluding `id`
    /// itself, sorted by node id. Perception is a floor-plan notion: a cup
    /// on a high shelf still neighbors the table below it.
    pub fn neighbors(&self, id: &NodeId, r: f64) -> Result<Vec<Node>> {
        let inner = self.inner.read();
        let origin = inner
            .nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        let mut result: Vec<Node> = inner
            .nodes
            .values()
            .filter(|n| n.id != *id && n.pos.dist_xy(&origin.pos) <= r)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    /// Relations whose subject (`a` endpoint) is `id`, key-sorted.
    pub fn relations_from(&self, id: &NodeId) -> Vec<Relation> {
        let inner = self.inner.read();
        let mut rels: Vec<Relation> = inner
            .adjacency
            .get(id)
            .map(|keys| {
                keys.iter()
                    .filter(|k| &k.a == id)
                    .filter_map(|k| inner.relations.get(k).cloned())
                    .collect()
            })
            .unwrap_or_default();
        rels.sort_by(|x, y| x.key().cmp(&y.key()));
        rels
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn relation_count(&self) -> usize {
        self.inner.read().relations.len()
    }

    /// Deep copy of the graph.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        StoreSnapshot {
            nodes: inner.nodes.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            relations: inner
                .relations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// The full event log (clone).
    pub fn event_log(&self) -> Vec<Event> {
        self.inner.read().events.clone()
    }

    /// Events appended at or after `seq`.
    pub fn events_since(&self, seq: u64) -> Vec<Event> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.seq >= seq)
            .cloned()
            .collect()
    }

    pub fn event_count(&self) -> u64 {
        self.inner.read().events.len() as u64
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Applies a patch atomically. On success the appended event is
    /// returned; on failure the store is unchanged.
    pub fn apply_patch(&self, patch: &Patch) -> Result<Event> {
        let mut inner = self.inner.write();
        Self::apply_locked(&mut inner, patch)
    }

    /// Like [`apply_patch`](Self::apply_patch) but gives up with
    /// `Error::Timeout` when the write lock cannot be acquired within
    /// `deadline` (external callers racing the tick loop).
    pub fn apply_patch_within(&self, patch: &Patch, deadline: Duration) -> Result<Event> {
        let mut inner = self
            .inner
            .try_write_for(deadline)
            .ok_or_else(|| Error::Timeout(format!("write lock not acquired in {deadline:?}")))?;
        Self::apply_locked(&mut inner, patch)
    }

    /// Appends a warning/timing event outside the patch path.
    pub fn append_event(&self, stamp: Stamp, kind: EventKind) -> Event {
        let mut inner = self.inner.write();
        let seq = inner.events.len() as u64;
        let event = Event { seq, stamp, kind };
        inner.events.push(event.clone());
        event
    }

    fn apply_locked(inner: &mut StoreInner, patch: &Patch) -> Result<Event> {
        // ------------------------------------------------------------------
        // Validate everything before touching state.
        // ------------------------------------------------------------------
        for node in &patch.add_nodes {
            node.validate().map_err(Error::BadIntent)?;
        }
        for id in patch.update_nodes.keys() {
            let exists = inner.nodes.contains_key(id)
                || patch.add_nodes.iter().any(|n| &n.id == id);
            if !exists {
                return Err(Error::NotFound(format!("node {id}")));
            }
        }
        for id in &patch.remove_nodes {
            if !inner.nodes.contains_key(id) {
                return Err(Error::NotFound(format!("node {id}")));
            }
        }
        for rel in &patch.add_relations {
            if rel.a == rel.b {
                return Err(Error::DanglingRef(format!("self-relation {}", rel.key())));
            }
            if !(0.0..=1.0).contains(&rel.conf) {
                return Err(Error::BadIntent(format!(
                    "relation {}: confidence {} outside [0, 1]",
                    rel.key(),
                    rel.conf
                )));
            }
            for end in [&rel.a, &rel.b] {
                let exists = inner.nodes.contains_key(end)
                    || patch.add_nodes.iter().any(|n| &n.id == end);
                if !exists {
                    return Err(Error::DanglingRef(format!(
                        "relation {} references missing node {end}",
                        rel.key()
                    )));
                }
            }
        }

        // ------------------------------------------------------------------
        // Commit, in the contract order: add nodes → update nodes →
        // add relations → remove relations → remove nodes → event.
        // ------------------------------------------------------------------
        let stamp = &patch.stamp;
        let mut added_nodes: Vec<NodeId> = Vec::new();
        let mut updated_nodes: Vec<NodeId> = Vec::new();
        let mut added_relations: Vec<RelKey> = Vec::new();
        let mut removed_relations: Vec<RelKey> = Vec::new();
        let mut removed_nodes: Vec<NodeId> = Vec::new();

        for node in &patch.add_nodes {
            let mut node = node.clone();
            // Safe: validated above.
            node.ori = node.ori.normalized().unwrap_or_default();
            let id = node.id.clone();
            let record_clock = (id.clone(), FieldKey::Record);
            if inner.nodes.contains_key(&id) {
                // Re-add of an existing id is a whole-record LWW replace.
                let newer = inner
                    .clocks
                    .get(&record_clock)
                    .map_or(true, |seen| *stamp > *seen);
                if !newer {
                    continue;
                }
                inner.clocks.retain(|(nid, _), _| *nid != id);
            }
            inner.clocks.insert(record_clock, stamp.clone());
            inner.nodes.insert(id.clone(), node);
            inner.adjacency.entry(id.clone()).or_default();
            added_nodes.push(id);
        }

        for (id, update) in &patch.update_nodes {
            let mut touched = false;
            for field in update.touched_fields() {
                let clock_key = (id.clone(), field.clone());
                let newer = inner
                    .clocks
                    .get(&clock_key)
                    .map_or(true, |seen| *stamp > *seen);
                if !newer {
                    continue;
                }
                let node = match inner.nodes.get_mut(id) {
                    Some(n) => n,
                    None => continue,
                };
                match &field {
                    FieldKey::Name => node.name = update.name.clone().unwrap_or_default(),
                    FieldKey::Pos => node.pos = update.pos.unwrap_or(node.pos),
                    FieldKey::Ori => {
                        if let Some(ori) = update.ori.and_then(|q| q.normalized()) {
                            node.ori = ori;
                        }
                    }
                    FieldKey::Size => {
                        if let Some(size) = update.size {
                            if size.x > 0.0 && size.y > 0.0 && size.z > 0.0 {
                                node.size = size;
                            }
                        }
                    }
                    FieldKey::Conf => {
                        if let Some(conf) = update.conf {
                            node.conf = conf.clamp(0.0, 1.0);
                        }
                    }
                    FieldKey::Lom => node.lom = update.lom.unwrap_or(node.lom),
                    FieldKey::Affordances => {
                        if let Some(aff) = &update.affordances {
                            node.affordances = aff.clone();
                        }
                    }
                    FieldKey::State(key) => {
                        if let Some(v) = update.state.get(key) {
                            node.state.insert(key.clone(), v.clone());
                        }
                    }
                    FieldKey::Meta(key) => {
                        if let Some(v) = update.meta.get(key) {
                            node.meta.insert(key.clone(), v.clone());
                        }
                    }
                    FieldKey::Record => {}
                }
                inner.clocks.insert(clock_key, stamp.clone());
                touched = true;
            }
            if touched {
                updated_nodes.push(id.clone());
            }
        }

        for rel in &patch.add_relations {
            let key = rel.key();
            let newer = inner
                .relations
                .get(&key)
                .map_or(true, |stored| *stamp >= stored.stamp);
            if !newer {
                continue;
            }
            let mut rel = rel.clone();
            rel.conf = rel.conf.clamp(0.0, 1.0);
            rel.stamp = stamp.clone();
            if inner.relations.insert(key.clone(), rel).is_none() {
                inner.adjacency.entry(key.a.clone()).or_default().push(key.clone());
                inner.adjacency.entry(key.b.clone()).or_default().push(key.clone());
            }
            added_relations.push(key);
        }

        for key in &patch.remove_relations {
            let effective = inner
                .relations
                .get(key)
                .is_some_and(|stored| *stamp >= stored.stamp);
            if effective {
                inner.relations.remove(key);
                Self::unlink(&mut inner.adjacency, key);
                removed_relations.push(key.clone());
            }
        }

        for id in &patch.remove_nodes {
            if inner.nodes.remove(id).is_none() {
                continue;
            }
            let incident = inner.adjacency.remove(id).unwrap_or_default();
            for key in incident {
                if inner.relations.remove(&key).is_some() {
                    Self::unlink(&mut inner.adjacency, &key);
                    removed_relations.push(key);
                }
            }
            inner.clocks.retain(|(nid, _), _| nid != id);
            removed_nodes.push(id.clone());
        }

        added_nodes.sort();
        updated_nodes.sort();
        added_relations.sort();
        removed_relations.sort();
        removed_relations.dedup();
        removed_nodes.sort();

        let seq = inner.events.len() as u64;
        let event = Event {
            seq,
            stamp: stamp.clone(),
            kind: EventKind::Patch {
                added_nodes,
                updated_nodes,
                added_relations,
                removed_relations,
                removed_nodes,
            },
        };
        inner.events.push(event.clone());
        debug!(seq, stamp = %stamp, "patch committed");
        Ok(event)
    }

    fn unlink(adjacency: &mut HashMap<NodeId, Vec<RelKey>>, key: &RelKey) {
        for end in [&key.a, &key.b] {
            if let Some(keys) = adjacency.get_mut(end) {
                keys.retain(|k| k != key);
            }
        }
    }
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mobility, RelKind, Vec3};

    fn store_with(nodes: Vec<Node>, relations: Vec<Relation>) -> SceneStore {
        let store = SceneStore::new();
        store.load_bootstrap(nodes, relations).unwrap();
        store
    }

    fn table() -> Node {
        Node::new("table_1", "table")
            .at(1.5, 1.5, 0.75)
            .sized(1.2, 0.8, 0.75)
            .with_affordance("support")
            .with_lom(Mobility::Low)
    }

    fn cup() -> Node {
        Node::new("cup_1", "cup").at(1.5, 1.5, 1.2).sized(0.08, 0.08, 0.1)
    }

    #[test]
    fn test_bootstrap_rejects_dangling_relation() {
        let store = SceneStore::new();
        let err = store
            .load_bootstrap(
                vec![table()],
                vec![Relation::new(RelKind::Near, "table_1", "ghost", 0.9)],
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadBootstrap(_)));
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_patch_is_atomic_on_failure() {
        let store = store_with(vec![table()], vec![]);
        let patch = Patch::new(Stamp::new(1, "t"))
            .add_node(cup())
            .add_relation(Relation::new(RelKind::OnTopOf, "cup_1", "missing", 0.9));
        let err = store.apply_patch(&patch).unwrap_err();
        assert!(matches!(err, Error::DanglingRef(_)));
        // The cup add must not have leaked.
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.event_count(), 1); // bootstrap only
    }

    #[test]
    fn test_lww_field_update() {
        let store = store_with(vec![table()], vec![]);
        let newer = Patch::new(Stamp::new(5, "b"))
            .update_node("table_1", NodeUpdate::move_to(Vec3::new(2.5, 1.5, 0.75)));
        let older = Patch::new(Stamp::new(3, "a"))
            .update_node("table_1", NodeUpdate::move_to(Vec3::new(9.0, 9.0, 9.0)));
        store.apply_patch(&newer).unwrap();
        store.apply_patch(&older).unwrap();
        let node = store.get_node(&NodeId::new("table_1")).unwrap();
        assert_eq!(node.pos, Vec3::new(2.5, 1.5, 0.75));
    }

    #[test]
    fn test_lww_origin_breaks_ties() {
        let store = store_with(vec![table()], vec![]);
        let a = Patch::new(Stamp::new(5, "alpha"))
            .update_node("table_1", NodeUpdate::move_to(Vec3::new(1.0, 0.0, 0.75)));
        let b = Patch::new(Stamp::new(5, "beta"))
            .update_node("table_1", NodeUpdate::move_to(Vec3::new(2.0, 0.0, 0.75)));
        store.apply_patch(&a).unwrap();
        store.apply_patch(&b).unwrap();
        // "beta" > "alpha" lexicographically, so beta's write stands, and a
        // replay in the opposite order converges to the same value.
        let node = store.get_node(&NodeId::new("table_1")).unwrap();
        assert_eq!(node.pos, Vec3::new(2.0, 0.0, 0.75));
    }

    #[test]
    fn test_relation_remove_requires_newer_stamp() {
        let store = store_with(vec![table(), cup()], vec![]);
        let add = Patch::new(Stamp::new(4, "agent"))
            .add_relation(Relation::new(RelKind::Near, "cup_1", "table_1", 0.8));
        store.apply_patch(&add).unwrap();

        let stale = Patch::new(Stamp::new(2, "late"))
            .remove_relation(RelKey::new(RelKind::Near, "cup_1", "table_1"));
        store.apply_patch(&stale).unwrap();
        assert_eq!(store.relation_count(), 1);

        let fresh = Patch::new(Stamp::new(6, "agent"))
            .remove_relation(RelKey::new(RelKind::Near, "cup_1", "table_1"));
        store.apply_patch(&fresh).unwrap();
        assert_eq!(store.relation_count(), 0);
    }

    #[test]
    fn test_remove_node_drops_incident_relations() {
        let store = store_with(vec![table(), cup()], vec![]);
        store
            .apply_patch(
                &Patch::new(Stamp::new(1, "agent"))
                    .add_relation(Relation::new(RelKind::OnTopOf, "cup_1", "table_1", 0.9))
                    .add_relation(Relation::new(RelKind::Supports, "table_1", "cup_1", 0.9)),
            )
            .unwrap();
        store
            .apply_patch(&Patch::new(Stamp::new(2, "command")).remove_node("table_1"))
            .unwrap();
        assert_eq!(store.relation_count(), 0);
        assert!(store.get_node(&NodeId::new("table_1")).is_err());
        assert!(store.get_node(&NodeId::new("cup_1")).is_ok());
    }

    #[test]
    fn test_neighbors_excludes_self_and_far() {
        let chair = Node::new("chair_12", "chair").at(0.9, 1.6, 0.45).sized(0.5, 0.5, 0.9);
        let stove = Node::new("stove", "stove")
            .at(3.5, 1.0, 0.45)
            .sized(0.6, 0.6, 0.9)
            .with_lom(Mobility::Fixed);
        let store = store_with(vec![table(), chair, stove], vec![]);
        let hits = store.neighbors(&NodeId::new("table_1"), 1.5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["chair_12"]);
    }

    #[test]
    fn test_update_missing_node_is_not_found() {
        let store = store_with(vec![table()], vec![]);
        let patch = Patch::new(Stamp::new(1, "x"))
            .update_node("ghost", NodeUpdate::move_to(Vec3::ZERO));
        assert!(matches!(store.apply_patch(&patch), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let store = store_with(vec![table()], vec![]);
        let snap = store.snapshot();
        store
            .apply_patch(
                &Patch::new(Stamp::new(1, "x"))
                    .update_node("table_1", NodeUpdate::move_to(Vec3::new(9.0, 9.0, 0.75))),
            )
            .unwrap();
        assert_eq!(snap.nodes[&NodeId::new("table_1")].pos, Vec3::new(1.5, 1.5, 0.75));
    }
}
