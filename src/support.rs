//! # Support System
//!
//! Derived indices over the resting relations: who supports whom, who
//! depends on whom, and everything computed from that — cascade moves,
//! stability risk, accessibility scores, and removal consequences.
//!
//! The indices are caches: they are rebuilt from the committed relation
//! set after every event that touches nodes or resting relations, under
//! the same lock discipline as the commit that triggered them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Mobility, Node, NodeId, RelKey, RelKind, Vec3};
use crate::store::{NodeUpdate, Patch, Stamp, StoreSnapshot};
use crate::topo::{self, TopoParams};

/// Origin tag carried by cascade follow-up patches.
pub const ORIGIN_CASCADE: &str = "support-cascade";

/// Neighbor radius for the blocked-approach test.
const R_ACC: f64 = 0.6;
/// Support chains longer than this are flagged high risk.
const TAU_CHAIN: usize = 3;

// ============================================================================
// Reports
// ============================================================================

/// Per-node accessibility verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessReport {
    pub score: f64,
    pub category: AccessCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessCategory {
    Reachable,
    Limited,
    Blocked,
}

impl AccessCategory {
    fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            AccessCategory::Reachable
        } else if score <= 0.3 {
            AccessCategory::Blocked
        } else {
            AccessCategory::Limited
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessCategory::Reachable => "reachable",
            AccessCategory::Limited => "limited",
            AccessCategory::Blocked => "blocked",
        }
    }
}

/// Per-node stability verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub chain_depth: usize,
    pub ground_stable: bool,
    pub risk: StabilityRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityRisk {
    Low,
    Medium,
    High,
}

impl StabilityRisk {
    fn from_depth(depth: usize) -> Self {
        if depth > TAU_CHAIN {
            StabilityRisk::High
        } else if depth >= 2 {
            StabilityRisk::Medium
        } else {
            StabilityRisk::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StabilityRisk::Low => "low",
            StabilityRisk::Medium => "medium",
            StabilityRisk::High => "high",
        }
    }
}

/// Consequences of removing a node, either simulated (what-if) or applied.
#[derive(Debug, Clone, Default)]
pub struct RemovalPlan {
    /// Direct dependents that keep their place (`lom = fixed`), paired
    /// with the supporter they lost.
    pub lost_support: Vec<(NodeId, NodeId)>,
    /// Dependents that drop, with their new z. Includes stacked objects
    /// riding their supporter down.
    pub fallen: Vec<(NodeId, f64)>,
    /// Of the fallen, those that went all the way to the room floor.
    pub to_floor: Vec<NodeId>,
    /// Relation keys that vanish with the node.
    pub vanished: Vec<RelKey>,
    /// Follow-up patch settling the dependents (empty when nothing moves).
    pub settle: Option<Patch>,
    /// Dependents whose re-settling failed.
    pub unresolved: Vec<(NodeId, String)>,
}

// ============================================================================
// SupportSystem
// ============================================================================

/// The two derived indices plus everything computed from them.
#[derive(Debug, Default)]
pub struct SupportSystem {
    /// Unique supporter per supported node.
    supported_by: BTreeMap<NodeId, NodeId>,
    /// Inverse: supporter → direct dependents.
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl SupportSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds both indices from the committed relation set.
    ///
    /// When several `on_top_of` records name different supporters for one
    /// node, the highest confidence wins; ties break toward the lower
    /// supporter id.
    pub fn rebuild(&mut self, snap: &StoreSnapshot) {
        self.supported_by.clear();
        self.dependents.clear();

        let mut best: BTreeMap<NodeId, (f64, NodeId)> = BTreeMap::new();
        for rel in snap.relations.values() {
            if rel.kind != RelKind::OnTopOf {
                continue;
            }
            if !snap.nodes.contains_key(&rel.a) || !snap.nodes.contains_key(&rel.b) {
                continue;
            }
            let replace = match best.get(&rel.a) {
                None => true,
                Some((conf, supporter)) => {
                    rel.conf > *conf || (rel.conf == *conf && rel.b < *supporter)
                }
            };
            if replace {
                best.insert(rel.a.clone(), (rel.conf, rel.b.clone()));
            }
        }

        for (node, (_, supporter)) in best {
            // A cycle through supported_by would make chain walks diverge;
            // drop the closing edge deterministically.
            if self.would_cycle(&node, &supporter) {
                warn!(node = %node, supporter = %supporter, "support cycle dropped");
                continue;
            }
            self.supported_by.insert(node.clone(), supporter.clone());
            self.dependents.entry(supporter).or_default().insert(node);
        }
        debug!(supported = self.supported_by.len(), "support indices rebuilt");
    }

    fn would_cycle(&self, node: &NodeId, supporter: &NodeId) -> bool {
        let mut cursor = Some(supporter.clone());
        while let Some(current) = cursor {
            if &current == node {
                return true;
            }
            cursor = self.supported_by.get(&current).cloned();
        }
        false
    }

    pub fn supporter_of(&self, id: &NodeId) -> Option<&NodeId> {
        self.supported_by.get(id)
    }

    pub fn supported_by(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.supported_by
    }

    pub fn dependents(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.dependents
    }

    pub fn dependents_of(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }

    /// Transitive closure of `dependents_of`, breadth-first, id-ordered.
    pub fn recursive_dependents(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = self.dependents_of(id).into_iter().collect();
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            queue.extend(self.dependents_of(&next));
        }
        seen
    }

    /// Steps from `id` to the end of its support chain.
    pub fn chain_depth(&self, id: &NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.supported_by.get(id);
        while let Some(next) = cursor {
            depth += 1;
            cursor = self.supported_by.get(next);
            if depth > self.supported_by.len() {
                break; // defensive, rebuild() keeps the graph acyclic
            }
        }
        depth
    }

    /// Ground-stable: `lom = fixed`, or resting on a ground-stable node,
    /// or resting on nothing at all (the floor holds it).
    pub fn ground_stable(&self, id: &NodeId, snap: &StoreSnapshot) -> bool {
        let mut cursor = id.clone();
        loop {
            let Some(node) = snap.node(&cursor) else {
                return false;
            };
            if node.lom == Mobility::Fixed {
                return true;
            }
            match self.supported_by.get(&cursor) {
                Some(supporter) => cursor = supporter.clone(),
                None => return true,
            }
        }
    }

    pub fn stability_report(&self, id: &NodeId, snap: &StoreSnapshot) -> StabilityReport {
        let depth = self.chain_depth(id);
        StabilityReport {
            chain_depth: depth,
            ground_stable: self.ground_stable(id, snap),
            risk: StabilityRisk::from_depth(depth),
        }
    }

    // ========================================================================
    // Accessibility
    // ========================================================================

    /// Accessibility scores for every non-room node.
    ///
    /// `score = 0.5·mobility + 0.3·(1 − blocked) + 0.2·(1 − depth/3)` where
    /// `blocked` is the fraction of close neighbors whose box crosses the
    /// straight-line approach from the nominal viewer pose (the containing
    /// room's center) at the node's height.
    pub fn accessibility(&self, snap: &StoreSnapshot) -> BTreeMap<NodeId, AccessReport> {
        let mut out = BTreeMap::new();
        for node in snap.nodes.values() {
            if node.is_room() {
                continue;
            }
            let viewer = viewer_pose(node, snap);
            let neighbors: Vec<&Node> = snap
                .nodes
                .values()
                .filter(|n| !n.is_room() && n.id != node.id && n.pos.dist_xy(&node.pos) <= R_ACC)
                .collect();
            let blocked_fraction = if neighbors.is_empty() {
                0.0
            } else {
                let blocking = neighbors
                    .iter()
                    .filter(|n| blocks_approach(n, node, &viewer))
                    .count();
                blocking as f64 / neighbors.len() as f64
            };
            let depth_penalty = (self.chain_depth(&node.id) as f64 / 3.0).min(1.0);
            let score = 0.5 * node.lom.factor()
                + 0.3 * (1.0 - blocked_fraction)
                + 0.2 * (1.0 - depth_penalty);
            out.insert(
                node.id.clone(),
                AccessReport {
                    score,
                    category: AccessCategory::from_score(score),
                },
            );
        }
        out
    }

    // ========================================================================
    // Cascade moves
    // ========================================================================

    /// Builds the follow-up patch for a committed update patch: every
    /// recursive dependent of a moved node shifts by the same delta,
    /// preserving relative offsets.
    ///
    /// Must be called with the node positions as they were *before* the
    /// trigger patch applied (pass the pre-commit snapshot). Cascade
    /// patches themselves never re-trigger.
    pub fn plan_cascade(
        &self,
        before: &StoreSnapshot,
        trigger: &Patch,
        cascade_rotation: bool,
    ) -> (Option<Patch>, Vec<(NodeId, String)>) {
        if trigger.stamp.origin == ORIGIN_CASCADE {
            return (None, Vec::new());
        }

        let mut moves: BTreeMap<NodeId, Vec3> = BTreeMap::new();
        let mut warnings: Vec<(NodeId, String)> = Vec::new();

        for (id, update) in &trigger.update_nodes {
            if update.ori.is_some() && cascade_rotation && !self.dependents_of(id).is_empty() {
                warnings.push((
                    id.clone(),
                    "rotation cascade not supported; dependents keep world orientation".into(),
                ));
            }
            let Some(new_pos) = update.pos else { continue };
            let Some(old) = before.node(id) else { continue };
            let delta = new_pos.sub(&old.pos);
            if delta.x == 0.0 && delta.y == 0.0 && delta.z == 0.0 {
                continue;
            }
            for dependent in self.recursive_dependents(id) {
                // The trigger may move a stack member explicitly; its own
                // write wins over the cascade.
                if trigger.update_nodes.contains_key(&dependent) {
                    continue;
                }
                moves
                    .entry(dependent)
                    .and_modify(|d| *d = d.add(&delta))
                    .or_insert(delta);
            }
        }

        if moves.is_empty() {
            return (None, warnings);
        }

        let mut patch = Patch::new(trigger.stamp.successor(ORIGIN_CASCADE));
        for (id, delta) in moves {
            let Some(node) = before.node(&id) else { continue };
            patch
                .update_nodes
                .insert(id, NodeUpdate::move_to(node.pos.add(&delta)));
        }
        debug!(moved = patch.update_nodes.len(), "support cascade planned");
        (Some(patch), warnings)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Computes the consequences of removing `id` against `snap`, without
    /// mutating anything. The same plan backs the live removal path and
    /// the what-if simulation.
    pub fn plan_removal(
        &self,
        snap: &StoreSnapshot,
        id: &NodeId,
        params: &TopoParams,
        stamp: &Stamp,
    ) -> RemovalPlan {
        let mut plan = RemovalPlan::default();

        plan.vanished = snap
            .relations_of(id)
            .into_iter()
            .map(|r| r.key())
            .collect();
        plan.vanished.sort();

        let floor = snap.floor_z();
        let mut settle = Patch::new(stamp.successor(ORIGIN_CASCADE));
        let removed: BTreeSet<&NodeId> = std::iter::once(id).collect();

        for dependent in self.dependents_of(id) {
            let Some(node) = snap.node(&dependent) else { continue };
            if node.lom == Mobility::Fixed {
                plan.lost_support.push((dependent.clone(), id.clone()));
                continue;
            }
            match self.settle_target(snap, node, &removed, params, floor) {
                Ok(new_z) => {
                    let drop = new_z - node.pos.z;
                    if drop.abs() > 1e-9 {
                        let new_pos = Vec3::new(node.pos.x, node.pos.y, new_z);
                        settle
                            .update_nodes
                            .insert(dependent.clone(), NodeUpdate::move_to(new_pos));
                        // The stack above rides down by the same delta.
                        for rider in self.recursive_dependents(&dependent) {
                            if let Some(r) = snap.node(&rider) {
                                let pos = Vec3::new(r.pos.x, r.pos.y, r.pos.z + drop);
                                settle.update_nodes.insert(rider.clone(), NodeUpdate::move_to(pos));
                                plan.fallen.push((rider, r.pos.z + drop));
                            }
                        }
                    }
                    plan.fallen.push((dependent.clone(), new_z));
                    let floor_level = (new_z - node.size.z / 2.0 - floor).abs() < 1e-6;
                    if floor_level {
                        plan.to_floor.push(dependent.clone());
                    }
                }
                Err(reason) => plan.unresolved.push((dependent.clone(), reason)),
            }
        }

        plan.fallen.sort_by(|a, b| a.0.cmp(&b.0));
        plan.fallen.dedup_by(|a, b| a.0 == b.0);
        if !settle.update_nodes.is_empty() {
            plan.settle = Some(settle);
        }
        plan
    }

    /// The z the node's centroid lands on: the highest remaining
    /// ground-stable surface under its footprint, else the room floor.
    fn settle_target(
        &self,
        snap: &StoreSnapshot,
        node: &Node,
        removed: &BTreeSet<&NodeId>,
        params: &TopoParams,
        floor: f64,
    ) -> Result<f64, String> {
        let footprint = node.aabb().area_xy();
        if footprint <= 0.0 {
            return Err("degenerate footprint".into());
        }
        let mut best_top: Option<f64> = None;
        for other in snap.nodes.values() {
            if other.id == node.id || other.is_room() || removed.contains(&other.id) {
                continue;
            }
            if other.top() > node.bottom() + params.tau_contact {
                continue; // not below
            }
            let overlap = node.aabb().overlap_area_xy(&other.aabb());
            if overlap / footprint < 0.5 {
                continue;
            }
            let supportive = other.has_affordance("support")
                || matches!(other.lom, Mobility::Fixed | Mobility::Low);
            if !supportive || !self.ground_stable(&other.id, snap) {
                continue;
            }
            best_top = Some(best_top.map_or(other.top(), |t: f64| t.max(other.top())));
        }
        let surface = best_top.unwrap_or(floor);
        Ok(surface + node.size.z / 2.0)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Nominal viewer pose: center of the room containing the node's centroid
/// (lowest room id wins), else the center of the scene's overall AABB.
fn viewer_pose(node: &Node, snap: &StoreSnapshot) -> Vec3 {
    for room in snap.nodes.values().filter(|n| n.is_room()) {
        if topo::relate_in(node, room).is_some() {
            return room.pos;
        }
    }
    let mut bounds: Option<crate::model::Aabb> = None;
    for n in snap.nodes.values() {
        let aabb = n.aabb();
        bounds = Some(match bounds {
            Some(b) => b.union(&aabb),
            None => aabb,
        });
    }
    bounds.map_or(Vec3::ZERO, |b| b.center())
}

/// A neighbor blocks the approach when its box crosses the XY segment
/// from viewer to target and overlaps the target's vertical extent.
fn blocks_approach(neighbor: &Node, target: &Node, viewer: &Vec3) -> bool {
    let z_overlap = neighbor.bottom() <= target.top() && neighbor.top() >= target.bottom();
    z_overlap && neighbor.aabb().intersects_segment_xy(viewer, &target.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use crate::store::SceneStore;

    fn scene() -> (SceneStore, SupportSystem) {
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("kitchen", "room").at(2.5, 2.0, 1.25).sized(5.0, 4.0, 2.5),
                    Node::new("table_1", "table")
                        .at(1.5, 1.5, 0.75)
                        .sized(1.2, 0.8, 0.75)
                        .with_affordance("support")
                        .with_lom(Mobility::Low),
                    Node::new("cup_1", "cup").at(1.5, 1.5, 1.2).sized(0.08, 0.08, 0.1),
                    Node::new("book_1", "book")
                        .at(1.8, 1.4, 1.14)
                        .sized(0.2, 0.15, 0.03)
                        .with_affordance("support"),
                ],
                vec![
                    Relation::new(RelKind::OnTopOf, "cup_1", "table_1", 0.95),
                    Relation::new(RelKind::Supports, "table_1", "cup_1", 0.95),
                    Relation::new(RelKind::OnTopOf, "book_1", "table_1", 0.93),
                    Relation::new(RelKind::Supports, "table_1", "book_1", 0.93),
                ],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        support.rebuild(&store.snapshot());
        (store, support)
    }

    #[test]
    fn test_indices() {
        let (_, support) = scene();
        assert_eq!(
            support.supporter_of(&NodeId::new("cup_1")),
            Some(&NodeId::new("table_1"))
        );
        let deps = support.dependents_of(&NodeId::new("table_1"));
        assert_eq!(deps.len(), 2);
        assert!(support.supporter_of(&NodeId::new("table_1")).is_none());
    }

    #[test]
    fn test_supporter_tie_breaks_to_lower_id() {
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("shelf_a", "shelf")
                        .at(0.0, 0.0, 0.5)
                        .sized(1.0, 1.0, 1.0)
                        .with_affordance("support"),
                    Node::new("shelf_b", "shelf")
                        .at(0.0, 0.0, 0.5)
                        .sized(1.0, 1.0, 1.0)
                        .with_affordance("support"),
                    Node::new("box", "box").at(0.0, 0.0, 1.05).sized(0.3, 0.3, 0.1),
                ],
                vec![
                    Relation::new(RelKind::OnTopOf, "box", "shelf_b", 0.8),
                    Relation::new(RelKind::OnTopOf, "box", "shelf_a", 0.8),
                ],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        support.rebuild(&store.snapshot());
        assert_eq!(support.supporter_of(&NodeId::new("box")), Some(&NodeId::new("shelf_a")));
    }

    #[test]
    fn test_recursive_dependents_and_depth() {
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("table", "table")
                        .at(0.0, 0.0, 0.4)
                        .sized(1.0, 1.0, 0.8)
                        .with_affordance("support")
                        .with_lom(Mobility::Low),
                    Node::new("tray", "tray")
                        .at(0.0, 0.0, 0.825)
                        .sized(0.4, 0.4, 0.05)
                        .with_affordance("support"),
                    Node::new("cup", "cup").at(0.0, 0.0, 0.9).sized(0.08, 0.08, 0.1),
                ],
                vec![
                    Relation::new(RelKind::OnTopOf, "tray", "table", 0.9),
                    Relation::new(RelKind::OnTopOf, "cup", "tray", 0.9),
                ],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        support.rebuild(&store.snapshot());

        let all = support.recursive_dependents(&NodeId::new("table"));
        assert_eq!(all.len(), 2);
        assert_eq!(support.chain_depth(&NodeId::new("cup")), 2);
        assert_eq!(
            support.stability_report(&NodeId::new("cup"), &store.snapshot()).risk,
            StabilityRisk::Medium
        );
    }

    #[test]
    fn test_cascade_preserves_offsets() {
        let (store, support) = scene();
        let trigger = Patch::new(Stamp::new(10, "command"))
            .update_node("table_1", NodeUpdate::move_to(Vec3::new(2.5, 1.5, 0.75)));
        let before = store.snapshot();
        let (cascade, warnings) = support.plan_cascade(&before, &trigger, false);
        assert!(warnings.is_empty());
        let cascade = cascade.unwrap();
        assert_eq!(cascade.stamp.origin, ORIGIN_CASCADE);
        assert!(cascade.stamp.ts > trigger.stamp.ts);
        let cup = &cascade.update_nodes[&NodeId::new("cup_1")];
        assert_eq!(cup.pos.unwrap(), Vec3::new(2.5, 1.5, 1.2));
    }

    #[test]
    fn test_cascade_does_not_retrigger() {
        let (store, support) = scene();
        let trigger = Patch::new(Stamp::new(11, ORIGIN_CASCADE))
            .update_node("table_1", NodeUpdate::move_to(Vec3::new(9.0, 9.0, 0.75)));
        let (cascade, _) = support.plan_cascade(&store.snapshot(), &trigger, false);
        assert!(cascade.is_none());
    }

    #[test]
    fn test_removal_drops_dependents_to_floor() {
        let (store, support) = scene();
        let snap = store.snapshot();
        let plan = support.plan_removal(
            &snap,
            &NodeId::new("table_1"),
            &TopoParams::default(),
            &Stamp::new(20, "command"),
        );
        assert_eq!(plan.lost_support.len(), 0);
        assert_eq!(plan.fallen.len(), 2);
        assert_eq!(plan.to_floor.len(), 2);
        // Cup lands with its bottom on the floor.
        let (_, cup_z) = plan.fallen.iter().find(|(id, _)| id.as_str() == "cup_1").unwrap();
        assert!((cup_z - 0.05).abs() < 1e-9);
        assert_eq!(plan.vanished.len(), 4);
    }

    #[test]
    fn test_removal_keeps_fixed_dependents_in_place() {
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("pedestal", "pedestal")
                        .at(0.0, 0.0, 0.25)
                        .sized(0.5, 0.5, 0.5)
                        .with_affordance("support"),
                    Node::new("sensor", "sensor")
                        .at(0.0, 0.0, 0.55)
                        .sized(0.1, 0.1, 0.1)
                        .with_lom(Mobility::Fixed),
                ],
                vec![Relation::new(RelKind::OnTopOf, "sensor", "pedestal", 0.9)],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        support.rebuild(&store.snapshot());
        let plan = support.plan_removal(
            &store.snapshot(),
            &NodeId::new("pedestal"),
            &TopoParams::default(),
            &Stamp::new(5, "command"),
        );
        assert_eq!(plan.lost_support.len(), 1);
        assert!(plan.fallen.is_empty());
        assert!(plan.settle.is_none());
    }

    #[test]
    fn test_removal_settles_on_next_surface() {
        // Cup on a tray on a table: removing the tray drops the cup onto
        // the table, not the floor.
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("table", "table")
                        .at(0.0, 0.0, 0.4)
                        .sized(1.0, 1.0, 0.8)
                        .with_affordance("support")
                        .with_lom(Mobility::Low),
                    Node::new("tray", "tray")
                        .at(0.0, 0.0, 0.825)
                        .sized(0.4, 0.4, 0.05)
                        .with_affordance("support"),
                    Node::new("cup", "cup").at(0.0, 0.0, 0.9).sized(0.08, 0.08, 0.1),
                ],
                vec![
                    Relation::new(RelKind::OnTopOf, "tray", "table", 0.9),
                    Relation::new(RelKind::OnTopOf, "cup", "tray", 0.9),
                ],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        support.rebuild(&store.snapshot());
        let plan = support.plan_removal(
            &store.snapshot(),
            &NodeId::new("tray"),
            &TopoParams::default(),
            &Stamp::new(5, "command"),
        );
        let (_, cup_z) = plan.fallen.iter().find(|(id, _)| id.as_str() == "cup").unwrap();
        assert!((cup_z - 0.85).abs() < 1e-9); // table top 0.8 + half height
        assert!(plan.to_floor.is_empty());
    }

    #[test]
    fn test_accessibility_scenario() {
        // Table moved to (2.5, 1.5) with a cup riding on it.
        let store = SceneStore::new();
        store
            .load_bootstrap(
                vec![
                    Node::new("kitchen", "room").at(2.5, 2.0, 1.25).sized(5.0, 4.0, 2.5),
                    Node::new("table_1", "table")
                        .at(2.5, 1.5, 0.75)
                        .sized(1.2, 0.8, 0.75)
                        .with_affordance("support")
                        .with_lom(Mobility::Low),
                    Node::new("chair_12", "chair").at(2.9, 1.0, 0.45).sized(0.5, 0.5, 0.9),
                    Node::new("stove", "stove")
                        .at(3.5, 1.0, 0.45)
                        .sized(0.6, 0.6, 0.9)
                        .with_affordance("support")
                        .with_lom(Mobility::Fixed),
                    Node::new("cup_1", "cup").at(2.5, 1.5, 1.2).sized(0.08, 0.08, 0.1),
                ],
                vec![
                    Relation::new(RelKind::OnTopOf, "cup_1", "table_1", 0.95),
                    Relation::new(RelKind::Supports, "table_1", "cup_1", 0.95),
                ],
            )
            .unwrap();
        let mut support = SupportSystem::new();
        support.rebuild(&store.snapshot());
        let access = support.accessibility(&store.snapshot());

        assert_eq!(access[&NodeId::new("chair_12")].category, AccessCategory::Reachable);
        assert_eq!(access[&NodeId::new("cup_1")].category, AccessCategory::Reachable);
        assert_eq!(access[&NodeId::new("stove")].category, AccessCategory::Limited);
        assert!(access.values().all(|r| r.category != AccessCategory::Blocked));
    }
}
