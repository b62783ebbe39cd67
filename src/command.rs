//! # Command Router
//!
//! Translates parsed intents from the external language layer into store
//! patches (or a question dispatch). The closed intent set mirrors the
//! interface contract: `add_object`, `move_object`, `remove_object`,
//! `query`. Batches validate completely before the first patch applies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Node, NodeId, RelKind, Relation, Vec3};
use crate::orchestrator::Orchestrator;
use crate::qa::{Answer, QuestionDispatcher};
use crate::store::{Event, NodeUpdate, Patch, SceneStore};
use crate::{Error, Result};

/// Default edge length for objects created without an explicit pose/size.
const DEFAULT_SIZE: f64 = 0.3;

/// A parsed user intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    AddObject {
        /// Class tag of the new object(s).
        #[serde(rename = "type")]
        cls: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<NodeId>,
        /// Placement relation toward `target` (`on_top_of`, `near`,
        /// `beside`, `in`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quantity: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pose: Option<Vec3>,
        /// Axis-aligned size (w, d, h); a small default box otherwise.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<Vec3>,
    },
    MoveObject {
        id: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_pos: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relative_to: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<Vec3>,
    },
    RemoveObject {
        id: NodeId,
    },
    Query {
        question: String,
    },
}

/// What an applied intent produced.
#[derive(Debug, Clone)]
pub enum IntentOutcome {
    /// Mutation committed; the created ids are listed for `add_object`.
    Applied {
        events: Vec<Event>,
        created: Vec<NodeId>,
    },
    /// A question, answered.
    Answered(Answer),
}

pub struct CommandRouter;

impl CommandRouter {
    pub fn new() -> Self {
        Self
    }

    /// Applies a single intent.
    pub fn apply(
        &self,
        orchestrator: &mut Orchestrator,
        store: &SceneStore,
        dispatcher: &QuestionDispatcher,
        intent: &Intent,
    ) -> Result<IntentOutcome> {
        self.validate(store, intent, &[])?;
        self.execute(orchestrator, store, dispatcher, intent)
    }

    /// Applies a batch atomically: every intent validates against the
    /// store (plus the batch's own additions) before the first one runs.
    pub fn apply_batch(
        &self,
        orchestrator: &mut Orchestrator,
        store: &SceneStore,
        dispatcher: &QuestionDispatcher,
        intents: &[Intent],
    ) -> Result<Vec<IntentOutcome>> {
        let mut staged: Vec<NodeId> = Vec::new();
        for intent in intents {
            self.validate(store, intent, &staged)?;
            if let Intent::AddObject { cls, quantity, .. } = intent {
                let n = quantity.unwrap_or(1) as usize;
                // Reserve the ids this add will mint so later intents in
                // the batch can reference them.
                staged.extend(mint_ids(store, cls, n, &staged));
            }
            if let Intent::RemoveObject { id } = intent {
                staged.retain(|s| s != id);
            }
        }
        intents
            .iter()
            .map(|intent| self.execute(orchestrator, store, dispatcher, intent))
            .collect()
    }

    fn validate(&self, store: &SceneStore, intent: &Intent, staged: &[NodeId]) -> Result<()> {
        let known = |id: &NodeId| store.contains_node(id) || staged.contains(id);
        match intent {
            Intent::AddObject { cls, target, relation, quantity, size, .. } => {
                if cls.is_empty() {
                    return Err(Error::BadIntent("add_object: empty type".into()));
                }
                if quantity == &Some(0) {
                    return Err(Error::BadIntent("add_object: quantity must be at least 1".into()));
                }
                if let Some(size) = size {
                    if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) {
                        return Err(Error::BadIntent("add_object: size components must be > 0".into()));
                    }
                }
                if let Some(rel) = relation {
                    let placeable = matches!(
                        RelKind::from(rel.clone()),
                        RelKind::OnTopOf | RelKind::Near | RelKind::Beside | RelKind::In
                    );
                    if !placeable {
                        return Err(Error::BadIntent(format!(
                            "add_object: cannot place via relation '{rel}'"
                        )));
                    }
                    let Some(target) = target else {
                        return Err(Error::BadIntent(
                            "add_object: relation given without a target".into(),
                        ));
                    };
                    if !known(target) {
                        return Err(Error::NotFound(format!("node {target}")));
                    }
                }
                Ok(())
            }
            Intent::MoveObject { id, new_pos, relative_to, offset } => {
                if !known(id) {
                    return Err(Error::NotFound(format!("node {id}")));
                }
                match (new_pos, relative_to) {
                    (Some(_), _) => Ok(()),
                    (None, Some(anchor)) => {
                        if !known(anchor) {
                            return Err(Error::NotFound(format!("node {anchor}")));
                        }
                        if offset.is_none() {
                            return Err(Error::BadIntent(
                                "move_object: relative_to requires an offset".into(),
                            ));
                        }
                        Ok(())
                    }
                    (None, None) => Err(Error::BadIntent(
                        "move_object: needs new_pos or relative_to".into(),
                    )),
                }
            }
            Intent::RemoveObject { id } => {
                if !known(id) {
                    return Err(Error::NotFound(format!("node {id}")));
                }
                Ok(())
            }
            Intent::Query { question } => {
                if question.trim().is_empty() {
                    return Err(Error::BadIntent("query: empty question".into()));
                }
                Ok(())
            }
        }
    }

    fn execute(
        &self,
        orchestrator: &mut Orchestrator,
        store: &SceneStore,
        dispatcher: &QuestionDispatcher,
        intent: &Intent,
    ) -> Result<IntentOutcome> {
        match intent {
            Intent::AddObject { cls, target, relation, quantity, pose, size } => {
                let count = quantity.unwrap_or(1) as usize;
                let ids = mint_ids(store, cls, count, &[]);
                let snap = store.snapshot();
                let anchor = target.as_ref().and_then(|t| snap.node(t)).cloned();
                let extent = size.unwrap_or(Vec3::new(DEFAULT_SIZE, DEFAULT_SIZE, DEFAULT_SIZE));
                let mut nodes = Vec::with_capacity(count);
                let mut relations = Vec::new();

                for (i, id) in ids.iter().enumerate() {
                    let mut node =
                        Node::new(id.as_str(), cls.clone()).sized(extent.x, extent.y, extent.z);
                    node.pos = placement(pose, relation.as_deref(), anchor.as_ref(), &snap, &node, i);
                    if let (Some(anchor), Some(rel)) = (&anchor, relation.as_deref()) {
                        match RelKind::from(rel.to_owned()) {
                            RelKind::In => {
                                relations.push(Relation::new(RelKind::In, id.as_str(), anchor.id.as_str(), 1.0));
                            }
                            // Proximity/resting placements let the agents
                            // negotiate the edge on the next tick.
                            _ => {}
                        }
                    }
                    nodes.push(node);
                }

                debug!(%cls, count, "add_object");
                let events = orchestrator.commit_external("command", move |stamp| {
                    let mut patch = Patch::new(stamp);
                    patch.add_nodes = nodes;
                    patch.add_relations = relations;
                    patch
                })?;
                Ok(IntentOutcome::Applied { events, created: ids })
            }
            Intent::MoveObject { id, new_pos, relative_to, offset } => {
                let destination = match (new_pos, relative_to) {
                    (Some(pos), _) => *pos,
                    (None, Some(anchor)) => {
                        let base = store.get_node(anchor)?;
                        let off = offset.unwrap_or(Vec3::ZERO);
                        base.pos.add(&off)
                    }
                    (None, None) => {
                        return Err(Error::BadIntent(
                            "move_object: needs new_pos or relative_to".into(),
                        ));
                    }
                };
                debug!(%id, "move_object");
                let id = id.clone();
                let events = orchestrator.commit_external("command", move |stamp| {
                    Patch::new(stamp).update_node(id, NodeUpdate::move_to(destination))
                })?;
                Ok(IntentOutcome::Applied { events, created: vec![] })
            }
            Intent::RemoveObject { id } => {
                debug!(%id, "remove_object");
                let events = orchestrator.remove_external("command", id)?;
                Ok(IntentOutcome::Applied { events, created: vec![] })
            }
            Intent::Query { question } => {
                let answer =
                    dispatcher.answer(question, &store.snapshot(), orchestrator.support());
                Ok(IntentOutcome::Answered(answer))
            }
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic fresh ids: `{cls}_{n}` for the lowest free `n`s.
fn mint_ids(store: &SceneStore, cls: &str, count: usize, staged: &[NodeId]) -> Vec<NodeId> {
    let mut ids = Vec::with_capacity(count);
    let mut n = 1;
    while ids.len() < count {
        let candidate = NodeId::new(format!("{cls}_{n}"));
        if !store.contains_node(&candidate)
            && !staged.contains(&candidate)
            && !ids.contains(&candidate)
        {
            ids.push(candidate);
        }
        n += 1;
    }
    ids
}

/// Where a new object lands: explicit pose wins, then the placement
/// relation toward the anchor, then the scene origin at floor height.
fn placement(
    pose: &Option<Vec3>,
    relation: Option<&str>,
    anchor: Option<&Node>,
    snap: &crate::store::StoreSnapshot,
    node: &Node,
    index: usize,
) -> Vec3 {
    if let Some(pose) = pose {
        // Stack copies along +x so quantity > 1 never overlaps.
        return Vec3::new(pose.x + index as f64 * node.size.x * 1.5, pose.y, pose.z);
    }
    let floor = snap.floor_z();
    let spread = index as f64 * node.size.x * 1.5;
    match (relation.map(|r| RelKind::from(r.to_owned())), anchor) {
        (Some(RelKind::OnTopOf), Some(anchor)) => Vec3::new(
            anchor.pos.x + spread,
            anchor.pos.y,
            anchor.top() + node.size.z / 2.0,
        ),
        (Some(RelKind::Near | RelKind::Beside), Some(anchor)) => Vec3::new(
            anchor.pos.x + 0.6 + spread,
            anchor.pos.y,
            floor + node.size.z / 2.0,
        ),
        (Some(RelKind::In), Some(anchor)) => {
            Vec3::new(anchor.pos.x + spread, anchor.pos.y, floor + node.size.z / 2.0)
        }
        _ => Vec3::new(spread, 0.0, floor + node.size.z / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_wire_format() {
        let intent: Intent = serde_json::from_str(
            r#"{"intent": "add_object", "type": "cup", "target": "table_1", "relation": "on_top_of"}"#,
        )
        .unwrap();
        let Intent::AddObject { cls, target, relation, .. } = intent else {
            panic!("wrong variant");
        };
        assert_eq!(cls, "cup");
        assert_eq!(target.unwrap().as_str(), "table_1");
        assert_eq!(relation.as_deref(), Some("on_top_of"));
    }

    #[test]
    fn test_move_intent_round_trip() {
        let intent = Intent::MoveObject {
            id: NodeId::new("chair_12"),
            new_pos: Some(Vec3::new(2.9, 1.0, 0.45)),
            relative_to: None,
            offset: None,
        };
        let json = serde_json::to_string(&intent).unwrap();
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intent);
    }
}
