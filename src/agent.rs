//! # Agent Runtime
//!
//! Every negotiating node runs an agent identified by the node id. A turn
//! has two phases, driven by the orchestrator:
//!
//! 1. **Perceive & propose** — read own node, survey neighbors within the
//!    perception radius, send `RELATION_PROPOSE` for the winning candidate
//!    of each pair.
//! 2. **Handle inbox & emit patch** — drain proposals/acks, reply, and
//!    fold accepted relations plus contradiction removals into a single
//!    patch returned to the orchestrator.
//!
//! An agent never mutates the store directly; its turn is free of side
//! effects beyond bus messages and the returned patch.

use std::sync::Arc;

use tracing::trace;

use crate::bus::{AgentBus, Message, MessageBody};
use crate::config::SceneConfig;
use crate::model::{NodeId, RelKind};
use crate::store::{Patch, SceneStore, Stamp};
use crate::topo::{self, Candidate};

/// Predicate name recorded as the provenance basis of a proposal.
fn basis(kind: &RelKind) -> &'static str {
    match kind {
        RelKind::Near => "relate_near",
        RelKind::Far => "relate_far",
        RelKind::OnTopOf | RelKind::Supports => "relate_on_top",
        RelKind::Beside => "relate_beside",
        RelKind::Above | RelKind::Below => "relate_above",
        RelKind::In => "relate_in",
        RelKind::Custom(_) => "custom",
    }
}

/// A per-node negotiation agent.
pub struct Agent {
    pub id: NodeId,
    pub cls: String,
    store: Arc<SceneStore>,
    bus: Arc<AgentBus>,
    config: Arc<SceneConfig>,
    /// Winning candidate per surveyed neighbor, refreshed each Phase A.
    survey: Vec<(NodeId, Candidate)>,
}

impl Agent {
    pub fn new(
        id: NodeId,
        cls: String,
        store: Arc<SceneStore>,
        bus: Arc<AgentBus>,
        config: Arc<SceneConfig>,
    ) -> Self {
        Self {
            id,
            cls,
            store,
            bus,
            config,
            survey: Vec::new(),
        }
    }

    // ========================================================================
    // Phase A — perceive & propose
    // ========================================================================

    /// Surveys neighbors and sends proposals. Returns the number of
    /// proposals sent. A node removed mid-tick skips its turn.
    pub fn perceive(&mut self, tick: u64) -> usize {
        self.survey.clear();

        let Ok(me) = self.store.get_node(&self.id) else {
            return 0;
        };
        let radius = self.config.perception_radius_for(&self.cls);
        let Ok(neighbors) = self.store.neighbors(&self.id, radius) else {
            return 0;
        };

        let params = self.config.topo_params();
        let mut sent = 0;
        for neighbor in &neighbors {
            if !self.config.negotiates(&neighbor.cls) {
                continue;
            }
            let Some(candidate) = topo::survey_pair(&me, neighbor, &params) else {
                continue;
            };
            if candidate.conf >= self.config.tau_propose {
                self.bus.send(Message {
                    sender: self.id.clone(),
                    receiver: neighbor.id.clone(),
                    ts: tick,
                    body: MessageBody::RelationPropose {
                        relation: candidate.to_relation(),
                        basis: basis(&candidate.kind).to_owned(),
                    },
                });
                sent += 1;
            }
            self.survey.push((neighbor.id.clone(), candidate));
        }
        trace!(agent = %self.id, neighbors = neighbors.len(), sent, "phase A");
        sent
    }

    // ========================================================================
    // Phase B — handle inbox & emit patch
    // ========================================================================

    /// Drains the inbox, replies to proposals, and returns this turn's
    /// patch (possibly empty).
    pub fn process(&mut self, tick: u64, stamp: Stamp) -> Patch {
        let mut patch = Patch::new(stamp);

        for msg in self.bus.drain(&self.id) {
            match msg.body {
                MessageBody::RelationPropose { relation, .. } => {
                    let accepted = relation.conf >= self.config.tau_accept;
                    self.bus.send(Message {
                        sender: self.id.clone(),
                        receiver: msg.sender.clone(),
                        ts: tick,
                        body: MessageBody::RelationAck {
                            relation: relation.clone(),
                            accepted,
                        },
                    });
                    if accepted {
                        Self::push_relation(&mut patch, relation);
                    }
                }
                MessageBody::RelationAck { relation, accepted } => {
                    // Idempotent with the acceptor's own add.
                    if accepted {
                        Self::push_relation(&mut patch, relation);
                    }
                }
            }
        }

        self.sweep_contradicted(&mut patch);
        patch
    }

    fn push_relation(patch: &mut Patch, relation: crate::model::Relation) {
        if let Some(twin) = relation.twin() {
            patch.add_relations.push(twin);
        }
        patch.add_relations.push(relation);
    }

    /// Queues removals for held relations contradicted by this tick's
    /// survey: the same pair now reads as a different relation with
    /// confidence at or above the supersede threshold.
    fn sweep_contradicted(&self, patch: &mut Patch) {
        for (neighbor, candidate) in &self.survey {
            if candidate.conf < self.config.tau_supersede {
                continue;
            }
            for held in self.store.relations_from(&self.id) {
                if &held.b != neighbor {
                    continue;
                }
                // Containment comes from bootstrap/commands, not geometry
                // negotiation; proximity never supersedes it.
                if held.kind == RelKind::In || held.kind == candidate.kind {
                    continue;
                }
                let key = held.key();
                trace!(agent = %self.id, old = %key, new = %candidate.kind, "superseded");
                if let Some(twin) = key.twin() {
                    patch.remove_relations.push(twin);
                }
                patch.remove_relations.push(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mobility, Node, Relation};

    fn setup() -> (Arc<SceneStore>, Arc<AgentBus>, Arc<SceneConfig>) {
        let store = Arc::new(SceneStore::new());
        store
            .load_bootstrap(
                vec![
                    Node::new("table_1", "table")
                        .at(1.5, 1.5, 0.75)
                        .sized(1.2, 0.8, 0.75)
                        .with_affordance("support")
                        .with_lom(Mobility::Low),
                    Node::new("chair_12", "chair").at(0.9, 1.6, 0.45).sized(0.5, 0.5, 0.9),
                    Node::new("kitchen", "room").at(2.5, 2.0, 1.25).sized(5.0, 4.0, 2.5),
                ],
                vec![],
            )
            .unwrap();
        (store, Arc::new(AgentBus::new()), Arc::new(SceneConfig::default()))
    }

    fn agent(id: &str, cls: &str, s: &Arc<SceneStore>, b: &Arc<AgentBus>, c: &Arc<SceneConfig>) -> Agent {
        Agent::new(NodeId::new(id), cls.into(), s.clone(), b.clone(), c.clone())
    }

    #[test]
    fn test_perceive_proposes_to_neighbor_not_room() {
        let (store, bus, config) = setup();
        let mut chair = agent("chair_12", "chair", &store, &bus, &config);
        let sent = chair.perceive(1);
        assert_eq!(sent, 1);
        let inbox = bus.drain(&NodeId::new("table_1"));
        assert_eq!(inbox.len(), 1);
        let MessageBody::RelationPropose { relation, basis } = &inbox[0].body else {
            panic!("expected proposal");
        };
        assert_eq!(relation.kind, RelKind::Near);
        assert_eq!(basis, "relate_near");
        // No message to the room.
        assert!(bus.drain(&NodeId::new("kitchen")).is_empty());
    }

    #[test]
    fn test_zero_neighbors_means_silence_and_empty_patch() {
        let (store, bus, config) = setup();
        store
            .apply_patch(
                &Patch::new(Stamp::new(1, "test"))
                    .add_node(Node::new("lamp", "lamp").at(20.0, 20.0, 0.5).sized(0.2, 0.2, 1.0)),
            )
            .unwrap();
        let mut lamp = agent("lamp", "lamp", &store, &bus, &config);
        assert_eq!(lamp.perceive(1), 0);
        let patch = lamp.process(1, Stamp::new(2, "lamp"));
        assert!(patch.is_empty());
    }

    #[test]
    fn test_accept_adds_relation_and_twin() {
        let (store, bus, config) = setup();
        let mut table = agent("table_1", "table", &store, &bus, &config);
        bus.send(Message {
            sender: NodeId::new("chair_12"),
            receiver: NodeId::new("table_1"),
            ts: 1,
            body: MessageBody::RelationPropose {
                relation: Relation::new(RelKind::Near, "chair_12", "table_1", 0.73),
                basis: "relate_near".into(),
            },
        });
        let patch = table.process(1, Stamp::new(2, "table_1"));
        assert_eq!(patch.add_relations.len(), 1);
        assert_eq!(patch.add_relations[0].kind, RelKind::Near);
        // Ack went back to the proposer.
        let ack = bus.drain(&NodeId::new("chair_12"));
        assert_eq!(ack.len(), 1);
        assert!(matches!(
            ack[0].body,
            MessageBody::RelationAck { accepted: true, .. }
        ));
    }

    #[test]
    fn test_low_confidence_is_rejected() {
        let (store, bus, config) = setup();
        let mut table = agent("table_1", "table", &store, &bus, &config);
        bus.send(Message {
            sender: NodeId::new("chair_12"),
            receiver: NodeId::new("table_1"),
            ts: 1,
            body: MessageBody::RelationPropose {
                relation: Relation::new(RelKind::Near, "chair_12", "table_1", 0.4),
                basis: "relate_near".into(),
            },
        });
        let patch = table.process(1, Stamp::new(2, "table_1"));
        assert!(patch.add_relations.is_empty());
        let ack = bus.drain(&NodeId::new("chair_12"));
        assert!(matches!(
            ack[0].body,
            MessageBody::RelationAck { accepted: false, .. }
        ));
    }

    #[test]
    fn test_resting_proposal_carries_twin() {
        let (store, bus, config) = setup();
        let mut table = agent("table_1", "table", &store, &bus, &config);
        bus.send(Message {
            sender: NodeId::new("chair_12"),
            receiver: NodeId::new("table_1"),
            ts: 1,
            body: MessageBody::RelationPropose {
                relation: Relation::new(RelKind::OnTopOf, "chair_12", "table_1", 0.95),
                basis: "relate_on_top".into(),
            },
        });
        let patch = table.process(1, Stamp::new(2, "table_1"));
        let kinds: Vec<&RelKind> = patch.add_relations.iter().map(|r| &r.kind).collect();
        assert!(kinds.contains(&&RelKind::OnTopOf));
        assert!(kinds.contains(&&RelKind::Supports));
    }
}
