//! # Orchestrator
//!
//! Owns the tick loop and the only write path into the store. One tick:
//!
//! 1. Snapshot the agent set (nodes added mid-tick join next tick).
//! 2. Phase A for every agent in id order — pure reads, proposals onto
//!    the bus.
//! 3. Phase B in the same order — inbox handling, one patch per agent.
//! 4. Apply the patches one by one; each commit independently enforces
//!    LWW and may trail a support-cascade patch at a strictly later
//!    timestamp.
//! 5. Notify subscribers with the committed event batch.
//!
//! Timestamps are Lamport-style: the orchestrator's logical clock advances
//! by two per commit, leaving the odd slot for that commit's cascade.
//! Identical inputs therefore produce an identical event log.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::agent::Agent;
use crate::bus::AgentBus;
use crate::config::SceneConfig;
use crate::model::NodeId;
use crate::store::{Event, EventKind, Patch, SceneStore, Stamp};
use crate::support::{RemovalPlan, SupportSystem};
use crate::Result;

/// Observer of committed event batches (visualizers, external buses).
pub trait EventSink: Send + Sync {
    fn on_events(&self, events: &[Event]);
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub messages_sent: usize,
    pub patches_committed: usize,
    pub overran: bool,
}

pub struct Orchestrator {
    store: Arc<SceneStore>,
    bus: Arc<AgentBus>,
    config: Arc<SceneConfig>,
    agents: BTreeMap<NodeId, Agent>,
    support: SupportSystem,
    subscribers: Vec<Arc<dyn EventSink>>,
    tick: u64,
    /// Logical clock; stamps derive from it, never from wall time.
    lamport: u64,
}

impl Orchestrator {
    pub fn new(store: Arc<SceneStore>, bus: Arc<AgentBus>, config: Arc<SceneConfig>) -> Self {
        let mut orchestrator = Self {
            store,
            bus,
            config,
            agents: BTreeMap::new(),
            support: SupportSystem::new(),
            subscribers: Vec::new(),
            tick: 0,
            lamport: 0,
        };
        orchestrator.support.rebuild(&orchestrator.store.snapshot());
        orchestrator
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.subscribers.push(sink);
    }

    pub fn support(&self) -> &SupportSystem {
        &self.support
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    fn next_stamp(&mut self, origin: &str) -> Stamp {
        self.lamport += 2;
        Stamp::new(self.lamport, origin)
    }

    // ========================================================================
    // Tick loop
    // ========================================================================

    /// Advances the scene by one tick.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick += 1;
        let tick = self.tick;
        let started = Instant::now();
        self.sync_agents();

        let ids: Vec<NodeId> = self.agents.keys().cloned().collect();
        let mut report = TickReport { tick, ..TickReport::default() };
        let mut batch: Vec<Event> = Vec::new();

        // Phase A — perceive & propose (reads only).
        for id in &ids {
            if let Some(agent) = self.agents.get_mut(id) {
                report.messages_sent += agent.perceive(tick);
            }
        }

        // Phase B — inbox handling; one patch per agent, in agent order.
        let mut patches: Vec<Patch> = Vec::new();
        for id in &ids {
            let stamp = self.next_stamp(id.as_str());
            if let Some(agent) = self.agents.get_mut(id) {
                let patch = agent.process(tick, stamp);
                if !patch.is_empty() {
                    patches.push(patch);
                }
            }
        }

        // Commit — agent order, cascades trailing each trigger.
        for patch in &patches {
            match self.commit(patch) {
                Ok(events) => {
                    report.patches_committed += 1;
                    batch.extend(events);
                }
                // A patch invalidated by an earlier commit this tick (e.g.
                // its endpoint was removed) is dropped, not fatal.
                Err(err) => warn!(tick, %err, "agent patch rejected"),
            }
        }

        let elapsed = started.elapsed();
        if elapsed.as_millis() as u64 > self.config.tick_budget_ms {
            report.overran = true;
            let stamp = Stamp::new(self.lamport + 1, "orchestrator");
            batch.push(self.store.append_event(
                stamp,
                EventKind::TickOverrun { tick, budget_ms: self.config.tick_budget_ms },
            ));
            warn!(tick, ?elapsed, "tick overran its budget");
        }

        self.notify(&batch);
        debug!(
            tick,
            messages = report.messages_sent,
            patches = report.patches_committed,
            "tick complete"
        );
        Ok(report)
    }

    /// Registers agents for new negotiating nodes and retires agents whose
    /// node is gone.
    fn sync_agents(&mut self) {
        let snap = self.store.snapshot();
        self.agents.retain(|id, _| {
            let alive = snap.nodes.contains_key(id);
            if !alive {
                self.bus.forget(id);
            }
            alive
        });
        for node in snap.nodes.values() {
            if !self.config.negotiates(&node.cls) {
                continue;
            }
            if !self.agents.contains_key(&node.id) {
                self.agents.insert(
                    node.id.clone(),
                    Agent::new(
                        node.id.clone(),
                        node.cls.clone(),
                        self.store.clone(),
                        self.bus.clone(),
                        self.config.clone(),
                    ),
                );
            }
        }
    }

    // ========================================================================
    // Commit paths
    // ========================================================================

    /// Applies one patch plus its support cascade, rebuilding the indices
    /// when the commit touched them.
    fn commit(&mut self, patch: &Patch) -> Result<Vec<Event>> {
        let before = self.store.snapshot();
        let (cascade, rotation_warnings) =
            self.support
                .plan_cascade(&before, patch, self.config.cascade_rotation);

        let mut events = vec![self.store.apply_patch(patch)?];
        for (node, reason) in rotation_warnings {
            events.push(self.store.append_event(
                patch.stamp.clone(),
                EventKind::CascadeUnresolved { node, reason },
            ));
        }
        if let Some(cascade) = cascade {
            events.push(self.store.apply_patch(&cascade)?);
        }

        if events.iter().any(touches_support) {
            self.support.rebuild(&self.store.snapshot());
        }
        Ok(events)
    }

    /// Commit path for external writers (command router): allocates a
    /// stamp on the shared clock, applies, cascades, and notifies.
    pub fn commit_external(
        &mut self,
        origin: &str,
        build: impl FnOnce(Stamp) -> Patch,
    ) -> Result<Vec<Event>> {
        let stamp = self.next_stamp(origin);
        let patch = build(stamp);
        let events = self.commit(&patch)?;
        self.notify(&events);
        Ok(events)
    }

    /// Removes a node with full cascade semantics: incident relations
    /// vanish, fixed dependents stay with a `LostSupport` warning,
    /// everything else settles onto the next surface below.
    pub fn remove_external(&mut self, origin: &str, id: &NodeId) -> Result<Vec<Event>> {
        if !self.store.contains_node(id) {
            return Err(crate::Error::NotFound(format!("node {id}")));
        }
        let stamp = self.next_stamp(origin);
        let snap = self.store.snapshot();
        let plan: RemovalPlan =
            self.support
                .plan_removal(&snap, id, &self.config.topo_params(), &stamp);

        let mut events =
            vec![self.store.apply_patch(&Patch::new(stamp.clone()).remove_node(id.clone()))?];
        for (node, supporter) in &plan.lost_support {
            warn!(node = %node, supporter = %supporter, "support lost");
            events.push(self.store.append_event(
                stamp.clone(),
                EventKind::LostSupport { node: node.clone(), supporter: supporter.clone() },
            ));
        }
        for (node, reason) in &plan.unresolved {
            events.push(self.store.append_event(
                stamp.clone(),
                EventKind::CascadeUnresolved { node: node.clone(), reason: reason.clone() },
            ));
        }
        if let Some(settle) = &plan.settle {
            events.push(self.store.apply_patch(settle)?);
        }

        self.support.rebuild(&self.store.snapshot());
        self.notify(&events);
        Ok(events)
    }

    fn notify(&self, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        for sink in &self.subscribers {
            sink.on_events(events);
        }
    }
}

/// True when the event may have changed the support indices.
fn touches_support(event: &Event) -> bool {
    match &event.kind {
        EventKind::Patch {
            added_nodes,
            updated_nodes,
            added_relations,
            removed_relations,
            removed_nodes,
        } => {
            !added_nodes.is_empty()
                || !updated_nodes.is_empty()
                || !removed_nodes.is_empty()
                || added_relations.iter().any(|k| k.kind.is_resting())
                || removed_relations.iter().any(|k| k.kind.is_resting())
        }
        EventKind::Bootstrap { .. } => true,
        _ => false,
    }
}
