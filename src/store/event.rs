//! Event log records.
//!
//! Every committed patch appends exactly one event; warnings and timing
//! anomalies append their own. The log is append-only and is the source
//! of truth for replay and audit — derived indices are caches over it.

use serde::{Deserialize, Serialize};

use crate::model::{NodeId, RelKey};
use super::Stamp;

/// One entry in the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the log, starting at 0.
    pub seq: u64,
    pub stamp: Stamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// Initial atomic population of the store.
    Bootstrap {
        nodes: u64,
        relations: u64,
    },
    /// A committed patch, summarized with sorted id/key lists.
    Patch {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        added_nodes: Vec<NodeId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        updated_nodes: Vec<NodeId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        added_relations: Vec<RelKey>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed_relations: Vec<RelKey>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed_nodes: Vec<NodeId>,
    },
    /// The tick loop exceeded its wall-time budget; prepared patches were
    /// still committed.
    TickOverrun {
        tick: u64,
        budget_ms: u64,
    },
    /// A fixed node lost its supporter and was left in place.
    LostSupport {
        node: NodeId,
        supporter: NodeId,
    },
    /// A dependent could not be re-settled automatically.
    CascadeUnresolved {
        node: NodeId,
        reason: String,
    },
}

impl Event {
    /// True for the physical-consistency warnings that must surface in
    /// what-if answers.
    pub fn is_warning(&self) -> bool {
        matches!(
            self.kind,
            EventKind::LostSupport { .. } | EventKind::CascadeUnresolved { .. }
        )
    }
}
