//! # Agent Message Bus
//!
//! In-process reference transport: a map from receiver id to a FIFO of
//! messages. Within a sender-receiver pair delivery order equals send
//! order; across pairs, order follows the deterministic agent iteration
//! of the tick loop. Messages live only until the tick that drains them.

use std::collections::VecDeque;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{NodeId, Relation};

/// An agent-to-agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: NodeId,
    pub receiver: NodeId,
    /// Logical send time (tick index).
    pub ts: u64,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// The two A2A message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageBody {
    /// Offer a relation to the peer endpoint.
    RelationPropose {
        relation: Relation,
        /// Name of the predicate that produced the proposal.
        basis: String,
    },
    /// Verdict on a previously received proposal.
    RelationAck {
        relation: Relation,
        accepted: bool,
    },
}

/// Per-recipient FIFO inboxes.
#[derive(Default)]
pub struct AgentBus {
    queues: Mutex<HashMap<NodeId, VecDeque<Message>>>,
}

impl AgentBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a message for its receiver.
    pub fn send(&self, msg: Message) {
        self.queues
            .lock()
            .entry(msg.receiver.clone())
            .or_default()
            .push_back(msg);
    }

    /// Returns and clears the receiver's queue, in arrival order.
    pub fn drain(&self, id: &NodeId) -> Vec<Message> {
        self.queues
            .lock()
            .get_mut(id)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Messages currently queued across all receivers.
    pub fn pending(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    /// Drops queues of receivers that no longer exist.
    pub fn forget(&self, id: &NodeId) {
        self.queues.lock().remove(id);
    }
}
