use crate::domain::{EvidenceLog, OrderingStage, QuorumState, SignedMessage};
use parking_lot::{Mutex, RwLock};
use shared_types::{Hash, NodeId, Request};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// `(view, sequence)`
pub type SlotKey = (u64, u64);

/// Whether the replica is ordering requests or replacing its primary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Normal,
    ViewChanging { target: u64, started_at: u64 },
}

/// A request this replica is waiting to see delivered.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub request: Request,
    pub sequence: Option<u64>,
    pub first_seen: u64,
    /// The client talked to this replica; it owes the client failure notices.
    pub local_origin: bool,
}

/// View-level state, guarded by one lock.
#[derive(Debug)]
pub struct ReplicaState {
    pub view: u64,
    pub mode: Mode,
    pub next_sequence: u64,
    pub pending: HashMap<Hash, PendingRequest>,
    pub consecutive_view_changes: u32,
    pub new_view_sent: Option<u64>,
}

/// Encapsulates the mutable state of the consensus engine.
///
/// Lock order: `replica` -> `slots` -> individual slot -> `ordering` /
/// `view_changes`. `ordering` is also taken alone during delivery, and
/// nothing acquires `replica` while holding it.
pub struct ConsensusState {
    pub replica: RwLock<ReplicaState>,
    pub slots: RwLock<HashMap<SlotKey, Arc<Mutex<QuorumState>>>>,
    pub ordering: Mutex<OrderingStage>,
    /// Verified, signed ViewChange messages per target view and sender.
    pub view_changes: Mutex<BTreeMap<u64, BTreeMap<NodeId, SignedMessage>>>,
    pub future: Mutex<Vec<(NodeId, SignedMessage)>>,
    pub evidence: Mutex<EvidenceLog>,
    pub halted: AtomicBool,
}

impl ConsensusState {
    pub fn new(retain: usize) -> Self {
        Self {
            replica: RwLock::new(ReplicaState {
                view: 0,
                mode: Mode::Normal,
                next_sequence: 1,
                pending: HashMap::new(),
                consecutive_view_changes: 0,
                new_view_sent: None,
            }),
            slots: RwLock::new(HashMap::new()),
            ordering: Mutex::new(OrderingStage::new(0, retain)),
            view_changes: Mutex::new(BTreeMap::new()),
            future: Mutex::new(Vec::new()),
            evidence: Mutex::new(EvidenceLog::default()),
            halted: AtomicBool::new(false),
        }
    }

    /// Get or create the slot for `(view, sequence)`.
    pub fn slot(&self, view: u64, sequence: u64) -> Arc<Mutex<QuorumState>> {
        if let Some(slot) = self.slots.read().get(&(view, sequence)) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry((view, sequence))
                .or_insert_with(|| Arc::new(Mutex::new(QuorumState::new(view, sequence)))),
        )
    }

    pub fn existing_slots(&self) -> Vec<Arc<Mutex<QuorumState>>> {
        self.slots.read().values().cloned().collect()
    }

    pub fn last_delivered(&self) -> u64 {
        self.ordering.lock().last_delivered()
    }
}
