//! Driving ports (Inbound API)

use crate::domain::{ByzantineEvidence, ConsensusResult, SignedMessage};
use shared_types::{NodeId, Request};

/// Snapshot of the engine for status queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusStatus {
    pub node_id: NodeId,
    pub view: u64,
    pub primary: NodeId,
    /// Target view while a view change is running.
    pub view_change_target: Option<u64>,
    pub last_delivered: u64,
    pub next_sequence: u64,
    pub pending_requests: usize,
    pub evidence_total: u64,
    pub halted: bool,
}

/// Consensus engine API.
///
/// All methods take `&self` and may be called concurrently from different
/// network tasks.
pub trait ConsensusApi: Send + Sync {
    /// Order a client request (primary only). Returns the assigned sequence.
    fn submit(&self, request: Request) -> ConsensusResult<u64>;

    /// Process a signed protocol message received from replica `from`.
    fn handle_message(&self, from: NodeId, message: SignedMessage) -> ConsensusResult<()>;

    /// A backup saw a client request and forwarded it; start its timer.
    fn observe_request(&self, request: &Request);

    /// Periodic timer: detects a stalled primary and stalled view changes.
    fn tick(&self) -> ConsensusResult<()>;

    fn status(&self) -> ConsensusStatus;

    fn evidence(&self) -> Vec<ByzantineEvidence>;
}
