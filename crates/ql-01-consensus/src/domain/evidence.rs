//! # Byzantine Evidence
//!
//! Protocol violations observed from peers. Evidence is recorded and
//! logged; it never changes slot state and never stops the node.

use super::messages::VotePhase;
use shared_types::{Hash, NodeId};
use std::collections::VecDeque;

/// Observed protocol violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ByzantineEvidence {
    /// Primary proposed two digests for one slot.
    ConflictingPrePrepare {
        primary: NodeId,
        view: u64,
        sequence: u64,
        first: Hash,
        second: Hash,
    },
    /// A replica voted two digests in one phase of one slot.
    Equivocation {
        sender: NodeId,
        phase: VotePhase,
        view: u64,
        sequence: u64,
        first: Hash,
        second: Hash,
    },
    /// A quorum formed for a digest other than the accepted one.
    ConflictingQuorum {
        view: u64,
        sequence: u64,
        accepted: Hash,
        quorum_digest: Hash,
    },
    /// PrePrepare digest does not match its payload.
    DigestMismatch {
        sender: NodeId,
        view: u64,
        sequence: u64,
        claimed: Hash,
        actual: Hash,
    },
    /// PrePrepare from a replica that is not primary of that view.
    UnauthorizedPrePrepare {
        sender: NodeId,
        view: u64,
        expected: NodeId,
    },
    /// ViewChange carrying a certificate that does not check out.
    InvalidViewChange {
        sender: NodeId,
        view: u64,
        reason: String,
    },
    /// NewView whose proposals do not follow from its view changes.
    InvalidNewView {
        sender: NodeId,
        view: u64,
        reason: String,
    },
}

impl ByzantineEvidence {
    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConflictingPrePrepare { .. } => "conflicting_pre_prepare",
            Self::Equivocation { .. } => "equivocation",
            Self::ConflictingQuorum { .. } => "conflicting_quorum",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::UnauthorizedPrePrepare { .. } => "unauthorized_pre_prepare",
            Self::InvalidViewChange { .. } => "invalid_view_change",
            Self::InvalidNewView { .. } => "invalid_new_view",
        }
    }

    /// Replica blamed, when one can be.
    pub fn offender(&self) -> Option<NodeId> {
        match self {
            Self::ConflictingPrePrepare { primary, .. } => Some(*primary),
            Self::Equivocation { sender, .. }
            | Self::DigestMismatch { sender, .. }
            | Self::UnauthorizedPrePrepare { sender, .. }
            | Self::InvalidViewChange { sender, .. }
            | Self::InvalidNewView { sender, .. } => Some(*sender),
            Self::ConflictingQuorum { .. } => None,
        }
    }
}

/// Bounded log of recent evidence plus a running total.
#[derive(Debug)]
pub struct EvidenceLog {
    entries: VecDeque<ByzantineEvidence>,
    capacity: usize,
    total: u64,
}

impl Default for EvidenceLog {
    fn default() -> Self {
        Self::with_capacity(1_024)
    }
}

impl EvidenceLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    pub fn record(&mut self, evidence: ByzantineEvidence) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(evidence);
        self.total += 1;
    }

    pub fn recent(&self) -> Vec<ByzantineEvidence> {
        self.entries.iter().cloned().collect()
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
