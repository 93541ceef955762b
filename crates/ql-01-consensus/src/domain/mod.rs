//! Consensus domain: messages, slot state, ordering and evidence.

pub mod config;
pub mod error;
pub mod evidence;
pub mod messages;
pub mod ordering;
pub mod quorum;
pub mod signing;

pub use config::ConsensusConfig;
pub use error::{ConsensusError, ConsensusResult};
pub use evidence::{ByzantineEvidence, EvidenceLog};
pub use messages::{
    ConsensusMessage, NewView, PrePrepare, SlotCertificate, ViewChange, Vote, VotePhase,
    NULL_DIGEST,
};
pub use ordering::{OrderedCommit, OrderingStage};
pub use quorum::{Phase, QuorumState, VoteOutcome, VoteSet};
pub use signing::{ReplicaKey, SignedMessage};
