//! # ql-01-consensus
//!
//! PBFT ordering engine for Quorum Ledger.
//!
//! ## Architecture
//!
//! A fixed validator set of `n = 3f + 1` replicas agrees on a single total
//! order of client requests. The primary of view `v` is
//! `validators[v % n]`.
//!
//! ```text
//! Client ──Request──→ Primary ──PrePrepare──→ Backups
//!                                               │
//!                      ←──────Prepare (2f)──────┘
//!                      ←──────Commit (2f+1)─────→
//!                                               │
//!                           [Ordering Stage] ───┴──→ CommitSink (block builder)
//! ```
//!
//! Requests reach the [`CommitSink`](ports::CommitSink) exactly once, in
//! sequence order, with no gaps. A stalled primary is replaced through
//! `ViewChange` / `NewView`; sequences the old primary left half-done are
//! re-proposed or filled with null requests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ql_01_consensus::{ConsensusConfig, ConsensusDependencies, ConsensusService};
//!
//! let service = ConsensusService::new(ConsensusDependencies {
//!     transport,
//!     sink,
//!     config: ConsensusConfig::for_node(0, vec![0, 1, 2, 3]),
//! })?;
//!
//! service.submit(request)?;
//! service.handle_envelope(&envelope)?;
//! service.tick()?;
//! ```
//!
//! ## Byzantine Behaviour
//!
//! Every message is an Ed25519-signed [`SignedMessage`]. A ViewChange may
//! only report a slot together with the signed PrePrepare and `2f` signed
//! Prepares that made it prepared, and a NewView carries the signed
//! ViewChanges it was built from, so neither can be fabricated by a single
//! replica.
//!
//! Conflicting proposals, equivocating votes, unproven view changes and
//! invalid NewView messages are recorded as [`ByzantineEvidence`]. Evidence
//! never changes slot state.

pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod state;

pub use domain::{
    ByzantineEvidence, ConsensusConfig, ConsensusError, ConsensusMessage, ConsensusResult,
    NewView, OrderedCommit, PrePrepare, ReplicaKey, SignedMessage, SlotCertificate, ViewChange,
    Vote, VotePhase, NULL_DIGEST,
};
pub use ports::{
    CommitSink, ConsensusApi, ConsensusStatus, ManualTimeSource, SystemTimeSource, TimeSource,
    Transport,
};
pub use service::{ConsensusDependencies, ConsensusService};
