//! Per-slot quorum state.
//!
//! One [`QuorumState`] exists per `(view, sequence)`. It only moves forward:
//! `Empty -> PrePrepared -> Prepared -> Committed`.

use super::messages::{ConsensusMessage, SlotCertificate};
use super::signing::SignedMessage;
use shared_types::{Hash, NodeId, Request};
use std::collections::{BTreeMap, HashMap};

/// Slot phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Empty,
    PrePrepared,
    Prepared,
    Committed,
}

/// Result of recording one vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    /// Same sender, same digest: ignored.
    Duplicate,
    /// Same sender voted a different digest earlier.
    Conflict { previous: Hash },
}

/// Votes of one phase, at most one per sender.
#[derive(Clone, Debug, Default)]
pub struct VoteSet {
    votes: HashMap<NodeId, Hash>,
}

impl VoteSet {
    pub fn record(&mut self, sender: NodeId, digest: Hash) -> VoteOutcome {
        match self.votes.get(&sender) {
            Some(previous) if *previous == digest => VoteOutcome::Duplicate,
            Some(previous) => VoteOutcome::Conflict {
                previous: *previous,
            },
            None => {
                self.votes.insert(sender, digest);
                VoteOutcome::Recorded
            }
        }
    }

    /// Distinct senders that voted `digest`.
    pub fn count_for(&self, digest: &Hash) -> usize {
        self.votes.values().filter(|d| *d == digest).count()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

/// State of one `(view, sequence)` slot.
#[derive(Clone, Debug)]
pub struct QuorumState {
    pub view: u64,
    pub sequence: u64,
    phase: Phase,
    digest: Option<Hash>,
    request: Option<Request>,
    prepares: VoteSet,
    commits: VoteSet,
    /// Signed PrePrepare and Prepares backing a prepared certificate.
    proposal_proof: Option<SignedMessage>,
    prepare_proofs: BTreeMap<NodeId, SignedMessage>,
    /// Millisecond timestamp at which the PrePrepare was accepted.
    accepted_at: Option<u64>,
    conflict_reported: bool,
}

impl QuorumState {
    pub fn new(view: u64, sequence: u64) -> Self {
        Self {
            view,
            sequence,
            phase: Phase::Empty,
            digest: None,
            request: None,
            prepares: VoteSet::default(),
            commits: VoteSet::default(),
            proposal_proof: None,
            prepare_proofs: BTreeMap::new(),
            accepted_at: None,
            conflict_reported: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Digest bound by the accepted PrePrepare.
    pub fn digest(&self) -> Option<Hash> {
        self.digest
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn accepted_at(&self) -> Option<u64> {
        self.accepted_at
    }

    /// Bind the slot to `digest`. Only valid from `Empty`.
    pub fn accept_pre_prepare(&mut self, digest: Hash, request: Option<Request>, now_ms: u64) -> bool {
        if self.phase != Phase::Empty {
            return false;
        }
        self.phase = Phase::PrePrepared;
        self.digest = Some(digest);
        self.request = request;
        self.accepted_at = Some(now_ms);
        true
    }

    pub fn record_prepare(&mut self, sender: NodeId, digest: Hash) -> VoteOutcome {
        self.prepares.record(sender, digest)
    }

    /// Keep the signed PrePrepare that bound this slot.
    pub fn keep_proposal(&mut self, signed: SignedMessage) {
        if self.proposal_proof.is_none() {
            self.proposal_proof = Some(signed);
        }
    }

    /// Keep a signed Prepare recorded through [`Self::record_prepare`].
    pub fn keep_prepare(&mut self, signed: SignedMessage) {
        if let ConsensusMessage::Prepare(vote) = &signed.message {
            self.prepare_proofs.entry(vote.sender).or_insert(signed);
        }
    }

    /// Signed messages proving the accepted digest prepared here.
    pub fn proof(&self) -> Vec<SignedMessage> {
        let Some(digest) = self.digest else {
            return Vec::new();
        };
        let prepares = self.prepare_proofs.values().filter(|signed| {
            matches!(&signed.message, ConsensusMessage::Prepare(vote) if vote.digest == digest)
        });
        self.proposal_proof.iter().chain(prepares).cloned().collect()
    }

    /// Certificate for a prepared slot.
    pub fn certificate(&self) -> Option<SlotCertificate> {
        if self.phase < Phase::Prepared {
            return None;
        }
        Some(SlotCertificate {
            view: self.view,
            sequence: self.sequence,
            digest: self.digest?,
            request: self.request.clone(),
            proof: self.proof(),
        })
    }

    pub fn record_commit(&mut self, sender: NodeId, digest: Hash) -> VoteOutcome {
        self.commits.record(sender, digest)
    }

    pub fn prepare_count(&self) -> usize {
        self.digest.map_or(0, |d| self.prepares.count_for(&d))
    }

    pub fn commit_count(&self) -> usize {
        self.digest.map_or(0, |d| self.commits.count_for(&d))
    }

    /// `PrePrepared -> Prepared` once `threshold` matching prepares exist.
    pub fn try_prepare(&mut self, threshold: usize) -> bool {
        if self.phase == Phase::PrePrepared && self.prepare_count() >= threshold {
            self.phase = Phase::Prepared;
            return true;
        }
        false
    }

    /// `Prepared -> Committed` once `quorum` matching commits exist.
    pub fn try_commit(&mut self, quorum: usize) -> bool {
        if self.phase == Phase::Prepared && self.commit_count() >= quorum {
            self.phase = Phase::Committed;
            return true;
        }
        false
    }

    /// A digest other than the accepted one that gathered `threshold` votes
    /// in either phase. Reported at most once per slot.
    pub fn take_conflicting_quorum(&mut self, threshold: usize) -> Option<Hash> {
        let accepted = self.digest?;
        if self.conflict_reported || threshold == 0 {
            return None;
        }
        let conflicting = self
            .prepares
            .votes
            .values()
            .chain(self.commits.votes.values())
            .find(|d| {
                **d != accepted
                    && (self.prepares.count_for(d) >= threshold || self.commits.count_for(d) >= threshold)
            })
            .copied();
        if conflicting.is_some() {
            self.conflict_reported = true;
        }
        conflicting
    }
}
