//! Consensus protocol messages.
//!
//! `PrePrepare`, `Prepare` and `Commit` carry `{view, sequence, digest,
//! sender}`; only the PrePrepare embeds the request itself. `ViewChange`
//! and `NewView` implement primary replacement.

use super::config::ConsensusConfig;
use super::signing::SignedMessage;
use serde::{Deserialize, Serialize};
use shared_types::{Hash, NodeId, Request};
use std::collections::HashSet;

/// Digest of the null request used to fill sequence gaps after a view change.
pub const NULL_DIGEST: Hash = [0u8; 32];

/// Primary's proposal binding `request` to `(view, sequence)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepare {
    pub view: u64,
    pub sequence: u64,
    pub digest: Hash,
    /// `None` only for null requests inside a `NewView`.
    pub request: Option<Request>,
    pub sender: NodeId,
}

impl PrePrepare {
    /// Whether `digest` matches the embedded payload.
    pub fn digest_matches(&self) -> bool {
        match &self.request {
            Some(request) => request.digest() == self.digest,
            None => self.digest == NULL_DIGEST,
        }
    }
}

/// Prepare or Commit vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub view: u64,
    pub sequence: u64,
    pub digest: Hash,
    pub sender: NodeId,
}

/// Which voting phase a vote belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotePhase {
    Prepare,
    Commit,
}

/// A slot a replica prepared (or delivered), reported during view change.
///
/// `proof` holds the primary's signed PrePrepare and `2f` signed Prepares
/// from other replicas, all for this `(view, sequence, digest)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCertificate {
    pub view: u64,
    pub sequence: u64,
    pub digest: Hash,
    pub request: Option<Request>,
    pub proof: Vec<SignedMessage>,
}

impl SlotCertificate {
    pub fn digest_matches(&self) -> bool {
        match &self.request {
            Some(request) => request.digest() == self.digest,
            None => self.digest == NULL_DIGEST,
        }
    }

    fn covers(&self, view: u64, sequence: u64, digest: &Hash) -> bool {
        self.view == view && self.sequence == sequence && self.digest == *digest
    }

    /// Check that the slot really prepared in a view before `new_view`.
    pub fn verify(&self, config: &ConsensusConfig, new_view: u64) -> Result<(), String> {
        if self.view >= new_view {
            return Err(format!(
                "certificate for sequence {} claims view {}, not below {new_view}",
                self.sequence, self.view
            ));
        }
        if !self.digest_matches() {
            return Err(format!("certificate for sequence {} has a wrong digest", self.sequence));
        }
        let primary = config.primary_of(self.view);
        let mut proposed = false;
        let mut voters = HashSet::new();
        for signed in &self.proof {
            if !signed.verify(config) {
                return Err(format!("bad signature from {} in certificate", signed.sender()));
            }
            match &signed.message {
                ConsensusMessage::PrePrepare(pp)
                    if pp.sender == primary && self.covers(pp.view, pp.sequence, &pp.digest) =>
                {
                    proposed = true;
                }
                ConsensusMessage::Prepare(vote)
                    if vote.sender != primary && self.covers(vote.view, vote.sequence, &vote.digest) =>
                {
                    voters.insert(vote.sender);
                }
                other => {
                    return Err(format!(
                        "certificate for sequence {} contains an unrelated {}",
                        self.sequence,
                        other.kind_name()
                    ))
                }
            }
        }
        if !proposed {
            return Err(format!("certificate for sequence {} lacks the PrePrepare", self.sequence));
        }
        if voters.len() < config.prepare_threshold() {
            return Err(format!(
                "certificate for sequence {} has {} prepares, {} required",
                self.sequence,
                voters.len(),
                config.prepare_threshold()
            ));
        }
        Ok(())
    }
}

/// Vote to move to `new_view`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChange {
    pub new_view: u64,
    pub last_delivered: u64,
    /// Prepared but undelivered slots.
    pub prepared: Vec<SlotCertificate>,
    /// Recently delivered slots, so lagging replicas can be brought forward.
    pub committed: Vec<SlotCertificate>,
    pub sender: NodeId,
}

/// New primary's announcement of `view`, justified by `2f+1` signed view
/// changes. Each re-proposal is a PrePrepare signed by the new primary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewView {
    pub view: u64,
    pub view_changes: Vec<SignedMessage>,
    pub pre_prepares: Vec<SignedMessage>,
    pub sender: NodeId,
}

/// Every message exchanged between replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    PrePrepare(PrePrepare),
    Prepare(Vote),
    Commit(Vote),
    ViewChange(ViewChange),
    NewView(NewView),
}

impl ConsensusMessage {
    pub fn sender(&self) -> NodeId {
        match self {
            ConsensusMessage::PrePrepare(m) => m.sender,
            ConsensusMessage::Prepare(m) | ConsensusMessage::Commit(m) => m.sender,
            ConsensusMessage::ViewChange(m) => m.sender,
            ConsensusMessage::NewView(m) => m.sender,
        }
    }

    /// View the message belongs to (target view for view-change traffic).
    pub fn view(&self) -> u64 {
        match self {
            ConsensusMessage::PrePrepare(m) => m.view,
            ConsensusMessage::Prepare(m) | ConsensusMessage::Commit(m) => m.view,
            ConsensusMessage::ViewChange(m) => m.new_view,
            ConsensusMessage::NewView(m) => m.view,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ConsensusMessage::PrePrepare(_) => "pre_prepare",
            ConsensusMessage::Prepare(_) => "prepare",
            ConsensusMessage::Commit(_) => "commit",
            ConsensusMessage::ViewChange(_) => "view_change",
            ConsensusMessage::NewView(_) => "new_view",
        }
    }
}
