//! # Ordering Stage
//!
//! Slots reach `Committed` in any order; the ordering stage releases them
//! strictly by increasing sequence. It is the single total-order checkpoint
//! between consensus and the block builder.

use super::messages::SlotCertificate;
use super::signing::SignedMessage;
use shared_types::{Hash, Request};
use std::collections::{BTreeMap, HashSet};

/// A committed slot on its way to the block builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedCommit {
    pub view: u64,
    pub sequence: u64,
    pub digest: Hash,
    /// `None` for null requests (sequence gap fillers).
    pub request: Option<Request>,
    /// Prepared certificate of the slot, reported in later view changes.
    pub proof: Vec<SignedMessage>,
}

impl OrderedCommit {
    pub fn is_null(&self) -> bool {
        self.request.is_none()
    }
}

/// Reorder buffer plus the record of what was already delivered.
#[derive(Debug)]
pub struct OrderingStage {
    last_delivered: u64,
    buffer: BTreeMap<u64, OrderedCommit>,
    delivered_digests: HashSet<Hash>,
    recent: BTreeMap<u64, OrderedCommit>,
    retain: usize,
}

impl OrderingStage {
    /// `retain` bounds how many delivered slots are kept for view changes.
    pub fn new(last_delivered: u64, retain: usize) -> Self {
        Self {
            last_delivered,
            buffer: BTreeMap::new(),
            delivered_digests: HashSet::new(),
            recent: BTreeMap::new(),
            retain: retain.max(1),
        }
    }

    pub fn last_delivered(&self) -> u64 {
        self.last_delivered
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_delivered(&self, digest: &Hash) -> bool {
        self.delivered_digests.contains(digest)
    }

    /// Queue a committed slot. Returns `false` for stale or duplicate input.
    pub fn insert(&mut self, commit: OrderedCommit) -> bool {
        if commit.sequence <= self.last_delivered || self.buffer.contains_key(&commit.sequence) {
            return false;
        }
        self.buffer.insert(commit.sequence, commit);
        true
    }

    /// Next slot in sequence order, if it has committed.
    ///
    /// The caller must hand the returned commit to the sink before asking
    /// for the next one.
    pub fn next_ready(&mut self) -> Option<OrderedCommit> {
        let next = self.last_delivered + 1;
        let commit = self.buffer.remove(&next)?;
        self.last_delivered = next;
        if !commit.is_null() {
            self.delivered_digests.insert(commit.digest);
        }
        self.recent.insert(next, commit.clone());
        while self.recent.len() > self.retain {
            self.recent.pop_first();
        }
        Some(commit)
    }

    /// Recently delivered slots as view-change certificates.
    pub fn recent_certificates(&self) -> Vec<SlotCertificate> {
        self.recent
            .values()
            .map(|c| SlotCertificate {
                view: c.view,
                sequence: c.sequence,
                digest: c.digest,
                request: c.request.clone(),
                proof: c.proof.clone(),
            })
            .collect()
    }
}
