//! Normal-case protocol: PrePrepare, Prepare and Commit handling.

use super::{ConsensusService, Effects};
use crate::domain::{
    ByzantineEvidence, ConsensusMessage, OrderedCommit, PrePrepare, QuorumState, SignedMessage,
    Vote, VoteOutcome, VotePhase,
};
use crate::metrics;
use crate::ports::{CommitSink, Transport};
use crate::state::{Mode, PendingRequest};
use tracing::{debug, trace};

/// Where an incoming message's view stands relative to ours.
pub(super) enum ViewCheck {
    Current,
    Stale,
    Future,
}

impl<T, C> ConsensusService<T, C>
where
    T: Transport + ?Sized,
    C: CommitSink + ?Sized,
{
    pub(super) fn check_view(&self, view: u64) -> ViewCheck {
        let replica = self.state.replica.read();
        match replica.mode {
            Mode::Normal if view == replica.view => ViewCheck::Current,
            Mode::Normal if view > replica.view => ViewCheck::Future,
            Mode::ViewChanging { target, .. } if view >= target => ViewCheck::Future,
            // Normal traffic of the view being abandoned is ignored.
            _ => ViewCheck::Stale,
        }
    }

    /// Sequence outside `(last_delivered, last_delivered + window]`.
    fn outside_window(&self, sequence: u64) -> bool {
        let last = self.state.last_delivered();
        sequence <= last || sequence > last + self.config.watermark_window
    }

    pub(super) fn on_pre_prepare(&self, pp: PrePrepare, signed: SignedMessage, effects: &mut Effects) {
        match self.check_view(pp.view) {
            ViewCheck::Stale => {
                trace!(view = pp.view, sequence = pp.sequence, "stale PrePrepare discarded");
                return;
            }
            ViewCheck::Future => {
                self.buffer_future(pp.sender, signed);
                return;
            }
            ViewCheck::Current => {}
        }

        let expected = self.config.primary_of(pp.view);
        if pp.sender != expected {
            effects.evidence(ByzantineEvidence::UnauthorizedPrePrepare {
                sender: pp.sender,
                view: pp.view,
                expected,
            });
            return;
        }
        if self.outside_window(pp.sequence) {
            trace!(sequence = pp.sequence, "PrePrepare outside watermarks discarded");
            return;
        }
        let Some(request) = pp.request.clone() else {
            debug!(sequence = pp.sequence, "null PrePrepare outside NewView discarded");
            return;
        };
        let actual = request.digest();
        if actual != pp.digest {
            effects.evidence(ByzantineEvidence::DigestMismatch {
                sender: pp.sender,
                view: pp.view,
                sequence: pp.sequence,
                claimed: pp.digest,
                actual,
            });
            return;
        }
        if self.state.ordering.lock().is_delivered(&pp.digest) {
            debug!(sequence = pp.sequence, "PrePrepare for an already delivered request discarded");
            return;
        }

        let now = self.now();
        {
            let slot = self.state.slot(pp.view, pp.sequence);
            let mut slot = slot.lock();
            if let Some(existing) = slot.digest() {
                if existing != pp.digest {
                    effects.evidence(ByzantineEvidence::ConflictingPrePrepare {
                        primary: pp.sender,
                        view: pp.view,
                        sequence: pp.sequence,
                        first: existing,
                        second: pp.digest,
                    });
                }
                return;
            }
            slot.accept_pre_prepare(pp.digest, Some(request.clone()), now);
            slot.keep_proposal(signed);
            self.prepare_locally(&mut slot, effects);
            self.advance(&mut slot, effects);
        }

        let mut replica = self.state.replica.write();
        let entry = replica.pending.entry(pp.digest).or_insert(PendingRequest {
            request,
            sequence: None,
            first_seen: now,
            local_origin: false,
        });
        entry.sequence = Some(pp.sequence);
    }

    pub(super) fn on_vote(
        &self,
        phase: VotePhase,
        vote: Vote,
        signed: SignedMessage,
        effects: &mut Effects,
    ) {
        match self.check_view(vote.view) {
            ViewCheck::Stale => {
                trace!(?phase, view = vote.view, sequence = vote.sequence, "stale vote discarded");
                return;
            }
            ViewCheck::Future => {
                self.buffer_future(vote.sender, signed);
                return;
            }
            ViewCheck::Current => {}
        }
        if self.outside_window(vote.sequence) {
            trace!(?phase, sequence = vote.sequence, "vote outside watermarks discarded");
            return;
        }
        // The primary's PrePrepare stands in for its prepare.
        if phase == VotePhase::Prepare && vote.sender == self.config.primary_of(vote.view) {
            trace!(sequence = vote.sequence, "prepare from primary ignored");
            return;
        }

        let slot = self.state.slot(vote.view, vote.sequence);
        let mut slot = slot.lock();
        let outcome = match phase {
            VotePhase::Prepare => slot.record_prepare(vote.sender, vote.digest),
            VotePhase::Commit => slot.record_commit(vote.sender, vote.digest),
        };
        match outcome {
            VoteOutcome::Duplicate => return,
            VoteOutcome::Conflict { previous } => {
                effects.evidence(ByzantineEvidence::Equivocation {
                    sender: vote.sender,
                    phase,
                    view: vote.view,
                    sequence: vote.sequence,
                    first: previous,
                    second: vote.digest,
                });
                return;
            }
            VoteOutcome::Recorded => {
                if phase == VotePhase::Prepare {
                    slot.keep_prepare(signed);
                }
            }
        }
        if let (Some(accepted), Some(quorum_digest)) = (
            slot.digest(),
            slot.take_conflicting_quorum(self.config.quorum()),
        ) {
            effects.evidence(ByzantineEvidence::ConflictingQuorum {
                view: vote.view,
                sequence: vote.sequence,
                accepted,
                quorum_digest,
            });
        }
        self.advance(&mut slot, effects);
    }

    /// Record and broadcast this backup's own prepare for an accepted slot.
    pub(super) fn prepare_locally(&self, slot: &mut QuorumState, effects: &mut Effects) {
        let Some(digest) = slot.digest() else {
            return;
        };
        if self.config.node_id == self.config.primary_of(slot.view) {
            return;
        }
        let prepare = ConsensusMessage::Prepare(Vote {
            view: slot.view,
            sequence: slot.sequence,
            digest,
            sender: self.config.node_id,
        });
        slot.record_prepare(self.config.node_id, digest);
        if let Some(signed) = self.sign(prepare.clone()) {
            slot.keep_prepare(signed);
        }
        effects.broadcast(prepare);
    }

    /// Move a slot forward as far as its votes allow.
    pub(super) fn advance(&self, slot: &mut QuorumState, effects: &mut Effects) {
        let Some(digest) = slot.digest() else {
            return;
        };
        if slot.try_prepare(self.config.prepare_threshold()) {
            trace!(view = slot.view, sequence = slot.sequence, "prepared");
            slot.record_commit(self.config.node_id, digest);
            effects.broadcast(ConsensusMessage::Commit(Vote {
                view: slot.view,
                sequence: slot.sequence,
                digest,
                sender: self.config.node_id,
            }));
        }
        if slot.try_commit(self.config.quorum()) {
            if let Some(accepted_at) = slot.accepted_at() {
                let elapsed = self.now().saturating_sub(accepted_at);
                metrics::record_commit_latency(elapsed as f64 / 1_000.0);
            }
            debug!(view = slot.view, sequence = slot.sequence, "committed");
            effects.committed.push(OrderedCommit {
                view: slot.view,
                sequence: slot.sequence,
                digest,
                request: slot.request().cloned(),
                proof: slot.proof(),
            });
        }
    }
}
