//! Primary replacement: timeouts, ViewChange collection and NewView.

use super::{ConsensusService, Effects};
use crate::domain::{
    ByzantineEvidence, ConsensusConfig, ConsensusMessage, NewView, PrePrepare, SignedMessage,
    SlotCertificate, ViewChange, NULL_DIGEST,
};
use crate::metrics;
use crate::ports::{CommitSink, Transport};
use crate::state::{Mode, ReplicaState};
use shared_types::{Hash, NodeId, Request};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Backoff exponent cap for consecutive view changes.
const MAX_BACKOFF_SHIFT: u32 = 6;

impl<T, C> ConsensusService<T, C>
where
    T: Transport + ?Sized,
    C: CommitSink + ?Sized,
{
    /// Current view-change timeout, doubled per consecutive view change.
    pub(super) fn current_timeout(&self, replica: &ReplicaState) -> u64 {
        let shift = replica.consecutive_view_changes.min(MAX_BACKOFF_SHIFT);
        self.config.view_change_timeout_ms.saturating_mul(1u64 << shift)
    }

    pub(super) fn check_timeouts(&self, effects: &mut Effects) {
        let now = self.now();
        let mut replica = self.state.replica.write();
        let timeout = self.current_timeout(&replica);
        match replica.mode {
            Mode::Normal => {
                let Some(oldest) = replica.pending.values().map(|p| p.first_seen).min() else {
                    return;
                };
                if now.saturating_sub(oldest) >= timeout {
                    let target = replica.view + 1;
                    warn!(
                        view = replica.view,
                        target,
                        waited_ms = now.saturating_sub(oldest),
                        "request timed out; starting view change"
                    );
                    self.start_view_change(&mut replica, target, effects);
                }
            }
            Mode::ViewChanging { target, started_at } => {
                if now.saturating_sub(started_at) >= timeout {
                    warn!(target, "view change timed out; moving to next view");
                    self.start_view_change(&mut replica, target + 1, effects);
                }
            }
        }
    }

    /// Enter `ViewChanging{target}` and broadcast this replica's ViewChange.
    pub(super) fn start_view_change(
        &self,
        replica: &mut ReplicaState,
        target: u64,
        effects: &mut Effects,
    ) {
        if target <= replica.view {
            return;
        }
        if let Mode::ViewChanging { target: current, .. } = replica.mode {
            if current >= target {
                return;
            }
        }
        replica.mode = Mode::ViewChanging {
            target,
            started_at: self.now(),
        };
        replica.consecutive_view_changes = replica.consecutive_view_changes.saturating_add(1);
        metrics::record_view_change();

        let view_change = self.build_view_change(target);
        info!(
            from_view = replica.view,
            target,
            prepared = view_change.prepared.len(),
            last_delivered = view_change.last_delivered,
            "broadcasting ViewChange"
        );
        let message = ConsensusMessage::ViewChange(view_change);
        if let Some(signed) = self.sign(message.clone()) {
            let mut view_changes = self.state.view_changes.lock();
            view_changes.retain(|view, _| *view >= target);
            view_changes
                .entry(target)
                .or_default()
                .insert(self.config.node_id, signed);
        }
        effects.broadcast(message);
        self.try_new_view(replica, target, effects);
    }

    /// This replica's prepared-but-undelivered slots plus recent deliveries.
    fn build_view_change(&self, target: u64) -> ViewChange {
        let last_delivered = self.state.last_delivered();
        let mut prepared: BTreeMap<u64, SlotCertificate> = BTreeMap::new();
        for slot in self.state.existing_slots() {
            let slot = slot.lock();
            if slot.sequence <= last_delivered {
                continue;
            }
            let Some(cert) = slot.certificate() else {
                continue;
            };
            let newer = prepared
                .get(&cert.sequence)
                .map_or(true, |existing| existing.view < cert.view);
            if newer {
                prepared.insert(cert.sequence, cert);
            }
        }
        ViewChange {
            new_view: target,
            last_delivered,
            prepared: prepared.into_values().collect(),
            committed: self.state.ordering.lock().recent_certificates(),
            sender: self.config.node_id,
        }
    }

    pub(super) fn on_view_change(&self, vc: ViewChange, signed: SignedMessage, effects: &mut Effects) {
        if let Err(reason) = verify_certificates(&self.config, &vc) {
            effects.evidence(ByzantineEvidence::InvalidViewChange {
                sender: vc.sender,
                view: vc.new_view,
                reason,
            });
            return;
        }

        let mut replica = self.state.replica.write();
        if vc.new_view <= replica.view {
            debug!(sender = vc.sender, target = vc.new_view, "stale ViewChange ignored");
            return;
        }
        let target = vc.new_view;
        let senders = {
            let mut view_changes = self.state.view_changes.lock();
            let votes = view_changes.entry(target).or_default();
            votes.insert(vc.sender, signed);
            votes.len()
        };
        debug!(target, senders, "ViewChange recorded");

        let joining = match replica.mode {
            Mode::Normal => true,
            Mode::ViewChanging { target: current, .. } => target > current,
        };
        if joining && senders >= self.config.weak_quorum() {
            info!(target, senders, "joining view change");
            self.start_view_change(&mut replica, target, effects);
        }
        self.try_new_view(&mut replica, target, effects);
    }

    /// As primary of `target`, announce the new view once a quorum of
    /// ViewChange messages has arrived.
    fn try_new_view(&self, replica: &mut ReplicaState, target: u64, effects: &mut Effects) {
        if self.config.primary_of(target) != self.config.node_id {
            return;
        }
        if !matches!(replica.mode, Mode::ViewChanging { target: t, .. } if t == target) {
            return;
        }
        if replica.new_view_sent.is_some_and(|sent| sent >= target) {
            return;
        }
        let view_changes: Vec<SignedMessage> = match self.state.view_changes.lock().get(&target) {
            Some(votes) if votes.len() >= self.config.quorum() => votes.values().cloned().collect(),
            _ => return,
        };

        let plan = proposals_for(&self.config, target, &view_change_bodies(&view_changes));
        let mut pre_prepares = Vec::with_capacity(plan.pre_prepares.len());
        for pp in plan.pre_prepares {
            let Some(signed) = self.sign(ConsensusMessage::PrePrepare(pp)) else {
                return;
            };
            pre_prepares.push(signed);
        }
        replica.new_view_sent = Some(target);
        info!(
            view = target,
            view_changes = view_changes.len(),
            proposals = pre_prepares.len(),
            floor = plan.floor,
            "broadcasting NewView"
        );
        effects.broadcast(ConsensusMessage::NewView(NewView {
            view: target,
            view_changes,
            pre_prepares: pre_prepares.clone(),
            sender: self.config.node_id,
        }));
        self.enter_view(replica, target, plan.floor, &pre_prepares, effects);
    }

    pub(super) fn on_new_view(&self, nv: NewView, effects: &mut Effects) {
        let mut replica = self.state.replica.write();
        let stale = match replica.mode {
            Mode::Normal => nv.view <= replica.view,
            Mode::ViewChanging { target, .. } => nv.view < target,
        };
        if stale {
            debug!(sender = nv.sender, view = nv.view, "stale NewView ignored");
            return;
        }
        let floor = match verify_new_view(&self.config, &nv) {
            Ok(floor) => floor,
            Err(reason) => {
                effects.evidence(ByzantineEvidence::InvalidNewView {
                    sender: nv.sender,
                    view: nv.view,
                    reason,
                });
                return;
            }
        };
        info!(view = nv.view, primary = nv.sender, "NewView accepted");
        self.enter_view(&mut replica, nv.view, floor, &nv.pre_prepares, effects);
    }

    /// Install `view` with the given signed re-proposals. Sequences up to
    /// `floor` are never assigned again.
    fn enter_view(
        &self,
        replica: &mut ReplicaState,
        view: u64,
        floor: u64,
        pre_prepares: &[SignedMessage],
        effects: &mut Effects,
    ) {
        let now = self.now();
        let is_primary = self.config.primary_of(view) == self.config.node_id;
        replica.view = view;
        replica.mode = Mode::Normal;

        self.state.slots.write().retain(|(slot_view, _), _| *slot_view >= view);
        self.state.view_changes.lock().retain(|v, _| *v > view);

        let last_delivered = self.state.last_delivered();
        let mut carried: HashSet<Hash> = HashSet::new();
        let mut highest = last_delivered.max(floor);
        for signed in pre_prepares {
            let ConsensusMessage::PrePrepare(pp) = &signed.message else {
                continue;
            };
            highest = highest.max(pp.sequence);
            if pp.sequence <= last_delivered {
                continue;
            }
            carried.insert(pp.digest);
            let slot = self.state.slot(view, pp.sequence);
            let mut slot = slot.lock();
            slot.accept_pre_prepare(pp.digest, pp.request.clone(), now);
            slot.keep_proposal(signed.clone());
            self.prepare_locally(&mut slot, effects);
            self.advance(&mut slot, effects);
            drop(slot);
            if let Some(pending) = replica.pending.get_mut(&pp.digest) {
                pending.sequence = Some(pp.sequence);
            }
        }
        replica.next_sequence = replica.next_sequence.max(highest + 1);

        for pending in replica.pending.values_mut() {
            pending.first_seen = now;
        }
        let mut leftover: Vec<(Hash, Request, bool, Option<u64>)> = replica
            .pending
            .iter()
            .filter(|(digest, _)| !carried.contains(*digest))
            .map(|(digest, p)| (*digest, p.request.clone(), p.local_origin, p.sequence))
            .collect();
        // Old sequence order first, then unassigned requests by digest.
        leftover.sort_by(|a, b| {
            (a.3.is_none(), a.3, a.0).cmp(&(b.3.is_none(), b.3, b.0))
        });

        let mut reproposed = 0usize;
        let mut abandoned = 0usize;
        for (digest, request, local_origin, old_sequence) in leftover {
            if is_primary {
                match self.propose(replica, request.clone(), local_origin, effects) {
                    Ok(_) => {
                        reproposed += 1;
                        continue;
                    }
                    Err(e) => debug!(error = %e, "could not re-propose request"),
                }
            } else if old_sequence.is_none() {
                // Never ordered: keep watching it under the new primary.
                continue;
            }
            replica.pending.remove(&digest);
            abandoned += 1;
            if local_origin {
                effects
                    .abandoned
                    .push((request, format!("request dropped by view change to view {view}")));
            }
        }

        info!(
            view,
            primary = self.config.primary_of(view),
            carried = carried.len(),
            reproposed,
            abandoned,
            next_sequence = replica.next_sequence,
            "entered view"
        );
        effects.replay_future = true;
    }
}

/// Re-proposals for a new view and the highest sequence it must not reuse.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ViewPlan {
    pub floor: u64,
    pub pre_prepares: Vec<PrePrepare>,
}

/// Deterministic re-proposals for `view` from verified ViewChange messages.
///
/// Each sequence takes the certificate with the highest view; two proven
/// certificates of one view cannot disagree while at most `f` replicas are
/// faulty. `floor` is the highest `last_delivered` claimed by `f + 1`
/// replicas, so at least one correct replica delivered every sequence up
/// to it. Sequences above the lowest `last_delivered` without a certificate
/// become null requests above `floor` and are left alone below it.
pub(crate) fn proposals_for(
    config: &ConsensusConfig,
    view: u64,
    view_changes: &[ViewChange],
) -> ViewPlan {
    let mut ordered: Vec<&ViewChange> = view_changes.iter().collect();
    ordered.sort_by_key(|vc| vc.sender);
    let Some(low) = ordered.iter().map(|vc| vc.last_delivered).min() else {
        return ViewPlan {
            floor: 0,
            pre_prepares: Vec::new(),
        };
    };
    let mut claimed: Vec<u64> = ordered.iter().map(|vc| vc.last_delivered).collect();
    claimed.sort_unstable_by(|a, b| b.cmp(a));
    let floor = claimed
        .get(config.f())
        .copied()
        .unwrap_or(low)
        .max(low);

    let mut chosen: BTreeMap<u64, &SlotCertificate> = BTreeMap::new();
    for vc in &ordered {
        for cert in vc.committed.iter().chain(vc.prepared.iter()) {
            let entry = chosen.entry(cert.sequence).or_insert(cert);
            if cert.view > entry.view {
                *entry = cert;
            }
        }
    }
    let high = chosen.keys().copied().max().unwrap_or(low).max(floor);

    let primary = config.primary_of(view);
    let pre_prepares = ((low + 1)..=high)
        .filter_map(|sequence| match chosen.get(&sequence) {
            Some(cert) => Some(PrePrepare {
                view,
                sequence,
                digest: cert.digest,
                request: cert.request.clone(),
                sender: primary,
            }),
            None if sequence <= floor => None,
            None => Some(PrePrepare {
                view,
                sequence,
                digest: NULL_DIGEST,
                request: None,
                sender: primary,
            }),
        })
        .collect();
    ViewPlan { floor, pre_prepares }
}

fn view_change_bodies(signed: &[SignedMessage]) -> Vec<ViewChange> {
    signed
        .iter()
        .filter_map(|s| match &s.message {
            ConsensusMessage::ViewChange(vc) => Some(vc.clone()),
            _ => None,
        })
        .collect()
}

/// Every certificate in a ViewChange is proven and predates its target view.
fn verify_certificates(config: &ConsensusConfig, vc: &ViewChange) -> Result<(), String> {
    vc.prepared
        .iter()
        .chain(vc.committed.iter())
        .try_for_each(|cert| cert.verify(config, vc.new_view))
}

/// Check that a NewView follows from the signed ViewChange messages it
/// carries. Returns the sequence floor of the new view.
fn verify_new_view(config: &ConsensusConfig, nv: &NewView) -> Result<u64, String> {
    let expected = config.primary_of(nv.view);
    if nv.sender != expected {
        return Err(format!("sender {} is not primary {expected} of view {}", nv.sender, nv.view));
    }
    let mut senders: HashSet<NodeId> = HashSet::new();
    let mut view_changes = Vec::with_capacity(nv.view_changes.len());
    for signed in &nv.view_changes {
        let ConsensusMessage::ViewChange(vc) = &signed.message else {
            return Err(format!("embedded {} is not a ViewChange", signed.message.kind_name()));
        };
        if !config.is_validator(vc.sender) {
            return Err(format!("ViewChange from unknown replica {}", vc.sender));
        }
        if !signed.verify(config) {
            return Err(format!("ViewChange from {} has a bad signature", vc.sender));
        }
        if vc.new_view != nv.view {
            return Err(format!("ViewChange from {} targets view {}", vc.sender, vc.new_view));
        }
        if !senders.insert(vc.sender) {
            return Err(format!("duplicate ViewChange from {}", vc.sender));
        }
        verify_certificates(config, vc).map_err(|reason| format!("ViewChange from {}: {reason}", vc.sender))?;
        view_changes.push(vc.clone());
    }
    if senders.len() < config.quorum() {
        return Err(format!(
            "{} ViewChange messages, {} required",
            senders.len(),
            config.quorum()
        ));
    }
    let mut proposals = Vec::with_capacity(nv.pre_prepares.len());
    for signed in &nv.pre_prepares {
        let ConsensusMessage::PrePrepare(pp) = &signed.message else {
            return Err(format!("re-proposal is a {}", signed.message.kind_name()));
        };
        if pp.sender != expected || !signed.verify(config) {
            return Err(format!("re-proposal for sequence {} not signed by the primary", pp.sequence));
        }
        if pp.view != nv.view || !pp.digest_matches() {
            return Err("re-proposal with wrong view or digest".into());
        }
        proposals.push(pp.clone());
    }
    let plan = proposals_for(config, nv.view, &view_changes);
    if plan.pre_prepares != proposals {
        return Err("re-proposals do not follow from view changes".into());
    }
    Ok(plan.floor)
}
