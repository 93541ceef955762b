//! Consensus Service - PBFT ordering engine
//!
//! # Architecture
//! - Three-phase commit per `(view, sequence)`: PrePrepare, Prepare, Commit
//! - `2f` prepares plus the PrePrepare make a slot prepared; `2f+1` commits
//!   make it committed
//! - Committed slots pass through the ordering stage and reach the
//!   [`CommitSink`] strictly by sequence
//! - Timeouts trigger view changes; the next primary reconciles prepared
//!   slots and fills gaps with null requests
//!
//! Handlers run under the locks of the state they touch and return
//! [`Effects`]; messages are sent and commits delivered only after every
//! lock is released.
//!
//! Every message is signed with the replica's key. Slots keep the signed
//! PrePrepare and Prepares they saw, which become the certificates a view
//! change reports.

mod normal;
mod view_change;


use crate::domain::{
    ByzantineEvidence, ConsensusConfig, ConsensusError, ConsensusMessage, ConsensusResult,
    OrderedCommit, SignedMessage,
};
use crate::metrics;
use crate::ports::{
    CommitSink, ConsensusApi, ConsensusStatus, SystemTimeSource, TimeSource, Transport,
};
use crate::state::{ConsensusState, Mode, PendingRequest};
use shared_types::{Endpoint, Envelope, EnvelopeKind, NodeId, Request};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Side effects produced by a handler.
#[derive(Default)]
pub(crate) struct Effects {
    broadcasts: Vec<ConsensusMessage>,
    committed: Vec<OrderedCommit>,
    evidence: Vec<ByzantineEvidence>,
    abandoned: Vec<(Request, String)>,
    replay_future: bool,
}

impl Effects {
    fn broadcast(&mut self, message: ConsensusMessage) {
        self.broadcasts.push(message);
    }

    fn evidence(&mut self, evidence: ByzantineEvidence) {
        self.evidence.push(evidence);
    }
}

/// Consensus Service
pub struct ConsensusService<T, C>
where
    T: Transport + ?Sized,
    C: CommitSink + ?Sized,
{
    transport: Arc<T>,
    sink: Arc<C>,
    config: ConsensusConfig,
    state: ConsensusState,
    time_source: Box<dyn TimeSource>,
}

/// Dependencies for ConsensusService
pub struct ConsensusDependencies<T: ?Sized, C: ?Sized> {
    pub transport: Arc<T>,
    pub sink: Arc<C>,
    pub config: ConsensusConfig,
}

impl<T, C> ConsensusService<T, C>
where
    T: Transport + ?Sized,
    C: CommitSink + ?Sized,
{
    /// Create a new ConsensusService
    pub fn new(deps: ConsensusDependencies<T, C>) -> ConsensusResult<Self> {
        deps.config.validate()?;
        let retain = deps.config.watermark_window as usize;
        Ok(Self {
            transport: deps.transport,
            sink: deps.sink,
            config: deps.config,
            state: ConsensusState::new(retain),
            time_source: Box::new(SystemTimeSource),
        })
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    /// Primary of the current view.
    pub fn current_primary(&self) -> NodeId {
        self.config.primary_of(self.state.replica.read().view)
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted.load(Ordering::SeqCst)
    }

    fn now(&self) -> u64 {
        self.time_source.now_millis()
    }

    fn ensure_running(&self) -> ConsensusResult<()> {
        if self.is_halted() {
            return Err(ConsensusError::Halted);
        }
        Ok(())
    }

    /// Decode and dispatch a consensus envelope from the transport.
    pub fn handle_envelope(&self, envelope: &Envelope) -> ConsensusResult<()> {
        if envelope.kind != EnvelopeKind::Consensus {
            return Err(ConsensusError::Malformed(format!(
                "expected consensus envelope, got {:?}",
                envelope.kind
            )));
        }
        let from = match envelope.from {
            Endpoint::Node(id) => id,
            Endpoint::Client(_) => {
                return Err(ConsensusError::Malformed(
                    "consensus envelope from a client".into(),
                ))
            }
        };
        let signed = SignedMessage::decode(&envelope.content)?;
        self.handle_message(from, signed)
    }

    /// Sign `message` with this replica's key.
    fn sign(&self, message: ConsensusMessage) -> Option<SignedMessage> {
        let kind = message.kind_name();
        match self.config.signing_key.sign(message) {
            Ok(signed) => Some(signed),
            Err(e) => {
                error!(kind, error = %e, "failed to sign consensus message");
                None
            }
        }
    }

    fn broadcast(&self, message: &ConsensusMessage) {
        let Some(signed) = self.sign(message.clone()) else {
            return;
        };
        let bytes = match signed.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(kind = message.kind_name(), error = %e, "failed to encode consensus message");
                return;
            }
        };
        for peer in self.config.peers() {
            self.transport.send(
                Envelope::consensus(bytes.clone(), self.config.node_id, peer),
                Endpoint::Node(peer),
            );
        }
    }

    /// Apply a handler's effects with no locks held.
    fn apply(&self, effects: Effects) -> ConsensusResult<()> {
        for evidence in effects.evidence {
            warn!(
                kind = evidence.kind(),
                offender = ?evidence.offender(),
                evidence = ?evidence,
                "Byzantine evidence recorded"
            );
            metrics::record_evidence(evidence.kind());
            self.state.evidence.lock().record(evidence);
        }
        for message in &effects.broadcasts {
            self.broadcast(message);
        }
        for (request, reason) in &effects.abandoned {
            self.sink.request_abandoned(request, reason);
        }
        if !effects.committed.is_empty() {
            self.deliver(effects.committed)?;
        }
        if effects.replay_future {
            self.replay_future();
        }
        Ok(())
    }

    /// Push committed slots through the ordering stage into the sink.
    fn deliver(&self, commits: Vec<OrderedCommit>) -> ConsensusResult<()> {
        let mut delivered = Vec::new();
        {
            let mut ordering = self.state.ordering.lock();
            for commit in commits {
                ordering.insert(commit);
            }
            while let Some(commit) = ordering.next_ready() {
                if !commit.is_null() {
                    if let Err(e) = self.sink.deliver(&commit) {
                        self.state.halted.store(true, Ordering::SeqCst);
                        error!(
                            sequence = commit.sequence,
                            error = %e,
                            "commit sink failed; halting node"
                        );
                        return Err(ConsensusError::DeliveryFailed {
                            sequence: commit.sequence,
                            reason: e.to_string(),
                        });
                    }
                    metrics::record_committed();
                }
                debug!(
                    sequence = commit.sequence,
                    view = commit.view,
                    digest = %hex::encode(commit.digest),
                    null = commit.is_null(),
                    "delivered"
                );
                delivered.push((commit.sequence, commit.digest));
            }
        }

        let Some(last) = delivered.iter().map(|(seq, _)| *seq).max() else {
            return Ok(());
        };
        {
            let mut replica = self.state.replica.write();
            for (_, digest) in &delivered {
                replica.pending.remove(digest);
            }
            replica.consecutive_view_changes = 0;
            if replica.next_sequence <= last {
                replica.next_sequence = last + 1;
            }
        }
        self.state.slots.write().retain(|(_, seq), _| *seq > last);
        Ok(())
    }

    /// Re-handle buffered messages whose view has now been entered.
    fn replay_future(&self) {
        let buffered = std::mem::take(&mut *self.state.future.lock());
        if buffered.is_empty() {
            return;
        }
        debug!(count = buffered.len(), "replaying buffered messages");
        for (from, message) in buffered {
            if let Err(e) = self.handle_message(from, message) {
                debug!(error = %e, "buffered message rejected on replay");
            }
        }
    }

    /// Buffer a message for a view this replica has not entered yet.
    fn buffer_future(&self, from: NodeId, signed: SignedMessage) {
        let mut future = self.state.future.lock();
        if future.len() >= self.config.max_future_messages {
            debug!(view = signed.message.view(), "future buffer full; dropping message");
            return;
        }
        future.push((from, signed));
    }

    /// Assign a sequence to `request` and broadcast its PrePrepare.
    ///
    /// Caller holds the replica lock and has checked that this node is the
    /// primary in normal mode.
    fn propose(
        &self,
        replica: &mut crate::state::ReplicaState,
        request: Request,
        local_origin: bool,
        effects: &mut Effects,
    ) -> ConsensusResult<u64> {
        let digest = request.digest();
        let last_delivered = self.state.last_delivered();
        let sequence = replica.next_sequence;
        if sequence > last_delivered + self.config.watermark_window {
            return Err(ConsensusError::WindowFull {
                next: sequence,
                last_delivered,
                window: self.config.watermark_window,
            });
        }
        replica.next_sequence += 1;
        let now = self.now();
        let view = replica.view;
        let entry = replica.pending.entry(digest).or_insert(PendingRequest {
            request: request.clone(),
            sequence: None,
            first_seen: now,
            local_origin,
        });
        entry.sequence = Some(sequence);
        entry.local_origin |= local_origin;

        let proposal = ConsensusMessage::PrePrepare(crate::domain::PrePrepare {
            view,
            sequence,
            digest,
            request: Some(request.clone()),
            sender: self.config.node_id,
        });
        let slot = self.state.slot(view, sequence);
        let mut slot = slot.lock();
        slot.accept_pre_prepare(digest, Some(request), now);
        if let Some(signed) = self.sign(proposal.clone()) {
            slot.keep_proposal(signed);
        }
        effects.broadcast(proposal);
        self.advance(&mut slot, effects);
        info!(view, sequence, digest = %hex::encode(digest), "proposed request");
        Ok(sequence)
    }
}

impl<T, C> ConsensusApi for ConsensusService<T, C>
where
    T: Transport + ?Sized,
    C: CommitSink + ?Sized,
{
    fn submit(&self, request: Request) -> ConsensusResult<u64> {
        self.ensure_running()?;
        let digest = request.digest();
        let mut effects = Effects::default();
        let sequence = {
            let mut replica = self.state.replica.write();
            if let Mode::ViewChanging { target, .. } = replica.mode {
                return Err(ConsensusError::ViewChangeInProgress { target });
            }
            let primary = self.config.primary_of(replica.view);
            if primary != self.config.node_id {
                return Err(ConsensusError::NotPrimary {
                    view: replica.view,
                    primary,
                });
            }
            if self.state.ordering.lock().is_delivered(&digest) {
                return Err(ConsensusError::AlreadyCommitted {
                    digest: hex::encode(digest),
                });
            }
            if let Some(sequence) = replica.pending.get(&digest).and_then(|p| p.sequence) {
                debug!(sequence, "duplicate submission; returning assigned sequence");
                return Ok(sequence);
            }
            self.propose(&mut replica, request, true, &mut effects)?
        };
        self.apply(effects)?;
        Ok(sequence)
    }

    fn handle_message(&self, from: NodeId, signed: SignedMessage) -> ConsensusResult<()> {
        self.ensure_running()?;
        let message = &signed.message;
        if message.sender() != from || !self.config.is_validator(from) {
            warn!(from, claimed = message.sender(), kind = message.kind_name(), "dropping message with forged or unknown sender");
            return Ok(());
        }
        if from == self.config.node_id {
            return Ok(());
        }
        if !signed.verify(&self.config) {
            warn!(from, kind = message.kind_name(), "dropping message with a bad signature");
            return Ok(());
        }
        let mut effects = Effects::default();
        match signed.message.clone() {
            ConsensusMessage::PrePrepare(pp) => self.on_pre_prepare(pp, signed, &mut effects),
            ConsensusMessage::Prepare(vote) => {
                self.on_vote(crate::domain::VotePhase::Prepare, vote, signed, &mut effects)
            }
            ConsensusMessage::Commit(vote) => {
                self.on_vote(crate::domain::VotePhase::Commit, vote, signed, &mut effects)
            }
            ConsensusMessage::ViewChange(vc) => self.on_view_change(vc, signed, &mut effects),
            ConsensusMessage::NewView(nv) => self.on_new_view(nv, &mut effects),
        }
        self.apply(effects)
    }

    fn observe_request(&self, request: &Request) {
        let digest = request.digest();
        if self.state.ordering.lock().is_delivered(&digest) {
            return;
        }
        let now = self.now();
        let mut replica = self.state.replica.write();
        replica
            .pending
            .entry(digest)
            .and_modify(|p| p.local_origin = true)
            .or_insert_with(|| PendingRequest {
                request: request.clone(),
                sequence: None,
                first_seen: now,
                local_origin: true,
            });
    }

    fn tick(&self) -> ConsensusResult<()> {
        self.ensure_running()?;
        let mut effects = Effects::default();
        self.check_timeouts(&mut effects);
        self.apply(effects)
    }

    fn status(&self) -> ConsensusStatus {
        let replica = self.state.replica.read();
        let view_change_target = match replica.mode {
            Mode::Normal => None,
            Mode::ViewChanging { target, .. } => Some(target),
        };
        ConsensusStatus {
            node_id: self.config.node_id,
            view: replica.view,
            primary: self.config.primary_of(replica.view),
            view_change_target,
            last_delivered: self.state.last_delivered(),
            next_sequence: replica.next_sequence,
            pending_requests: replica.pending.len(),
            evidence_total: self.state.evidence.lock().total(),
            halted: self.is_halted(),
        }
    }

    fn evidence(&self) -> Vec<ByzantineEvidence> {
        self.state.evidence.lock().recent()
    }
}
