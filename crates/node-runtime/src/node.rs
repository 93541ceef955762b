//! # Node
//!
//! One replica: routes inbound envelopes to consensus or the client
//! gateway and drives the consensus timer.

use crate::container::{NodeConfig, SubsystemContainer};
use crate::handlers::QueryService;
use anyhow::Result;
use ql_01_consensus::{ConsensusApi, ConsensusError, TimeSource, Transport};
use ql_07_execution::ExecutionApi;
use shared_types::{Envelope, EnvelopeKind, KeyValueStore, NodeId, NodeState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tracing::{debug, info, warn};

pub struct Node {
    container: SubsystemContainer,
}

impl Node {
    pub fn build(
        config: NodeConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        clock: Option<Arc<dyn TimeSource>>,
    ) -> Result<Self> {
        Ok(Self {
            container: SubsystemContainer::build(config, store, transport, clock)?,
        })
    }

    pub fn id(&self) -> NodeId {
        self.container.config.node.id
    }

    pub fn container(&self) -> &SubsystemContainer {
        &self.container
    }

    pub fn query(&self) -> &QueryService {
        &self.container.query
    }

    /// Running, or halted after a storage failure.
    pub fn state(&self) -> NodeState {
        if self.container.consensus.is_halted() {
            return NodeState::HaltedAwaitingIntervention;
        }
        self.container.dispatcher.node_state()
    }

    pub fn handle_envelope(&self, envelope: &Envelope) {
        match envelope.kind {
            EnvelopeKind::Consensus => match self.container.consensus.handle_envelope(envelope) {
                Ok(()) => {}
                Err(ConsensusError::Halted) => {
                    debug!(node = self.id(), "halted; consensus traffic ignored")
                }
                Err(e) => warn!(node = self.id(), from = %envelope.from, error = %e, "consensus message failed"),
            },
            EnvelopeKind::ClientRequest => self.container.gateway.handle(envelope),
            EnvelopeKind::Reply => {
                debug!(node = self.id(), from = %envelope.from, "reply addressed to a node; ignored")
            }
        }
    }

    /// Fire the view-change timer.
    pub fn tick(&self) {
        match self.container.consensus.tick() {
            Ok(()) | Err(ConsensusError::Halted) => {}
            Err(e) => warn!(node = self.id(), error = %e, "consensus tick failed"),
        }
    }

    /// Serve `inbox` until it closes or `shutdown` flips.
    pub async fn run(
        self: Arc<Self>,
        mut inbox: UnboundedReceiver<Envelope>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = Duration::from_millis(self.container.config.consensus.tick_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(node = self.id(), tick_ms = period.as_millis() as u64, "node running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.tick(),
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle_envelope(&envelope),
                    None => break,
                },
            }
        }
        info!(node = self.id(), "node stopped");
    }
}
