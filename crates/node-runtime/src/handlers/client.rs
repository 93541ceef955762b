//! # Client Gateway
//!
//! Entry point for `ClientRequest` envelopes.
//!
//! 1. Validate against committed state; failures are answered with
//!    `Rejected` and never reach consensus.
//! 2. A request that already has a receipt is answered with that receipt.
//! 3. The primary orders the request. A backup starts the request timer
//!    (so a silent primary gets replaced) and, if the client sent the
//!    request only here, forwards it to the primary.

use crate::handlers::pipeline::send_reply;
use ql_01_consensus::{ConsensusApi, ConsensusError, Transport};
use ql_07_execution::{ExecutionApi, RequestAdmission, SubmitError};
use shared_types::{Endpoint, Envelope, EnvelopeKind, NodeId, ReplyStatus, Request};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ClientGateway {
    node_id: NodeId,
    consensus: Arc<dyn ConsensusApi>,
    admission: Arc<dyn RequestAdmission>,
    execution: Arc<dyn ExecutionApi>,
    transport: Arc<dyn Transport>,
}

impl ClientGateway {
    pub fn new(
        node_id: NodeId,
        consensus: Arc<dyn ConsensusApi>,
        admission: Arc<dyn RequestAdmission>,
        execution: Arc<dyn ExecutionApi>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            node_id,
            consensus,
            admission,
            execution,
            transport,
        }
    }

    /// Handle one `ClientRequest` envelope.
    pub fn handle(&self, envelope: &Envelope) {
        let request = match envelope.decode_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(from = %envelope.from, error = %e, "undecodable client request");
                return;
            }
        };
        let from_client = matches!(envelope.from, Endpoint::Client(_));

        match self.admission.validate(&request) {
            Ok(()) => {}
            Err(SubmitError::AlreadyCommitted(_)) => {
                self.replay_receipt(&request);
                return;
            }
            Err(err) => {
                info!(message_id = %request.message_id, error = %err, "request rejected");
                self.reply(&request, ReplyStatus::Rejected(err.to_string()));
                return;
            }
        }

        match self.consensus.submit(request.clone()) {
            Ok(sequence) => {
                debug!(message_id = %request.message_id, sequence, "request ordered");
            }
            Err(ConsensusError::NotPrimary { primary, .. }) => {
                self.consensus.observe_request(&request);
                if from_client {
                    self.forward(envelope, primary);
                }
            }
            Err(ConsensusError::ViewChangeInProgress { target }) => {
                debug!(message_id = %request.message_id, target, "view change running; request held");
                self.consensus.observe_request(&request);
            }
            Err(ConsensusError::AlreadyCommitted { .. }) => {
                debug!(message_id = %request.message_id, "request already ordered");
            }
            Err(err) => {
                warn!(message_id = %request.message_id, error = %err, "submission failed");
                self.reply(&request, ReplyStatus::ConsensusFailure(err.to_string()));
            }
        }
    }

    fn forward(&self, envelope: &Envelope, primary: NodeId) {
        let forwarded = Envelope {
            kind: EnvelopeKind::ClientRequest,
            content: envelope.content.clone(),
            from: Endpoint::Node(self.node_id),
            to: Endpoint::Node(primary),
        };
        self.transport.send(forwarded, Endpoint::Node(primary));
    }

    fn replay_receipt(&self, request: &Request) {
        match self.execution.receipt(&request.leaf_hash()) {
            Ok(Some(receipt)) => self.reply(request, ReplyStatus::Committed(receipt)),
            Ok(None) => {}
            Err(e) => warn!(message_id = %request.message_id, error = %e, "receipt lookup failed"),
        }
    }

    fn reply(&self, request: &Request, status: ReplyStatus) {
        send_reply(self.transport.as_ref(), self.node_id, request, status);
    }
}
