//! # Commit Pipeline
//!
//! The consensus engine's [`CommitSink`]. For every delivered request:
//!
//! ```text
//! OrderedCommit ──→ BlockStorageService::append ──(block closed)──→ TransactionDispatcher
//!                                                                        │
//!                        Reply{Committed(receipt)} ──→ client ←──────────┘
//! ```
//!
//! Null commits are gap fillers and never reach the chain. Any storage
//! failure is handed back to consensus, which halts the node.
//!
//! A block is durable before it is executed. [`CommitPipeline::recover`]
//! runs on startup and executes blocks a crash left behind.

use ql_01_consensus::{CommitSink, OrderedCommit, Transport};
use ql_02_block_storage::{BlockStorageApi, BlockStorageError, BlockStorageService};
use ql_07_execution::{ExecutionApi, ExecutionError, TransactionDispatcher};
use shared_types::{Endpoint, Envelope, NodeId, Reply, ReplyStatus, Request, StorageError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct CommitPipeline {
    node_id: NodeId,
    blocks: Arc<BlockStorageService>,
    dispatcher: Arc<TransactionDispatcher>,
    transport: Arc<dyn Transport>,
}

impl CommitPipeline {
    pub fn new(
        node_id: NodeId,
        blocks: Arc<BlockStorageService>,
        dispatcher: Arc<TransactionDispatcher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            node_id,
            blocks,
            dispatcher,
            transport,
        }
    }

    /// Execute persisted blocks above the executed height. Their clients
    /// are not answered again.
    pub fn recover(&self) -> Result<usize, StorageError> {
        let executed = self
            .dispatcher
            .executed_height()
            .map_err(execution_failure)?;
        let tip = self.blocks.tip().height;
        if executed >= tip {
            return Ok(0);
        }
        let count = usize::try_from(tip - executed).unwrap_or(usize::MAX);
        let pending = self
            .blocks
            .blocks_range(executed + 1, count)
            .map_err(block_failure)?;
        let resumed = self.dispatcher.resume(pending).map_err(execution_failure)?;
        info!(executed, tip, resumed, "persisted blocks executed after restart");
        Ok(resumed)
    }

    fn reply(&self, request: &Request, status: ReplyStatus) {
        send_reply(self.transport.as_ref(), self.node_id, request, status);
    }
}

/// Answer the submitter of `request`, if it left a reply address.
pub(crate) fn send_reply(
    transport: &dyn Transport,
    node_id: NodeId,
    request: &Request,
    status: ReplyStatus,
) {
    if request.client_address.is_empty() {
        return;
    }
    let reply = Reply {
        message_id: request.message_id.clone(),
        request_digest: request.digest(),
        node: node_id,
        status,
    };
    match Envelope::reply(&reply, request.client_address.clone()) {
        Ok(envelope) => {
            transport.send(envelope, Endpoint::Client(request.client_address.clone()))
        }
        Err(e) => warn!(message_id = %request.message_id, error = %e, "cannot encode reply"),
    }
}

fn block_failure(err: BlockStorageError) -> StorageError {
    match err {
        BlockStorageError::Storage(inner) => inner,
        other => StorageError::DatabaseError(other.to_string()),
    }
}

fn execution_failure(err: ExecutionError) -> StorageError {
    match err {
        ExecutionError::Storage(inner) => inner,
        ExecutionError::Halted => StorageError::Halted,
        other => StorageError::DatabaseError(other.to_string()),
    }
}

impl CommitSink for CommitPipeline {
    fn deliver(&self, commit: &OrderedCommit) -> Result<(), StorageError> {
        let Some(request) = &commit.request else {
            return Ok(());
        };
        let block = self.blocks.append(request.clone()).map_err(|e| {
            error!(sequence = commit.sequence, error = %e, "block append failed");
            block_failure(e)
        })?;
        let Some(block) = block else {
            debug!(sequence = commit.sequence, "request buffered in open block");
            return Ok(());
        };
        let receipts = self
            .dispatcher
            .execute_block(&block)
            .map_err(execution_failure)?;
        for (request, receipt) in block.requests.iter().zip(receipts) {
            self.reply(request, ReplyStatus::Committed(receipt));
        }
        Ok(())
    }

    fn request_abandoned(&self, request: &Request, reason: &str) {
        debug!(message_id = %request.message_id, reason, "request abandoned by view change");
        self.reply(request, ReplyStatus::ConsensusFailure(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalNetwork;
    use ql_02_block_storage::{BatchPolicy, BlockStorageApi};
    use ql_03_accounts::{AccountLedger, LedgerConfig};
    use ql_04_contracts::{ContractRuntime, RuntimeConfig};
    use ql_05_cross_chain::{CrossChainVerifier, StaticRootTable};
    use ql_06_oracle::OracleBridge;
    use ql_07_execution::ExecutionDependencies;
    use shared_crypto::Ed25519KeyPair;
    use shared_types::{InMemoryKVStore, KeyValueStore, Transaction};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        store: Arc<InMemoryKVStore>,
        network: Arc<LocalNetwork>,
        client: UnboundedReceiver<Envelope>,
        blocks: Arc<BlockStorageService>,
        pipeline: CommitPipeline,
    }

    fn harness(policy: BatchPolicy) -> Harness {
        harness_on(Arc::new(InMemoryKVStore::new()), policy)
    }

    fn harness_on(store: Arc<InMemoryKVStore>, policy: BatchPolicy) -> Harness {
        let kv: Arc<dyn KeyValueStore> = store.clone();
        let network = Arc::new(LocalNetwork::new());
        let client = network.register_client("client");
        let blocks = Arc::new(BlockStorageService::with_store(Arc::clone(&kv), policy).unwrap());
        let runtime = Arc::new(ContractRuntime::new(
            RuntimeConfig::default(),
            AccountLedger::new(LedgerConfig::default()),
        ));
        let dispatcher = Arc::new(TransactionDispatcher::new(ExecutionDependencies {
            store: kv,
            runtime,
            cross_chain: CrossChainVerifier::new(Arc::new(StaticRootTable::new())),
            oracle: OracleBridge::new(),
        }));
        let pipeline = CommitPipeline::new(2, Arc::clone(&blocks), dispatcher, network.clone());
        Harness {
            store,
            network,
            client,
            blocks,
            pipeline,
        }
    }

    fn commit(sequence: u64, request: Option<Request>) -> OrderedCommit {
        OrderedCommit {
            view: 0,
            sequence,
            digest: request.as_ref().map(Request::digest).unwrap_or([0u8; 32]),
            request,
            proof: Vec::new(),
        }
    }

    fn register(seed: u8) -> Request {
        let key = Ed25519KeyPair::from_seed([seed; 32]);
        let tx = Transaction::register(key.public_key().as_bytes());
        Request::for_transaction(&tx, "client", seed as u64).unwrap()
    }

    #[test]
    fn test_delivered_request_is_executed_and_answered() {
        let mut h = harness(BatchPolicy::PerRequest);
        let request = register(1);
        h.pipeline.deliver(&commit(1, Some(request.clone()))).unwrap();

        assert_eq!(h.blocks.tip().height, 1);
        let reply = h.client.try_recv().unwrap().decode_reply().unwrap();
        assert_eq!(reply.node, 2);
        assert_eq!(reply.message_id, request.message_id);
        assert_eq!(reply.request_digest, request.digest());
        match reply.status {
            ReplyStatus::Committed(receipt) => {
                assert_eq!(receipt.height, 1);
                assert!(receipt.outcome.is_success());
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_null_commit_is_skipped() {
        let mut h = harness(BatchPolicy::PerRequest);
        h.pipeline.deliver(&commit(1, None)).unwrap();
        assert_eq!(h.blocks.tip().height, 0);
        assert!(h.client.try_recv().is_err());
    }

    #[test]
    fn test_window_defers_replies_until_block_closes() {
        let mut h = harness(BatchPolicy::Window(2));
        h.pipeline.deliver(&commit(1, Some(register(1)))).unwrap();
        assert!(h.client.try_recv().is_err());

        h.pipeline.deliver(&commit(2, Some(register(2)))).unwrap();
        assert_eq!(h.blocks.tip().height, 1);
        assert!(h.client.try_recv().is_ok());
        assert!(h.client.try_recv().is_ok());
        assert_eq!(h.network.stats().delivered, 2);
    }

    #[test]
    fn test_abandoned_request_gets_consensus_failure() {
        let mut h = harness(BatchPolicy::PerRequest);
        h.pipeline.request_abandoned(&register(1), "view change to 1");
        let reply = h.client.try_recv().unwrap().decode_reply().unwrap();
        assert_eq!(
            reply.status,
            ReplyStatus::ConsensusFailure("view change to 1".into())
        );
    }

    #[test]
    fn test_storage_failure_surfaces_to_consensus() {
        let h = harness(BatchPolicy::PerRequest);
        h.store.inject_write_failure(true);
        assert!(h.pipeline.deliver(&commit(1, Some(register(1)))).is_err());
    }

    #[test]
    fn test_restart_executes_persisted_block() {
        let h = harness(BatchPolicy::PerRequest);
        let first = register(1);
        h.pipeline.deliver(&commit(1, Some(first.clone()))).unwrap();
        // Crash between persisting block 2 and executing it.
        let second = register(2);
        h.blocks.append(second.clone()).unwrap().unwrap();
        assert_eq!(h.pipeline.dispatcher.executed_height().unwrap(), 1);
        assert!(h.pipeline.dispatcher.receipt(&second.leaf_hash()).unwrap().is_none());

        let restarted = harness_on(Arc::clone(&h.store), BatchPolicy::PerRequest);
        assert_eq!(restarted.blocks.tip().height, 2);
        assert_eq!(restarted.pipeline.recover().unwrap(), 1);

        let dispatcher = &restarted.pipeline.dispatcher;
        assert_eq!(dispatcher.executed_height().unwrap(), 2);
        let receipt = dispatcher.receipt(&second.leaf_hash()).unwrap().unwrap();
        assert!(receipt.outcome.is_success());
        assert_eq!(receipt.height, 2);
        let untouched = dispatcher.receipt(&first.leaf_hash()).unwrap().unwrap();
        assert_eq!(untouched.height, 1);
        assert!(untouched.outcome.is_success());
        assert_eq!(restarted.pipeline.recover().unwrap(), 0);
    }

    #[test]
    fn test_recover_on_executed_chain_is_a_no_op() {
        let h = harness(BatchPolicy::PerRequest);
        assert_eq!(h.pipeline.recover().unwrap(), 0);
        h.pipeline.deliver(&commit(1, Some(register(1)))).unwrap();
        let before = h.store.snapshot();
        assert_eq!(h.pipeline.recover().unwrap(), 0);
        assert_eq!(h.store.snapshot(), before);
    }
}
