//! # Query Service
//!
//! Read-only views over committed state for the (external) gateway. Every
//! call opens a fresh overlay over the Ledger Store and never commits it,
//! so queries cannot observe or leave half-executed state.

use ql_01_consensus::{ByzantineEvidence, ConsensusApi, ConsensusStatus};
use ql_02_block_storage::{BlockStorageApi, BlockStorageError, BlockStorageService};
use ql_03_accounts::AccountError;
use ql_04_contracts::{ContractError, ContractRecord};
use ql_05_cross_chain::{proof_for, ConsumedMarker, CrossChainError};
use ql_06_oracle::{ContractEvent, OracleAccount, OracleError, OracleReport};
use ql_07_execution::{ExecutionApi, ExecutionError, TransactionDispatcher};
use serde::Serialize;
use shared_types::{
    Account, Address, Args, Block, CrossTranProof, Hash, Height, Receipt, RequestKind, Transaction,
    Value,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Block(#[from] BlockStorageError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    CrossChain(#[from] CrossChainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// A committed transaction with its position and receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub height: Height,
    pub index: u32,
    pub transaction: Transaction,
    pub receipt: Option<Receipt>,
}

pub struct QueryService {
    blocks: Arc<BlockStorageService>,
    dispatcher: Arc<TransactionDispatcher>,
    consensus: Arc<dyn ConsensusApi>,
}

impl QueryService {
    pub fn new(
        blocks: Arc<BlockStorageService>,
        dispatcher: Arc<TransactionDispatcher>,
        consensus: Arc<dyn ConsensusApi>,
    ) -> Self {
        Self {
            blocks,
            dispatcher,
            consensus,
        }
    }

    pub fn get_chain(&self) -> QueryResult<Vec<Block>> {
        Ok(self.blocks.chain()?)
    }

    pub fn get_block(&self, height: Height) -> QueryResult<Block> {
        Ok(self.blocks.block_at(height)?)
    }

    pub fn tip_height(&self) -> Height {
        self.blocks.tip().height
    }

    /// Every transaction on the chain, in commit order. Events are skipped.
    pub fn get_all_transactions(&self) -> QueryResult<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        for block in self.blocks.chain()? {
            records.extend(self.transactions_of(&block)?);
        }
        Ok(records)
    }

    pub fn get_block_transactions(&self, height: Height) -> QueryResult<Vec<TransactionRecord>> {
        let block = self.blocks.block_at(height)?;
        self.transactions_of(&block)
    }

    fn transactions_of(&self, block: &Block) -> QueryResult<Vec<TransactionRecord>> {
        let receipts = self.dispatcher.block_receipts(block.height)?;
        let mut records = Vec::new();
        for (index, request) in block.requests.iter().enumerate() {
            if request.kind != RequestKind::Transaction {
                continue;
            }
            let Ok(transaction) = request.decode_transaction() else {
                continue;
            };
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            records.push(TransactionRecord {
                height: block.height,
                index,
                transaction,
                receipt: receipts.iter().find(|r| r.index == index).cloned(),
            });
        }
        Ok(records)
    }

    pub fn get_receipt(&self, tx_hash: &Hash) -> QueryResult<Option<Receipt>> {
        Ok(self.dispatcher.receipt(tx_hash)?)
    }

    pub fn get_all_accounts(&self) -> QueryResult<Vec<Account>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.ledger().all_accounts(&view)?)
    }

    pub fn get_account(&self, address: &Address) -> QueryResult<Option<Account>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.ledger().get(&view, address)?)
    }

    pub fn get_contracts(&self) -> QueryResult<Vec<ContractRecord>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.runtime().contracts(&view)?)
    }

    /// Contract storage at `keys`; an empty path returns the whole namespace.
    pub fn get_contract_data(&self, name: &str, keys: &[String]) -> QueryResult<Value> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.runtime().get(&view, name, keys)?)
    }

    /// Run a method read-only; writes and transfers fail.
    pub fn query_contract(&self, name: &str, method: &str, args: &Args) -> QueryResult<Value> {
        let mut view = self.dispatcher.view();
        let execution = self.dispatcher.runtime().query(&mut view, name, method, args);
        Ok(execution.result?)
    }

    pub fn get_oracle_accounts(&self) -> QueryResult<Vec<OracleAccount>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.oracle().accounts(&view)?)
    }

    pub fn get_oracle_reports(&self) -> QueryResult<Vec<OracleReport>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.oracle().reports(&view)?)
    }

    pub fn get_events(&self) -> QueryResult<Vec<ContractEvent>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.oracle().events(&view)?)
    }

    pub fn get_cross_chain_markers(&self, chain: Option<&str>) -> QueryResult<Vec<ConsumedMarker>> {
        let view = self.dispatcher.view();
        Ok(self.dispatcher.cross_chain().markers(&view, chain)?)
    }

    /// Inclusion proof of `tx_hash` in the block at `height`, for another
    /// chain to verify against this chain's Merkle root.
    pub fn get_transaction_proof(&self, height: Height, tx_hash: &Hash) -> QueryResult<CrossTranProof> {
        let block = self.blocks.block_at(height)?;
        Ok(proof_for(&block, tx_hash)?)
    }

    pub fn consensus_status(&self) -> ConsensusStatus {
        self.consensus.status()
    }

    pub fn byzantine_evidence(&self) -> Vec<ByzantineEvidence> {
        self.consensus.evidence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ql_01_consensus::{ConsensusResult, SignedMessage};
    use ql_02_block_storage::BatchPolicy;
    use ql_03_accounts::{AccountLedger, LedgerConfig};
    use ql_04_contracts::{ContractRuntime, RuntimeConfig};
    use ql_05_cross_chain::{recompute_root, CrossChainVerifier, StaticRootTable};
    use ql_06_oracle::{OracleBridge, OracleModule, ORACLE_CONTRACT};
    use ql_07_execution::ExecutionDependencies;
    use serde_json::json;
    use shared_crypto::Ed25519KeyPair;
    use shared_types::{InMemoryKVStore, KeyValueStore, NodeId, Request};

    struct IdleConsensus;

    impl ConsensusApi for IdleConsensus {
        fn submit(&self, _: Request) -> ConsensusResult<u64> {
            Ok(0)
        }
        fn handle_message(&self, _: NodeId, _: SignedMessage) -> ConsensusResult<()> {
            Ok(())
        }
        fn observe_request(&self, _: &Request) {}
        fn tick(&self) -> ConsensusResult<()> {
            Ok(())
        }
        fn status(&self) -> ConsensusStatus {
            ConsensusStatus {
                node_id: 0,
                view: 4,
                primary: 0,
                view_change_target: None,
                last_delivered: 0,
                next_sequence: 1,
                pending_requests: 0,
                evidence_total: 0,
                halted: false,
            }
        }
        fn evidence(&self) -> Vec<ByzantineEvidence> {
            Vec::new()
        }
    }

    fn counter_code() -> String {
        json!({
            "module": "contract",
            "init": [{"op": "set", "path": [{"lit": "count"}], "value": {"lit": 0}}],
            "methods": {
                "bump": {
                    "body": [
                        {"op": "let", "name": "next", "value": {"add": [{"get": {"path": [{"lit": "count"}]}}, {"lit": 1}]}},
                        {"op": "set", "path": [{"lit": "count"}], "value": {"var": "next"}},
                        {"op": "return", "value": {"var": "next"}}
                    ]
                },
                "peek": {
                    "body": [{"op": "return", "value": {"get": {"path": [{"lit": "count"}]}}}]
                }
            }
        })
        .to_string()
    }

    struct Chain {
        blocks: Arc<BlockStorageService>,
        dispatcher: Arc<TransactionDispatcher>,
        query: QueryService,
        owner: Ed25519KeyPair,
    }

    impl Chain {
        fn new() -> Self {
            let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
            let blocks = Arc::new(
                BlockStorageService::with_store(Arc::clone(&store), BatchPolicy::PerRequest)
                    .unwrap(),
            );
            let runtime = Arc::new(
                ContractRuntime::new(
                    RuntimeConfig::default(),
                    AccountLedger::new(LedgerConfig::default()),
                )
                .with_system_module(ORACLE_CONTRACT, Arc::new(OracleModule::new())),
            );
            let dispatcher = Arc::new(TransactionDispatcher::new(ExecutionDependencies {
                store,
                runtime,
                cross_chain: CrossChainVerifier::new(Arc::new(StaticRootTable::new())),
                oracle: OracleBridge::new(),
            }));
            let query = QueryService::new(
                Arc::clone(&blocks),
                Arc::clone(&dispatcher),
                Arc::new(IdleConsensus),
            );
            Self {
                blocks,
                dispatcher,
                query,
                owner: Ed25519KeyPair::from_seed([9; 32]),
            }
        }

        fn owner(&self) -> Address {
            Address::from_public_key(self.owner.public_key().as_bytes())
        }

        fn commit(&self, tx: &Transaction) -> Request {
            let request = Request::for_transaction(tx, "client", 1).unwrap();
            let block = self.blocks.append(request.clone()).unwrap().unwrap();
            self.dispatcher.execute_block(&block).unwrap();
            request
        }

        fn seeded() -> Self {
            let chain = Self::new();
            chain.commit(&Transaction::register(chain.owner.public_key().as_bytes()));
            chain.commit(
                &Transaction::publish(chain.owner(), "counter", &counter_code(), 1)
                    .signed(&chain.owner),
            );
            chain.commit(
                &Transaction::invoke(chain.owner(), "counter", "bump", Args::new(), 0, 2)
                    .signed(&chain.owner),
            );
            chain
        }
    }

    #[test]
    fn test_chain_and_transactions() {
        let chain = Chain::seeded();
        let blocks = chain.query.get_chain().unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(chain.query.tip_height(), 3);

        let all = chain.query.get_all_transactions().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.receipt.as_ref().unwrap().outcome.is_success()));

        let in_block = chain.query.get_block_transactions(2).unwrap();
        assert_eq!(in_block.len(), 1);
        assert_eq!(in_block[0].transaction.contract_name, "counter");
        assert!(chain.query.get_block(9).is_err());
    }

    #[test]
    fn test_state_views() {
        let chain = Chain::seeded();
        let accounts = chain.query.get_all_accounts().unwrap();
        // owner plus the contract account
        assert_eq!(accounts.len(), 2);
        assert_eq!(chain.query.get_account(&chain.owner()).unwrap().unwrap().balance, 100);

        let count = chain
            .query
            .get_contract_data("counter", &["count".to_string()])
            .unwrap();
        assert_eq!(count, Value::Int(1));
        assert_eq!(chain.query.get_contracts().unwrap().len(), 1);
        assert!(chain.query.get_contract_data("missing", &[]).is_err());
    }

    #[test]
    fn test_query_contract_leaves_state_untouched() {
        let chain = Chain::seeded();
        assert_eq!(
            chain.query.query_contract("counter", "peek", &Args::new()).unwrap(),
            Value::Int(1)
        );
        assert!(chain.query.query_contract("counter", "bump", &Args::new()).is_err());
        assert_eq!(
            chain.query.get_contract_data("counter", &["count".to_string()]).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_receipt_and_proof() {
        let chain = Chain::seeded();
        let tx = Transaction::invoke(chain.owner(), "counter", "bump", Args::new(), 0, 3)
            .signed(&chain.owner);
        chain.commit(&tx);

        let receipt = chain.query.get_receipt(&tx.hash).unwrap().unwrap();
        assert_eq!(receipt.height, 4);
        assert_eq!(receipt.outcome, shared_types::Outcome::Success(Value::Int(2)));

        let proof = chain.query.get_transaction_proof(4, &tx.hash).unwrap();
        let block = chain.query.get_block(4).unwrap();
        assert_eq!(recompute_root(&proof).unwrap(), block.merkle_root);
        assert!(chain.query.get_transaction_proof(3, &tx.hash).is_err());
    }

    #[test]
    fn test_oracle_and_consensus_views_start_empty() {
        let chain = Chain::new();
        assert!(chain.query.get_oracle_reports().unwrap().is_empty());
        assert!(chain.query.get_oracle_accounts().unwrap().is_empty());
        assert!(chain.query.get_events().unwrap().is_empty());
        assert!(chain.query.get_cross_chain_markers(None).unwrap().is_empty());
        assert_eq!(chain.query.consensus_status().view, 4);
        assert!(chain.query.byzantine_evidence().is_empty());
    }
}
