//! # Transaction Dispatcher
//!
//! Executes finalized blocks request by request, in block order.
//!
//! ## Per-request atomicity
//!
//! Each request runs against its own [`StateOverlay`]. The handler works in
//! a child layer which is folded in on success and dropped on failure; the
//! receipt is then written on top and the whole overlay lands in one
//! atomic batch. A failed request therefore persists its receipt and
//! nothing else.
//!
//! ## Restart
//!
//! Blocks are persisted before they are executed. The request that
//! finishes a block also writes the executed-height marker in its batch,
//! so on open [`TransactionDispatcher::resume`] re-executes exactly the
//! blocks above the marker. Requests of a half-executed block that
//! already have a positional receipt keep it and are not run again.
//!
//! ## Halting
//!
//! A storage error (fatal by construction) stops the dispatcher: the node
//! moves to [`NodeState::HaltedAwaitingIntervention`] and every later block
//! is refused, so no replica executes past a state it could not persist.

mod dispatch;

use crate::domain::{
    block_receipt_key, block_receipt_prefix, tx_receipt_key, ExecutionError, ExecutionResult,
    EXECUTED_HEIGHT_KEY,
};
use crate::ports::ExecutionApi;
use parking_lot::RwLock;
use ql_03_accounts::AccountLedger;
use ql_04_contracts::ContractRuntime;
use ql_05_cross_chain::CrossChainVerifier;
use ql_06_oracle::OracleBridge;
use shared_types::{
    Block, Hash, Height, KeyValueStore, NodeState, Outcome, Receipt, RecordAccess, Request,
    StateOverlay,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Dependencies for TransactionDispatcher
pub struct ExecutionDependencies {
    pub store: Arc<dyn KeyValueStore>,
    pub runtime: Arc<ContractRuntime>,
    pub cross_chain: CrossChainVerifier,
    pub oracle: OracleBridge,
}

/// The Transaction Dispatcher.
pub struct TransactionDispatcher {
    store: Arc<dyn KeyValueStore>,
    runtime: Arc<ContractRuntime>,
    cross_chain: CrossChainVerifier,
    oracle: OracleBridge,
    node_state: RwLock<NodeState>,
}

impl TransactionDispatcher {
    pub fn new(deps: ExecutionDependencies) -> Self {
        Self {
            store: deps.store,
            runtime: deps.runtime,
            cross_chain: deps.cross_chain,
            oracle: deps.oracle,
            node_state: RwLock::new(NodeState::Running),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<ContractRuntime> {
        &self.runtime
    }

    pub fn ledger(&self) -> &AccountLedger {
        self.runtime.ledger()
    }

    pub fn cross_chain(&self) -> &CrossChainVerifier {
        &self.cross_chain
    }

    pub fn oracle(&self) -> &OracleBridge {
        &self.oracle
    }

    pub fn is_halted(&self) -> bool {
        !self.node_state.read().is_running()
    }

    /// Fresh read view of committed state.
    pub fn view(&self) -> StateOverlay {
        StateOverlay::new(Arc::clone(&self.store))
    }

    fn halt(&self, height: Height, err: &ExecutionError) {
        let mut state = self.node_state.write();
        if state.is_running() {
            error!(height, error = %err, "storage failure during execution, halting node");
            *state = NodeState::HaltedAwaitingIntervention;
        }
    }

    /// Height of the last block whose every request has a receipt.
    pub fn executed_height(&self) -> ExecutionResult<Height> {
        Ok(self.view().get_record(EXECUTED_HEIGHT_KEY)?.unwrap_or(0))
    }

    /// Execute persisted blocks the node had not finished before it stopped.
    ///
    /// `blocks` must be the chain above [`Self::executed_height`], in
    /// height order. Returns how many blocks were executed.
    pub fn resume<I>(&self, blocks: I) -> ExecutionResult<usize>
    where
        I: IntoIterator<Item = Block>,
    {
        let mut resumed = 0;
        for block in blocks {
            let executed = self.executed_height()?;
            if block.height <= executed {
                continue;
            }
            if block.height != executed + 1 {
                warn!(height = block.height, executed, "gap before unexecuted block");
                return Err(ExecutionError::OutOfOrder {
                    height: block.height,
                    executed,
                });
            }
            info!(height = block.height, "re-executing persisted block");
            self.execute_block(&block)?;
            resumed += 1;
        }
        Ok(resumed)
    }

    fn mark_executed(&self, height: Height) -> ExecutionResult<()> {
        let mut state = self.view();
        state.put_record(EXECUTED_HEIGHT_KEY, &height)?;
        Ok(state.commit()?)
    }

    fn execute_request(
        &self,
        height: Height,
        index: u32,
        request: &Request,
        closes_block: bool,
    ) -> ExecutionResult<Receipt> {
        let mut state = self.view();
        let position = block_receipt_key(height, index);
        if let Some(receipt) = state.get_record::<Receipt>(&position)? {
            debug!(height, index, "request already executed");
            if closes_block {
                self.mark_executed(height)?;
            }
            return Ok(receipt);
        }
        let tx_hash = request.leaf_hash();
        let tx_key = tx_receipt_key(&tx_hash);

        let first = state.get_record::<Receipt>(&tx_key)?.is_none();
        let (kind, outcome, logs) = if first {
            state.begin_layer();
            let handled = self.route(&mut state, height, request);
            match handled.result {
                Ok(outcome) => {
                    state.commit_layer();
                    (handled.kind, outcome, handled.logs)
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    state.discard_layer();
                    debug!(
                        height,
                        index,
                        tx_hash = %hex::encode(tx_hash),
                        error = %err,
                        "request failed"
                    );
                    (handled.kind, Outcome::Failed(err.to_string()), handled.logs)
                }
            }
        } else {
            debug!(height, index, tx_hash = %hex::encode(tx_hash), "duplicate transaction skipped");
            (
                request.kind.as_str(),
                Outcome::Failed(ExecutionError::Duplicate.to_string()),
                Vec::new(),
            )
        };

        let receipt = Receipt {
            tx_hash,
            message_id: request.message_id.clone(),
            height,
            index,
            kind: kind.to_string(),
            outcome,
            logs,
        };
        if first {
            state.put_record(&tx_key, &receipt)?;
        }
        state.put_record(&position, &receipt)?;
        if closes_block {
            state.put_record(EXECUTED_HEIGHT_KEY, &height)?;
        }
        state.commit()?;
        Ok(receipt)
    }
}

impl ExecutionApi for TransactionDispatcher {
    fn execute_block(&self, block: &Block) -> Result<Vec<Receipt>, ExecutionError> {
        if self.is_halted() {
            return Err(ExecutionError::Halted);
        }
        let executed = self.executed_height()?;
        if block.height <= executed {
            debug!(height = block.height, executed, "block already executed");
            return self.block_receipts(block.height);
        }
        if block.requests.is_empty() {
            if let Err(err) = self.mark_executed(block.height) {
                self.halt(block.height, &err);
                return Err(err);
            }
        }
        let last = block.requests.len().saturating_sub(1);
        let mut receipts = Vec::with_capacity(block.requests.len());
        for (index, request) in block.requests.iter().enumerate() {
            let closes_block = index == last;
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            match self.execute_request(block.height, index, request, closes_block) {
                Ok(receipt) => receipts.push(receipt),
                Err(err) => {
                    self.halt(block.height, &err);
                    return Err(err);
                }
            }
        }
        let failed = receipts.iter().filter(|r| !r.outcome.is_success()).count();
        info!(
            height = block.height,
            requests = receipts.len(),
            failed,
            "block executed"
        );
        Ok(receipts)
    }

    fn receipt(&self, tx_hash: &Hash) -> Result<Option<Receipt>, ExecutionError> {
        Ok(self.view().get_record(&tx_receipt_key(tx_hash))?)
    }

    fn block_receipts(&self, height: Height) -> Result<Vec<Receipt>, ExecutionError> {
        Ok(self
            .view()
            .scan_records::<Receipt>(&block_receipt_prefix(height))?
            .into_iter()
            .map(|(_, receipt)| receipt)
            .collect())
    }

    fn node_state(&self) -> NodeState {
        *self.node_state.read()
    }
}
