//! # Block Builder
//!
//! Appending, sealing and persisting blocks; chain recovery on open.

use super::*;
use crate::domain::{genesis_block, seal_block, TransactionLocation};
use crate::ports::BlockStorageApi;
use shared_types::BatchOperation;
use std::collections::HashSet;
use tracing::{debug, info};

impl<CS: ChecksumProvider> BlockStorageService<CS> {
    /// Add a delivered request to the block in progress.
    ///
    /// Returns the block when this request closes it. The block is durable
    /// before it is returned; the caller executes it afterwards.
    pub fn append(&self, request: Request) -> Result<Option<Block>, BlockStorageError> {
        let mut state = self.state.lock();
        state.draft.push(request);
        if !self.policy.should_close(state.draft.len()) {
            debug!(pending = state.draft.len(), "request added to block in progress");
            return Ok(None);
        }

        let requests = std::mem::take(&mut state.draft);
        let block = seal_block(&state.tip, requests);
        self.persist(&block)?;
        state.tip = ChainTip {
            height: block.height,
            hash: block.hash,
        };
        info!(
            height = block.height,
            hash = %hex::encode(block.hash),
            requests = block.requests.len(),
            "block appended"
        );
        Ok(Some(block))
    }

    /// Write block, height index, request locations and tip in one batch.
    fn persist(&self, block: &Block) -> Result<(), BlockStorageError> {
        let mut operations = vec![
            BatchOperation::put(KeyPrefix::block_key(&block.hash), self.encode_block(block)?),
            BatchOperation::put(KeyPrefix::height_key(block.height), block.hash.to_vec()),
        ];
        let mut seen = HashSet::new();
        for (index, request) in block.requests.iter().enumerate() {
            let key = KeyPrefix::transaction_key(&request.leaf_hash());
            // First occurrence wins; replays are recorded by their receipts.
            if !seen.insert(key.clone()) || self.store.exists(&key)? {
                continue;
            }
            let location = TransactionLocation {
                height: block.height,
                index: index as u32,
            };
            let bytes = to_wire(&location).map_err(|e| BlockStorageError::Serialization(e.to_string()))?;
            operations.push(BatchOperation::put(key, bytes));
        }
        let tip = ChainTip {
            height: block.height,
            hash: block.hash,
        };
        let tip_bytes = to_wire(&tip).map_err(|e| BlockStorageError::Serialization(e.to_string()))?;
        operations.push(BatchOperation::put(KeyPrefix::tip_key(), tip_bytes));
        self.store.atomic_batch_write(operations)?;
        Ok(())
    }

    /// Load the persisted tip, or write genesis on a fresh store.
    pub(super) fn recover_tip(&self) -> Result<ChainTip, BlockStorageError> {
        let Some(bytes) = self.store.get(&KeyPrefix::tip_key())? else {
            let genesis = genesis_block();
            self.persist(&genesis)?;
            info!(hash = %hex::encode(genesis.hash), "genesis block written");
            return Ok(ChainTip {
                height: 0,
                hash: genesis.hash,
            });
        };
        let tip: ChainTip = from_wire(&bytes).map_err(|e| BlockStorageError::Serialization(e.to_string()))?;
        let block = self.block_at(tip.height)?;
        if block.hash != tip.hash {
            return Err(BlockStorageError::ChainBroken {
                height: tip.height,
                reason: "tip hash does not match stored block".into(),
            });
        }
        info!(height = tip.height, hash = %hex::encode(tip.hash), "chain recovered");
        Ok(tip)
    }
}
