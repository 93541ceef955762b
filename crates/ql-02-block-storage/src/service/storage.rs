//! # Block Storage API Implementation

use super::*;
use crate::domain::TransactionLocation;
use crate::ports::BlockStorageApi;

impl<CS: ChecksumProvider> BlockStorageApi for BlockStorageService<CS> {
    fn tip(&self) -> ChainTip {
        self.state.lock().tip
    }

    fn block_at(&self, height: u64) -> Result<Block, BlockStorageError> {
        let hash = self
            .read_hash_at(height)?
            .ok_or(BlockStorageError::HeightNotFound { height })?;
        let bytes = self
            .store
            .get(&KeyPrefix::block_key(&hash))?
            .ok_or_else(|| BlockStorageError::ChainBroken {
                height,
                reason: format!("indexed block {} missing", hex::encode(hash)),
            })?;
        self.decode_block(&hash, &bytes)
    }

    fn block_by_hash(&self, hash: &Hash) -> Result<Block, BlockStorageError> {
        let bytes = self
            .store
            .get(&KeyPrefix::block_key(hash))?
            .ok_or_else(|| BlockStorageError::BlockNotFound {
                hash: hex::encode(hash),
            })?;
        self.decode_block(hash, &bytes)
    }

    fn blocks_range(&self, start: u64, limit: usize) -> Result<Vec<Block>, BlockStorageError> {
        let tip = self.tip().height;
        if limit == 0 {
            return Ok(Vec::new());
        }
        if start > tip {
            return Err(BlockStorageError::HeightNotFound { height: start });
        }
        let end = tip.min(start.saturating_add(limit as u64).saturating_sub(1));
        (start..=end).map(|height| self.block_at(height)).collect()
    }

    fn locate(&self, leaf: &Hash) -> Result<Option<TransactionLocation>, BlockStorageError> {
        match self.store.get(&KeyPrefix::transaction_key(leaf))? {
            Some(bytes) => from_wire(&bytes)
                .map(Some)
                .map_err(|e| BlockStorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }
}
