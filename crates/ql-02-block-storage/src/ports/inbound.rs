//! # Inbound Ports (Driving Ports)
//!
//! Read-only chain API used by the query service, the cross-chain proof
//! builder and the execution pipeline.

use crate::domain::{BlockStorageError, ChainTip, TransactionLocation};
use shared_types::{Block, Hash, Height};

/// Read access to the persisted chain.
///
/// Every read verifies the stored checksum; a mismatch surfaces as
/// [`BlockStorageError::DataCorruption`].
pub trait BlockStorageApi: Send + Sync {
    /// Head of the persisted chain (genesis on a fresh store).
    fn tip(&self) -> ChainTip;

    /// Block at `height`.
    ///
    /// ## Errors
    ///
    /// - `HeightNotFound`: no block at this height
    /// - `DataCorruption`: checksum mismatch
    fn block_at(&self, height: Height) -> Result<Block, BlockStorageError>;

    /// Block by hash.
    fn block_by_hash(&self, hash: &Hash) -> Result<Block, BlockStorageError>;

    /// Up to `limit` consecutive blocks starting at `start`, ascending.
    fn blocks_range(&self, start: Height, limit: usize) -> Result<Vec<Block>, BlockStorageError>;

    /// The whole chain from genesis.
    fn chain(&self) -> Result<Vec<Block>, BlockStorageError> {
        self.blocks_range(0, self.tip().height as usize + 1)
    }

    /// Block and position of a request, by its Merkle leaf hash.
    fn locate(&self, leaf: &Hash) -> Result<Option<TransactionLocation>, BlockStorageError>;
}
