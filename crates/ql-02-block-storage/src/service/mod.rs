//! # Block Storage Service
//!
//! Appends delivered requests to the block in progress, closes blocks
//! according to the [`BatchPolicy`], and persists each closed block (block
//! record, height index, request locations, new tip) in one atomic batch
//! before handing it back to the caller for execution.

mod builder;
mod storage;

use crate::domain::{BatchPolicy, BlockStorageError, ChainTip, KeyPrefix, StoredBlock};
use crate::ports::{ChecksumProvider, DefaultChecksumProvider};
use parking_lot::Mutex;
use shared_types::codec::{from_wire, to_wire};
use shared_types::{Block, Hash, KeyValueStore, Request};
use std::sync::Arc;

/// Mutable builder state, guarded by one lock.
struct BuilderState {
    tip: ChainTip,
    draft: Vec<Request>,
}

/// The Block Storage Service.
pub struct BlockStorageService<CS: ChecksumProvider = DefaultChecksumProvider> {
    store: Arc<dyn KeyValueStore>,
    checksum: CS,
    policy: BatchPolicy,
    state: Mutex<BuilderState>,
}

/// Dependencies for BlockStorageService
pub struct BlockStorageDependencies<CS> {
    pub store: Arc<dyn KeyValueStore>,
    pub checksum: CS,
}

impl BlockStorageService<DefaultChecksumProvider> {
    /// Open with the default CRC32 checksum provider.
    pub fn with_store(
        store: Arc<dyn KeyValueStore>,
        policy: BatchPolicy,
    ) -> Result<Self, BlockStorageError> {
        Self::open(
            BlockStorageDependencies {
                store,
                checksum: DefaultChecksumProvider,
            },
            policy,
        )
    }
}

impl<CS: ChecksumProvider> BlockStorageService<CS> {
    /// Open the chain: recover the tip from the Ledger Store, or write the
    /// genesis block on a fresh store.
    pub fn open(
        deps: BlockStorageDependencies<CS>,
        policy: BatchPolicy,
    ) -> Result<Self, BlockStorageError> {
        let service = Self {
            store: deps.store,
            checksum: deps.checksum,
            policy,
            state: Mutex::new(BuilderState {
                tip: ChainTip {
                    height: 0,
                    hash: [0u8; 32],
                },
                draft: Vec::new(),
            }),
        };
        let tip = service.recover_tip()?;
        service.state.lock().tip = tip;
        Ok(service)
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Requests waiting in the block in progress.
    pub fn pending_requests(&self) -> usize {
        self.state.lock().draft.len()
    }

    fn encode_block(&self, block: &Block) -> Result<Vec<u8>, BlockStorageError> {
        let encoded = to_wire(block).map_err(|e| BlockStorageError::Serialization(e.to_string()))?;
        let stored = StoredBlock {
            checksum: self.checksum.compute_crc32(&encoded),
            encoded,
        };
        to_wire(&stored).map_err(|e| BlockStorageError::Serialization(e.to_string()))
    }

    fn decode_block(&self, hash: &Hash, bytes: &[u8]) -> Result<Block, BlockStorageError> {
        let stored: StoredBlock =
            from_wire(bytes).map_err(|e| BlockStorageError::Serialization(e.to_string()))?;
        if !self.checksum.verify_crc32(&stored.encoded, stored.checksum) {
            return Err(BlockStorageError::DataCorruption {
                hash: hex::encode(hash),
                expected: stored.checksum,
                actual: self.checksum.compute_crc32(&stored.encoded),
            });
        }
        from_wire(&stored.encoded).map_err(|e| BlockStorageError::Serialization(e.to_string()))
    }

    fn read_hash_at(&self, height: u64) -> Result<Option<Hash>, BlockStorageError> {
        let Some(bytes) = self.store.get(&KeyPrefix::height_key(height))? else {
            return Ok(None);
        };
        let hash: Hash = bytes.as_slice().try_into().map_err(|_| {
            BlockStorageError::ChainBroken {
                height,
                reason: format!("height index holds {} bytes", bytes.len()),
            }
        })?;
        Ok(Some(hash))
    }
}
