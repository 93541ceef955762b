//! # Domain Errors
//!
//! Error types for the block builder and the persisted chain.

use shared_types::StorageError;
use thiserror::Error;

/// Errors raised while appending or reading blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockStorageError {
    /// No block exists at this height.
    #[error("No block at height {height}")]
    HeightNotFound { height: u64 },

    /// Block with this hash was not found.
    #[error("Block {hash} not found")]
    BlockNotFound { hash: String },

    /// Checksum mismatch detected on read.
    #[error("Block {hash} is corrupt: checksum {actual:#010x}, expected {expected:#010x}")]
    DataCorruption {
        hash: String,
        expected: u32,
        actual: u32,
    },

    /// Stored chain does not link (previous hash or height gap).
    #[error("Chain broken at height {height}: {reason}")]
    ChainBroken { height: u64, reason: String },

    /// Block record could not be encoded or decoded.
    #[error("Block serialization failed: {0}")]
    Serialization(String),

    /// Ledger Store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BlockStorageError {
    /// Whether the node must halt: anything that prevents durably recording
    /// the chain.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::DataCorruption { .. } | Self::ChainBroken { .. }
        )
    }
}

impl From<BlockStorageError> for StorageError {
    fn from(err: BlockStorageError) -> Self {
        match err {
            BlockStorageError::Storage(inner) => inner,
            other => StorageError::Corruption {
                key: "block".into(),
                reason: other.to_string(),
            },
        }
    }
}
