//! # Stored Block
//!
//! The storage-layer wrapper around [`Block`]. The checksum is computed over
//! the encoded block at write time and verified on every read.

use serde::{Deserialize, Serialize};
use shared_crypto::MerkleTree;
use shared_types::{Block, Hash, Height, Request};

/// A block stored on disk with integrity checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    /// bincode-encoded [`Block`].
    pub encoded: Vec<u8>,
    /// CRC32 of `encoded`.
    pub checksum: u32,
}

/// Where a request landed in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLocation {
    pub height: Height,
    pub index: u32,
}

/// Head of the persisted chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: Height,
    pub hash: Hash,
}

/// Seal a block on top of `previous`.
///
/// The timestamp is the greatest request timestamp, so every replica
/// produces the same block from the same requests.
pub fn seal_block(previous: &ChainTip, requests: Vec<Request>) -> Block {
    let height = previous.height + 1;
    let hash = Block::compute_hash(&previous.hash, height, &requests);
    let leaves: Vec<Hash> = requests.iter().map(Request::leaf_hash).collect();
    let timestamp = requests.iter().map(|r| r.timestamp).max().unwrap_or_default();
    Block {
        height,
        previous_hash: previous.hash,
        hash,
        merkle_root: MerkleTree::build(leaves).root(),
        timestamp,
        requests,
    }
}

/// Height 0: zero previous hash, no requests, timestamp 0.
pub fn genesis_block() -> Block {
    let previous_hash = [0u8; 32];
    Block {
        height: 0,
        previous_hash,
        hash: Block::compute_hash(&previous_hash, 0, &[]),
        merkle_root: MerkleTree::build(Vec::new()).root(),
        timestamp: 0,
        requests: Vec::new(),
    }
}
