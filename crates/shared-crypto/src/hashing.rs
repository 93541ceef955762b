//! # SHA-256 Hashing
//!
//! One-shot helpers plus [`CanonicalHasher`], which feeds typed fields into
//! SHA-256 with explicit length prefixes. Content hashes of transactions,
//! requests and blocks are all computed with it, so two replicas hashing the
//! same logical value always agree byte for byte.

use sha2::{Digest, Sha256};

/// SHA-256 output (256-bit).
pub type Hash = [u8; 32];

/// All-zero hash. Used as the genesis parent and as Merkle padding.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Hash the concatenation of multiple inputs.
pub fn sha256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}

/// Tag prepended to a leaf before it enters a Merkle tree.
pub const MERKLE_LEAF_TAG: u8 = 0x00;
/// Tag prepended to the two children of a Merkle parent.
pub const MERKLE_NODE_TAG: u8 = 0x01;

/// Tree node for a leaf: `SHA-256(0x00 || leaf)`.
pub fn hash_leaf(leaf: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([MERKLE_LEAF_TAG]);
    hasher.update(leaf);
    hasher.finalize().into()
}

/// Parent of two Merkle nodes: `SHA-256(0x01 || left || right)`.
///
/// The distinct tags keep an interior node from ever being accepted as a
/// leaf of the same tree.
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([MERKLE_NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Field-by-field SHA-256 hasher.
///
/// Variable-length fields are prefixed with their big-endian `u64` length so
/// that adjacent fields can never be re-split into a colliding encoding.
pub struct CanonicalHasher {
    inner: Sha256,
}

impl CanonicalHasher {
    /// Create a hasher bound to a domain tag (e.g. `"ql/tx"`).
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: Sha256::new(),
        };
        hasher.str(domain);
        hasher
    }

    /// Write a single tag byte.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.inner.update([value]);
        self
    }

    /// Write a big-endian `u64`.
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_be_bytes());
        self
    }

    /// Write a big-endian `i64`.
    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.inner.update(value.to_be_bytes());
        self
    }

    /// Write a boolean as one byte.
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    /// Write a length-prefixed byte string.
    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.u64(value.len() as u64);
        self.inner.update(value);
        self
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    /// Write a fixed 32-byte hash (no prefix).
    pub fn hash(&mut self, value: &Hash) -> &mut Self {
        self.inner.update(value);
        self
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }
}
