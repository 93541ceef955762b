//! # Binary Merkle Tree
//!
//! Each leaf enters the tree as [`hash_leaf`] and each parent is
//! [`hash_pair`] of its children; the two hashes carry different tag bytes.
//! The leaf level is padded to a power of two (minimum two) with
//! [`ZERO_HASH`] nodes. The tree is stored as a flat array with the root at
//! index 0 and the children of `i` at `2i+1`/`2i+2`.
//!
//! A path is described the way foreign chains ship it: the sibling hashes
//! from leaf to root, plus one [`NodeSide`] per level telling whether the
//! running hash sits on the left or the right at that level.

use crate::hashing::{hash_leaf, hash_pair, Hash, ZERO_HASH};
use crate::CryptoError;
use serde::{Deserialize, Serialize};

/// Which side of its parent the running hash occupies at one level.
///
/// Serialized as `0` (left) / `1` (right).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeSide {
    /// Running hash is the left child; the sibling is on the right.
    Left,
    /// Running hash is the right child; the sibling is on the left.
    Right,
}

impl TryFrom<u8> for NodeSide {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeSide::Left),
            1 => Ok(NodeSide::Right),
            other => Err(format!("invalid merkle index entry {other}, expected 0 or 1")),
        }
    }
}

impl From<NodeSide> for u8 {
    fn from(side: NodeSide) -> Self {
        match side {
            NodeSide::Left => 0,
            NodeSide::Right => 1,
        }
    }
}

/// Inclusion path for one leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    /// Sibling hashes, leaf level first.
    pub siblings: Vec<Hash>,
    /// Position of the running hash at each level.
    pub sides: Vec<NodeSide>,
}

/// Merkle tree over a list of leaf hashes.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    nodes: Vec<Hash>,
    leaf_count: usize,
    padded_leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from leaf hashes.
    ///
    /// An empty leaf list yields a tree whose root is [`ZERO_HASH`].
    pub fn build(leaves: Vec<Hash>) -> Self {
        let leaf_count = leaves.len();
        if leaf_count == 0 {
            return Self {
                nodes: vec![ZERO_HASH],
                leaf_count: 0,
                padded_leaf_count: 0,
            };
        }

        let padded_leaf_count = leaf_count.next_power_of_two().max(2);
        let total_nodes = 2 * padded_leaf_count - 1;
        let mut nodes = vec![ZERO_HASH; total_nodes];
        let leaf_start = padded_leaf_count - 1;
        for (slot, leaf) in nodes[leaf_start..].iter_mut().zip(&leaves) {
            *slot = hash_leaf(leaf);
        }

        for i in (0..leaf_start).rev() {
            nodes[i] = hash_pair(&nodes[2 * i + 1], &nodes[2 * i + 2]);
        }

        Self {
            nodes,
            leaf_count,
            padded_leaf_count,
        }
    }

    /// Root hash of the tree.
    pub fn root(&self) -> Hash {
        self.nodes[0]
    }

    /// Number of real (unpadded) leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Inclusion path for the leaf at `index`.
    pub fn path(&self, index: usize) -> Result<MerklePath, CryptoError> {
        if index >= self.leaf_count {
            return Err(CryptoError::LeafOutOfRange {
                index,
                count: self.leaf_count,
            });
        }

        let mut current = self.padded_leaf_count - 1 + index;
        let mut siblings = Vec::new();
        let mut sides = Vec::new();

        while current > 0 {
            // Odd array index = left child.
            let (sibling, side) = if current % 2 == 1 {
                (current + 1, NodeSide::Left)
            } else {
                (current - 1, NodeSide::Right)
            };
            siblings.push(self.nodes[sibling]);
            sides.push(side);
            current = (current - 1) / 2;
        }

        Ok(MerklePath { siblings, sides })
    }
}

/// Recompute a root from a leaf and its path.
///
/// Every tree has at least two leaf slots, so an empty path never proves
/// anything.
pub fn compute_root(leaf: Hash, siblings: &[Hash], sides: &[NodeSide]) -> Result<Hash, CryptoError> {
    if siblings.is_empty() {
        return Err(CryptoError::EmptyPath);
    }
    if siblings.len() != sides.len() {
        return Err(CryptoError::PathLengthMismatch {
            path: siblings.len(),
            index: sides.len(),
        });
    }

    let root = siblings
        .iter()
        .zip(sides)
        .fold(hash_leaf(&leaf), |running, (sibling, side)| match side {
            NodeSide::Left => hash_pair(&running, sibling),
            NodeSide::Right => hash_pair(sibling, &running),
        });
    Ok(root)
}
