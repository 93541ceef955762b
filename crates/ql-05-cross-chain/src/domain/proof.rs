//! # Inclusion Proofs
//!
//! Root recomputation for incoming proofs and proof construction for
//! transactions of this chain. Both use the tree from `shared-crypto`, so a
//! proof built here verifies on any peer chain running the same code.

use super::{CrossChainError, CrossChainResult};
use shared_crypto::{compute_root, MerkleTree, ZERO_HASH};
use shared_types::{Block, CrossTranProof, Hash, Request};

/// Recompute the root committed to by `proof`.
pub fn recompute_root(proof: &CrossTranProof) -> CrossChainResult<Hash> {
    if proof.transaction_hash == ZERO_HASH {
        return Err(CrossChainError::InvalidProof("empty transaction hash".into()));
    }
    compute_root(proof.transaction_hash, &proof.merkle_path, &proof.merkle_index)
        .map_err(|err| CrossChainError::InvalidProof(err.to_string()))
}

/// Check `proof` against a trusted root.
pub fn verify_inclusion(proof: &CrossTranProof, trusted: &Hash) -> CrossChainResult<()> {
    let computed = recompute_root(proof)?;
    if computed != *trusted {
        return Err(CrossChainError::InvalidProof(format!(
            "root {} does not match trusted root {} at height {}",
            hex::encode(computed),
            hex::encode(trusted),
            proof.height
        )));
    }
    Ok(())
}

/// Build the proof that `tx_hash` is a leaf of `block`.
pub fn proof_for(block: &Block, tx_hash: &Hash) -> CrossChainResult<CrossTranProof> {
    let leaves: Vec<Hash> = block.requests.iter().map(Request::leaf_hash).collect();
    let not_in_block = || CrossChainError::NotInBlock {
        height: block.height,
        tx_hash: hex::encode(tx_hash),
    };
    let index = leaves.iter().position(|leaf| leaf == tx_hash).ok_or_else(not_in_block)?;
    let tree = MerkleTree::build(leaves);
    let path = tree.path(index).map_err(|_| not_in_block())?;
    Ok(CrossTranProof {
        merkle_path: path.siblings,
        transaction_hash: *tx_hash,
        height: block.height,
        merkle_index: path.sides,
    })
}
