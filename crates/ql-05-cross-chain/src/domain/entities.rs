//! Trusted roots, consumed-proof markers and their key layout.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Address, Hash, Height, Outcome};

/// Consumed markers: `x:{chain}/{height:020}/{tx hash hex}` -> JSON [`ConsumedMarker`]
pub const MARKER_PREFIX: &[u8] = b"x:";

/// A foreign-chain Merkle root every replica is configured to trust.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedRoot {
    pub chain: String,
    pub height: Height,
    #[serde_as(as = "Hex")]
    pub root: Hash,
}

/// Record of a `(chain, height, transaction hash)` that already triggered
/// local execution.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedMarker {
    pub chain: String,
    pub height: Height,
    #[serde_as(as = "Hex")]
    pub transaction_hash: Hash,
    /// Sender of the local transaction that consumed the proof.
    pub consumed_by: Address,
    pub contract_name: String,
    pub contract_func: String,
    /// Returned verbatim on replay.
    pub outcome: Outcome,
}

pub fn marker_key(chain: &str, height: Height, transaction_hash: &Hash) -> Vec<u8> {
    let mut key = marker_chain_prefix(chain);
    key.extend_from_slice(format!("{height:020}/{}", hex::encode(transaction_hash)).as_bytes());
    key
}

/// Prefix covering every marker of one chain.
pub fn marker_chain_prefix(chain: &str) -> Vec<u8> {
    let mut key = MARKER_PREFIX.to_vec();
    key.extend_from_slice(chain.as_bytes());
    key.push(b'/');
    key
}
