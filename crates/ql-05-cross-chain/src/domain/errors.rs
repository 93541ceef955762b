//! # Domain Errors
//!
//! Error types for the cross-chain verifier.

use ql_04_contracts::ContractError;
use shared_types::{Height, StorageError};
use thiserror::Error;

/// Cross-chain error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrossChainError {
    /// `CrossChain` transaction without a proof/param payload.
    #[error("Cross-chain transaction carries no proof")]
    MissingProof,

    /// Proof is malformed or does not reproduce the trusted root.
    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    /// No root is trusted for this chain at this height.
    #[error("No trusted root for chain {chain:?} at height {height}")]
    UnknownRoot { chain: String, height: Height },

    /// Proof requested for a transaction the block does not contain.
    #[error("Transaction {tx_hash} is not in block {height}")]
    NotInBlock { height: Height, tx_hash: String },

    /// The local invocation failed; no marker was recorded.
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CrossChainError {
    /// Storage failures halt the node; everything else fails one request.
    pub fn is_fatal(&self) -> bool {
        match self {
            CrossChainError::Storage(_) => true,
            CrossChainError::Contract(err) => err.is_fatal(),
            _ => false,
        }
    }
}

pub type CrossChainResult<T> = Result<T, CrossChainError>;
