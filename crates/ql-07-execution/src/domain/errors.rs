//! # Domain Errors
//!
//! Two families: [`ExecutionError`] for committed requests (recorded as a
//! failed receipt unless fatal) and [`SubmitError`] for requests rejected
//! before they ever reach consensus.

use ql_03_accounts::AccountError;
use ql_04_contracts::ContractError;
use ql_05_cross_chain::CrossChainError;
use ql_06_oracle::OracleError;
use shared_types::{Address, CodecError, StorageError, TransactionError};
use thiserror::Error;

/// Errors raised while executing a committed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Malformed request: {0}")]
    Malformed(#[from] CodecError),

    #[error("Transaction rejected: {0}")]
    Transaction(#[from] TransactionError),

    /// A request with this hash already has a receipt.
    #[error("duplicate transaction")]
    Duplicate,

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    CrossChain(#[from] CrossChainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A persisted block does not directly follow the executed height.
    #[error("block {height} cannot follow executed height {executed}")]
    OutOfOrder { height: u64, executed: u64 },

    /// An earlier storage failure stopped execution.
    #[error("Node halted awaiting intervention")]
    Halted,
}

impl ExecutionError {
    /// Whether the node must stop instead of recording a failed receipt.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(_) | Self::Halted | Self::OutOfOrder { .. } => true,
            Self::Account(err) => err.is_fatal(),
            Self::Contract(err) => err.is_fatal(),
            Self::CrossChain(err) => err.is_fatal(),
            Self::Oracle(err) => err.is_fatal(),
            _ => false,
        }
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Validation failures reported synchronously to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Malformed request: {0}")]
    Malformed(#[from] CodecError),

    #[error("Transaction rejected: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Unknown sender {0}")]
    UnknownSender(Address),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("Cross-chain transaction needs a proof, a parameter block and a destination chain")]
    MissingCrossChainPayload,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The request was already executed; resubmitting would be a no-op.
    #[error("Transaction {0} already committed")]
    AlreadyCommitted(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message() {
        assert_eq!(ExecutionError::Duplicate.to_string(), "duplicate transaction");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ExecutionError::Storage(StorageError::Halted).is_fatal());
        assert!(ExecutionError::Halted.is_fatal());
        assert!(ExecutionError::Account(AccountError::Storage(StorageError::Halted)).is_fatal());
        assert!(!ExecutionError::Account(AccountError::NonPositiveValue).is_fatal());
        assert!(!ExecutionError::CrossChain(CrossChainError::InvalidProof("x".into())).is_fatal());
        assert!(!ExecutionError::Duplicate.is_fatal());
    }
}
