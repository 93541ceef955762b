use shared_types::{Address, StorageError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Account already exists: {address}")]
    DuplicateAccount { address: Address },

    #[error("Account not found: {address}")]
    AccountNotFound { address: Address },

    #[error("Insufficient balance in {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: Address,
        required: u64,
        available: u64,
    },

    #[error("Transfer value must be positive")]
    NonPositiveValue,

    #[error("Cannot transfer from {address} to itself")]
    SelfTransfer { address: Address },

    #[error("Balance overflow in {address}")]
    BalanceOverflow { address: Address },

    #[error("Public key must not be empty")]
    EmptyPublicKey,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AccountError {
    /// Storage failures halt the node; everything else fails one request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AccountError::Storage(_))
    }
}
