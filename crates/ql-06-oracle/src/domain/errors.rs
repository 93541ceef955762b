use ql_04_contracts::ContractError;
use shared_crypto::CryptoError;
use shared_types::StorageError;
use thiserror::Error;

/// Oracle bridge errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event signature rejected: {0}")]
    BadSignature(#[from] CryptoError),

    /// Callback lookup or invocation failed; the event was not recorded.
    #[error("Callback failed: {0}")]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OracleError {
    /// Storage failures halt the node; everything else fails one request.
    pub fn is_fatal(&self) -> bool {
        match self {
            OracleError::Storage(_) => true,
            OracleError::Contract(err) => err.is_fatal(),
            _ => false,
        }
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
