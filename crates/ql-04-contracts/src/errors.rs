//! # Error Types
//!
//! All error types for contract deployment and execution.

use ql_03_accounts::AccountError;
use shared_types::{Address, StorageError};
use thiserror::Error;

/// Errors raised while deploying, invoking or querying a contract.
///
/// Everything except [`ContractError::Storage`] (and a storage failure
/// wrapped in [`ContractError::Account`]) is an execution error: the request
/// is recorded as failed and its writes are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// Contract name violates the naming rules.
    #[error("Invalid contract name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A contract with this name is already deployed (or reserved).
    #[error("Contract {name} already exists")]
    ContractExists { name: String },

    /// No contract with this name.
    #[error("Contract {name} not found")]
    ContractNotFound { name: String },

    /// The contract has no such method.
    #[error("Method {method} not found on contract {contract}")]
    MethodNotFound { contract: String, method: String },

    /// Module source failed the static check.
    #[error("Invalid contract module: {0}")]
    InvalidModule(String),

    /// A declared, non-optional argument was not supplied.
    #[error("Missing argument {arg} for {method}")]
    MissingArgument { method: String, arg: String },

    /// An argument that the method does not declare.
    #[error("Unexpected argument {arg} for {method}")]
    UnexpectedArgument { method: String, arg: String },

    /// Argument type does not match the declared schema.
    #[error("Argument {arg} of {method} must be {expected}, got {actual}")]
    ArgumentMismatch {
        method: String,
        arg: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Nested calls went deeper than the configured limit.
    #[error("Call depth exceeded: {depth} > {max}")]
    CallDepthExceeded { depth: u32, max: u32 },

    /// The entry used up its step budget. Not catchable by `error_into`.
    #[error("Step limit exceeded: {limit} steps")]
    StepLimitExceeded { limit: u64 },

    /// A state-changing capability was used outside committed execution.
    #[error("{0} is only permitted during committed execution")]
    NotInCommittedContext(&'static str),

    /// `transferFrom` on an account the contract may not spend from.
    #[error("Contract {contract} may not transfer from {from}")]
    TransferNotAuthorized { contract: String, from: Address },

    /// Transfer amount is not a positive integer.
    #[error("Invalid transfer amount: {0}")]
    InvalidAmount(String),

    /// A `require` instruction failed.
    #[error("Requirement failed: {0}")]
    Requirement(String),

    /// Operand of the wrong type.
    #[error("Type error in {op}: expected {expected}, got {actual}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// Checked arithmetic failed.
    #[error("Arithmetic error: {0}")]
    Arithmetic(&'static str),

    /// Read of a variable that was never bound.
    #[error("Undefined variable {0}")]
    UndefinedVariable(String),

    /// A native module rejected the call.
    #[error("{0}")]
    Failed(String),

    /// Ledger rule violated by a contract transfer.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// Ledger Store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ContractError {
    /// Whether the node must halt instead of recording a failed request.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(_) => true,
            Self::Account(err) => err.is_fatal(),
            _ => false,
        }
    }
}

/// Result type for contract operations.
pub type ContractResult<T> = Result<T, ContractError>;
