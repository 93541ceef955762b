//! Execution domain: errors and the receipt key layout.

pub mod errors;
pub mod receipts;

pub use errors::{ExecutionError, ExecutionResult, SubmitError};
pub use receipts::{
    block_receipt_key, block_receipt_prefix, tx_receipt_key, BLOCK_RECEIPT_PREFIX, EXECUTED_HEIGHT_KEY,
    TX_RECEIPT_PREFIX,
};
