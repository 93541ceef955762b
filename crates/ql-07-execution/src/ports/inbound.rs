//! # Inbound Ports (Driving Ports)
//!
//! What the node pipeline and the client gateway call.

use crate::domain::{ExecutionError, SubmitError};
use shared_types::{Block, Hash, Height, NodeState, Receipt, Request};

/// Executes finalized blocks and serves their receipts.
pub trait ExecutionApi: Send + Sync {
    /// Execute every request of `block` in order and persist one receipt per
    /// request.
    ///
    /// Failed requests still get a receipt; only fatal storage errors are
    /// returned, after which the node is halted and every later call fails
    /// with [`ExecutionError::Halted`].
    fn execute_block(&self, block: &Block) -> Result<Vec<Receipt>, ExecutionError>;

    /// Receipt of the execution that took effect for `tx_hash`.
    fn receipt(&self, tx_hash: &Hash) -> Result<Option<Receipt>, ExecutionError>;

    /// Receipts of one block, in request order.
    fn block_receipts(&self, height: Height) -> Result<Vec<Receipt>, ExecutionError>;

    fn node_state(&self) -> NodeState;
}

/// Pre-consensus admission check.
pub trait RequestAdmission: Send + Sync {
    /// Reject requests that can only fail, against committed state.
    fn validate(&self, request: &Request) -> Result<(), SubmitError>;
}
