//! Error types for the consensus engine.

use shared_types::NodeId;

/// Consensus error types.
///
/// Protocol violations by peers are not errors of the local node: they are
/// logged as evidence and the message is dropped. These variants are what
/// local callers (the client-facing runtime, the timer) can observe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Not the primary for view {view}; primary is node {primary}")]
    NotPrimary { view: u64, primary: NodeId },

    #[error("View change to view {target} in progress")]
    ViewChangeInProgress { target: u64 },

    #[error("Request {digest} already committed")]
    AlreadyCommitted { digest: String },

    #[error("Sequence window full: {next} exceeds last delivered {last_delivered} + {window}")]
    WindowFull {
        next: u64,
        last_delivered: u64,
        window: u64,
    },

    #[error("Malformed consensus message: {0}")]
    Malformed(String),

    #[error("Commit sink failed at sequence {sequence}: {reason}")]
    DeliveryFailed { sequence: u64, reason: String },

    #[error("Node halted after a storage failure")]
    Halted,

    #[error("Invalid consensus configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
