//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors raised by the ledger store and the state overlay.
///
/// Every variant is fatal for the node: a replica that cannot durably record
/// what it executed must stop rather than drift from its peers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A persisted record could not be decoded.
    #[error("Corrupt record at {key}: {reason}")]
    Corruption { key: String, reason: String },

    /// A record could not be encoded for writing.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// The node already halted after an earlier storage failure.
    #[error("Node halted awaiting intervention")]
    Halted,
}

/// Errors decoding payloads that arrive from clients or peers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// JSON payload could not be parsed.
    #[error("Malformed JSON payload: {0}")]
    Json(String),

    /// Binary (bincode) payload could not be parsed.
    #[error("Malformed binary payload: {0}")]
    Binary(String),

    /// Payload decoded but carries the wrong request kind.
    #[error("Expected {expected} payload, got {actual}")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Node operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Normal operation.
    Running,
    /// Halted due to a storage failure (awaiting intervention).
    HaltedAwaitingIntervention,
}

impl NodeState {
    /// Whether the node may keep executing committed requests.
    pub fn is_running(self) -> bool {
        matches!(self, NodeState::Running)
    }
}
