//! Cross-chain domain: errors, markers, proof arithmetic.

pub mod entities;
pub mod errors;
pub mod proof;

pub use entities::{marker_chain_prefix, marker_key, ConsumedMarker, TrustedRoot, MARKER_PREFIX};
pub use errors::{CrossChainError, CrossChainResult};
pub use proof::{proof_for, recompute_root, verify_inclusion};
