//! # Cross-Chain Verifier (ql-05)
//!
//! Acts on transactions proven to exist on a foreign chain.
//!
//! ## Flow
//!
//! ```text
//! CrossChain tx ──→ trusted root (chain, height) ──→ recompute root from proof
//!                                                        │ equal?
//!                                                        ↓
//!                     marker exists? ── yes ──→ recorded outcome (no execution)
//!                          │ no
//!                          ↓
//!                 ContractRuntime::invoke ── ok ──→ write marker (same overlay)
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Description |
//! |-----------|-------------|
//! | At most once | A `(chain, height, tx hash)` triggers local execution once |
//! | Idempotent replay | A consumed proof returns the recorded outcome |
//! | No partial effects | Root mismatch, unknown root or a failed call leave no marker |
//!
//! Trusted roots are an external input behind [`ports::TrustedRootSource`];
//! the shipped [`adapters::StaticRootTable`] is loaded from configuration.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::StaticRootTable;
pub use domain::{
    marker_key, proof_for, recompute_root, verify_inclusion, ConsumedMarker, CrossChainError,
    CrossChainResult, TrustedRoot,
};
pub use ports::TrustedRootSource;
pub use service::{CrossChainExecution, CrossChainVerifier};
