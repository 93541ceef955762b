//! Ports for the cross-chain verifier.

pub mod outbound;

pub use outbound::TrustedRootSource;
