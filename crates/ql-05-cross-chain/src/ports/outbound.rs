//! # Outbound Ports
//!
//! Where trusted foreign roots come from.

use shared_types::{Hash, Height};

/// Source of foreign-chain Merkle roots.
///
/// ## Integrity contract
///
/// Every replica must answer identically for the same `(chain, height)`:
/// the answer decides whether a proof executes, so a source that differs
/// between replicas breaks agreement on state. Roots are configuration, not
/// something fetched while executing a block.
pub trait TrustedRootSource: Send + Sync {
    /// Trusted root of `chain` at `height`, if one is known.
    fn root(&self, chain: &str, height: Height) -> Option<Hash>;
}
