//! # Quorum Ledger Test Suite
//!
//! Whole-node scenarios on an in-process cluster.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs          # Harness, keys, contract modules
//!     ├── consensus_flows.rs   # ordering, view change, faults, evidence
//!     ├── ledger_flows.rs      # accounts, rejections, resubmission
//!     ├── contract_flows.rs    # contracts and the oracle bridge
//!     └── cross_chain_flows.rs # foreign proofs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ql-tests
//! cargo test -p ql-tests integration::consensus_flows::
//! RUST_LOG=debug cargo test -p ql-tests -- --nocapture
//! ```

#![allow(dead_code)]

pub mod integration;
