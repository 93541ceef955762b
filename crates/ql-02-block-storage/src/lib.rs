//! # Block Storage (ql-02)
//!
//! Block builder and persisted hash chain.
//!
//! ```text
//! Consensus ──ordered requests──→ [Block Builder] ──sealed block──→ Dispatcher
//!                                       │
//!                                       ↓ one atomic batch
//!                                 [Ledger Store]
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Sequential Blocks | Height increases by one; `previous_hash` links to the tip |
//! | Pure Hash | `hash = H(previous_hash, height, ordered requests)` |
//! | Persist Before Execute | A block is durable before it is returned for execution |
//! | Data Integrity | CRC32 checksum verified on every read |
//! | Immutability | A persisted block is never rewritten |

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    genesis_block, seal_block, BatchPolicy, BlockStorageError, ChainTip, KeyPrefix, StoredBlock,
    TransactionLocation,
};
pub use ports::{BlockStorageApi, ChecksumProvider, DefaultChecksumProvider};
pub use service::{BlockStorageDependencies, BlockStorageService};
