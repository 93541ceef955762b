//! # Shared Types Crate
//!
//! Domain entities, wire formats and the storage port shared by every
//! Quorum Ledger subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-subsystem types are defined here.
//! - **Pure hashes**: transaction, request, event and block hashes are pure
//!   functions of their contents, computed with a length-prefixed canonical
//!   encoding so every replica agrees byte for byte.
//! - **All-or-nothing state**: execution writes go through [`StateOverlay`]
//!   and reach the [`KeyValueStore`] in a single atomic batch.

pub mod codec;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod request;
pub mod storage;
pub mod transaction;

pub use entities::*;
pub use envelope::{Endpoint, Envelope, EnvelopeKind, Reply, ReplyStatus};
pub use errors::*;
pub use request::{EventMessage, Request, RequestKind};
pub use storage::{
    BatchOperation, InMemoryKVStore, KeyValueStore, RecordAccess, StateAccess, StateOverlay,
};
pub use transaction::{
    CrossChainCall, CrossTranParam, CrossTranProof, Transaction, TransactionError, TransactionKind,
};
