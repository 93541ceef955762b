//! # Node Runtime Library
//!
//! Wiring of a Quorum Ledger replica, exposed for the binary and the
//! integration tests.
//!
//! ```text
//! transport ──Envelope──→ Node ──Consensus────→ ConsensusService ──→ CommitPipeline
//!                           │                                          │
//!                           └──ClientRequest──→ ClientGateway          ├─→ BlockStorageService
//!                                                                      └─→ TransactionDispatcher
//! ```
//!
//! - `container/` - configuration and subsystem wiring
//! - `adapters/` - transports and Ledger Store backends
//! - `handlers/` - commit pipeline, client gateway, query service
//! - `cluster` - in-process clusters for tests and demos

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod cluster;
pub mod container;
pub mod handlers;
pub mod node;
pub mod telemetry;

pub use cluster::{LocalClient, LocalCluster};
pub use container::{NodeConfig, SubsystemContainer};
pub use node::Node;
